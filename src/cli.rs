use std::collections::HashMap;

// src/cli.rs
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use crate::config::{FailurePolicy, Settings};

pub fn build_cli() -> Command {
    Command::new("latencyscope")
        .version("0.1.0")
        .author("Richard Chukwu <richinex@gmail.com>")
        .about("Probes HTTP targets on a fixed cadence and charts their latency")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Sets a custom target file")
                .action(ArgAction::Set)
                .num_args(1),
        )
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .value_name("DIRECTORY")
                .help("Sets the directory to load target files from")
                .action(ArgAction::Set)
                .num_args(1),
        )
        .arg(
            Arg::new("settings")
                .short('s')
                .long("settings")
                .value_name("FILE")
                .help("Sets a settings file (yaml, toml or json)")
                .action(ArgAction::Set)
                .num_args(1),
        )
        .arg(
            Arg::new("tick_interval_ms")
                .long("tick-interval-ms")
                .value_name("MILLIS")
                .help("Sets the interval between probe rounds")
                .action(ArgAction::Set)
                .value_parser(value_parser!(u64))
                .num_args(1),
        )
        .arg(
            Arg::new("probe_timeout_ms")
                .long("probe-timeout-ms")
                .value_name("MILLIS")
                .help("Sets the total probe budget, split evenly between connect and read")
                .action(ArgAction::Set)
                .value_parser(value_parser!(u64))
                .num_args(1),
        )
        .arg(
            Arg::new("history_capacity")
                .long("history-capacity")
                .value_name("SAMPLES")
                .help("Sets how many samples are kept per target")
                .action(ArgAction::Set)
                .value_parser(value_parser!(usize))
                .num_args(1),
        )
        .arg(
            Arg::new("max_in_flight_per_target")
                .long("max-in-flight")
                .value_name("PROBES")
                .help("Caps concurrent probes per target (0 = unbounded)")
                .action(ArgAction::Set)
                .value_parser(value_parser!(usize))
                .num_args(1),
        )
        .arg(
            Arg::new("failure_policy")
                .long("failure-policy")
                .value_name("POLICY")
                .help("Records failed probes as a gap ('marker') or as 0 ms ('zero')")
                .action(ArgAction::Set)
                .value_parser(["marker", "zero"])
                .num_args(1),
        )
        .arg(
            Arg::new("log_level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Sets the logging level (e.g., info, debug)")
                .action(ArgAction::Set)
                .num_args(1),
        )
        .arg(
            Arg::new("bind_address")
                .long("bind")
                .value_name("ADDR")
                .help("Sets the address the chart server listens on")
                .action(ArgAction::Set)
                .num_args(1),
        )
        .arg(
            Arg::new("canvas_width")
                .long("canvas-width")
                .value_name("PIXELS")
                .help("Sets the width of the rendered chart")
                .action(ArgAction::Set)
                .value_parser(value_parser!(i32))
                .num_args(1),
        )
        .arg(
            Arg::new("canvas_height")
                .long("canvas-height")
                .value_name("PIXELS")
                .help("Sets the height of the rendered chart")
                .action(ArgAction::Set)
                .value_parser(value_parser!(i32))
                .num_args(1),
        )
        .arg(Arg::new("http_proxy_url")
            .long("http-proxy-url")
            .value_name("URL")
            .help("Sets the HTTP proxy URL")
            .action(ArgAction::Set)
            .num_args(1))
        .arg(Arg::new("http_default_header")
            .long("http-default-header")
            .value_name("KEY:VALUE")
            .help("Sets a default HTTP header (can be used multiple times for multiple headers)")
            .action(ArgAction::Append)
            .num_args(1)
            .value_parser(value_parser!(String)))
        .arg(Arg::new("once")
            .long("once")
            .help("Probes every target once, prints the results and exits")
            .action(ArgAction::SetTrue))
}

pub fn process_http_default_headers(matches: &ArgMatches) -> Result<HashMap<String, String>, String> {
    matches.get_many::<String>("http_default_header")
        .unwrap_or_default()
        .map(|header| {
            let parts: Vec<&str> = header.splitn(2, ':').collect();
            if parts.len() == 2 {
                Ok((parts[0].trim().to_string(), parts[1].trim().to_string()))
            } else {
                Err(format!("Invalid header format: {}", header))
            }
        })
        .collect::<Result<HashMap<_, _>, _>>() // Collects into a Result<HashMap, String>, propagating the first Err encountered, if any.
}

/// Overlays any flags given on the command line onto `settings`.
pub fn apply_overrides(settings: &mut Settings, matches: &ArgMatches) -> Result<(), String> {
    if let Some(ms) = matches.get_one::<u64>("tick_interval_ms") {
        settings.tick_interval_ms = *ms;
    }
    if let Some(ms) = matches.get_one::<u64>("probe_timeout_ms") {
        settings.probe_timeout_ms = *ms;
    }
    if let Some(capacity) = matches.get_one::<usize>("history_capacity") {
        settings.history_capacity = *capacity;
    }
    if let Some(limit) = matches.get_one::<usize>("max_in_flight_per_target") {
        settings.max_in_flight_per_target = *limit;
    }
    if let Some(policy) = matches.get_one::<String>("failure_policy") {
        settings.failure_policy = policy.parse::<FailurePolicy>()?;
    }
    if let Some(level) = matches.get_one::<String>("log_level") {
        settings.log_level = level.clone();
    }
    if let Some(addr) = matches.get_one::<String>("bind_address") {
        settings.bind_address = addr.clone();
    }
    if let Some(width) = matches.get_one::<i32>("canvas_width") {
        settings.canvas_width = *width;
    }
    if let Some(height) = matches.get_one::<i32>("canvas_height") {
        settings.canvas_height = *height;
    }
    if let Some(proxy) = matches.get_one::<String>("http_proxy_url") {
        settings.http_proxy_url = Some(proxy.clone());
    }

    settings.http_default_headers.extend(process_http_default_headers(matches)?);
    Ok(())
}
