use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::{collections::{HashMap, HashSet}, env, fmt, path::PathBuf};
use glob::glob;
use std::fs::File;
use crate::error::ColorError;
use crate::history::NUM_POINTS;
use crate::render::MAX_CANVAS_DIMENSION;
use crate::utils::interpolate::interpolate_targets;
use anyhow::{Context, Result};

/// Prefix for environment variables that override settings.
pub const ENV_PREFIX: &str = "LATENCYSCOPE";

/// An RGB display color, written as `#rrggbb` in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }
}

impl TryFrom<String> for Color {
    type Error = ColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let hex = value
            .strip_prefix('#')
            .ok_or_else(|| ColorError::MissingHash(value.clone()))?;
        if hex.len() != 6 {
            return Err(ColorError::BadLength(value.clone()));
        }
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                .ok_or_else(|| ColorError::BadDigit(value.clone()))
        };

        Ok(Color::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// One monitored endpoint and the color its series is drawn in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Target {
    pub url: String,
    pub color: Color,
}

impl Target {
    /// Targets used when no target file is found.
    pub fn defaults() -> Vec<Target> {
        vec![
            Target { url: "http://google.com".to_string(), color: Color::rgb(0, 150, 0) },
            Target { url: "http://facebook.com".to_string(), color: Color::rgb(0, 0, 250) },
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct TargetFile {
    pub targets: Vec<Target>,
}

/// What a failed probe is recorded as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record an explicit failure marker that the chart leaves out.
    #[default]
    Marker,
    /// Record `0` ms, indistinguishable from a very fast response.
    Zero,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "marker" => Ok(FailurePolicy::Marker),
            "zero" => Ok(FailurePolicy::Zero),
            other => Err(format!("Unknown failure policy '{}', expected 'marker' or 'zero'", other)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub tick_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub history_capacity: usize,
    /// Upper bound on concurrent probes per target; `0` means unbounded.
    pub max_in_flight_per_target: usize,
    pub failure_policy: FailurePolicy,
    pub log_level: String,
    pub bind_address: String,
    pub canvas_width: i32,
    pub canvas_height: i32,
    #[serde(default)]
    pub http_proxy_url: Option<String>,
    #[serde(default)]
    pub http_default_headers: HashMap<String, String>,
}

impl Settings {
    /// Builds settings from defaults, an optional settings file and
    /// `LATENCYSCOPE_*` environment variables, in increasing precedence.
    pub fn load(settings_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("tick_interval_ms", 200)?
            .set_default("probe_timeout_ms", 10_000)?
            .set_default("history_capacity", NUM_POINTS as i64)?
            .set_default("max_in_flight_per_target", 1)?
            .set_default("failure_policy", "marker")?
            .set_default("log_level", "info")?
            .set_default("bind_address", "127.0.0.1:8080")?
            .set_default("canvas_width", 1000)?
            .set_default("canvas_height", 400)?;

        if let Some(path) = settings_file {
            builder = builder.add_source(ConfigFile::with_name(path).required(true));
        }

        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity < 2 {
            return Err(ConfigError::Message(format!(
                "history_capacity must be at least 2, got {}.", self.history_capacity
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Message("tick_interval_ms must be greater than zero.".to_string()));
        }
        if self.probe_timeout_ms < 2 {
            return Err(ConfigError::Message(format!(
                "probe_timeout_ms must be at least 2, got {}.", self.probe_timeout_ms
            )));
        }
        for (name, value) in [("canvas_width", self.canvas_width), ("canvas_height", self.canvas_height)] {
            if !(1..=MAX_CANVAS_DIMENSION).contains(&value) {
                return Err(ConfigError::Message(format!(
                    "{} must be between 1 and {}, got {}.", name, MAX_CANVAS_DIMENSION, value
                )));
            }
        }
        Ok(())
    }

    pub fn init_logging(&self) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&self.log_level)).init();
    }
}

pub fn load_targets(config_file: Option<String>, config_dir: Option<String>) -> Result<Vec<Target>> {
    let mut targets = Vec::new();

    let config_paths = if let Some(file_path) = config_file {
        vec![PathBuf::from(file_path)]
    } else {
        let config_directory = config_dir.unwrap_or_else(|| env::var("CONFIG_DIR").unwrap_or_else(|_| "./config".to_string()));
        let mut paths = glob(&format!("{}/*.yml", config_directory))
            .map_err(|e| anyhow::anyhow!("Failed to read glob pattern: {}", e))?
            .filter_map(Result::ok)
            .collect::<Vec<PathBuf>>();
        paths.sort();
        paths
    };

    for config_path in &config_paths {
        let file = File::open(config_path).with_context(|| format!("Failed to open target file at {:?}", config_path))?;
        let mut target_file: TargetFile = serde_yaml::from_reader(file).with_context(|| format!("Failed to parse YAML from {:?}", config_path))?;
        interpolate_targets(&mut target_file.targets);
        targets.extend(target_file.targets);
    }

    if config_paths.is_empty() {
        log::warn!("No target files found; probing the built-in default targets.");
        targets = Target::defaults();
    }

    validate_targets(&targets)?;
    Ok(targets)
}

fn validate_targets(targets: &[Target]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for target in targets {
        if target.url.is_empty() {
            return Err(ConfigError::Message("Target URL is missing in the configuration.".to_string()));
        }
        if !seen.insert(target.url.as_str()) {
            return Err(ConfigError::Message(format!("Target '{}' is configured more than once.", target.url)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_color_parses_hex() {
        let color = Color::try_from("#00960a".to_string()).unwrap();
        assert_eq!(color, Color::rgb(0, 150, 10));
        assert_eq!(color.to_string(), "#00960a");
    }

    #[test]
    fn test_color_rejects_malformed_input() {
        assert_eq!(Color::try_from("009600".to_string()), Err(ColorError::MissingHash("009600".to_string())));
        assert_eq!(Color::try_from("#0096".to_string()), Err(ColorError::BadLength("#0096".to_string())));
        assert_eq!(Color::try_from("#00zz00".to_string()), Err(ColorError::BadDigit("#00zz00".to_string())));
    }

    #[test]
    fn test_target_file_parses_yaml() {
        let yaml = r##"
targets:
  - url: "http://google.com"
    color: "#009600"
  - url: "http://facebook.com"
    color: "#0000fa"
"##;
        let parsed: TargetFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.targets, Target::defaults());
    }

    #[test]
    fn test_load_targets_from_file() {
        let path = env::temp_dir().join(format!("latencyscope-targets-{}.yml", std::process::id()));
        let mut file = File::create(&path).unwrap();
        writeln!(file, "targets:\n  - url: \"http://example.test\"\n    color: \"#ff0000\"").unwrap();

        let targets = load_targets(Some(path.to_string_lossy().into_owned()), None).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(targets, vec![Target { url: "http://example.test".to_string(), color: Color::rgb(255, 0, 0) }]);
    }

    #[test]
    fn test_load_targets_falls_back_to_defaults() {
        let empty_dir = env::temp_dir().join(format!("latencyscope-empty-{}", std::process::id()));
        std::fs::create_dir_all(&empty_dir).unwrap();

        let targets = load_targets(None, Some(empty_dir.to_string_lossy().into_owned())).unwrap();
        std::fs::remove_dir(&empty_dir).unwrap();

        assert_eq!(targets, Target::defaults());
    }

    #[test]
    fn test_duplicate_targets_are_rejected() {
        let mut targets = Target::defaults();
        targets.push(targets[0].clone());
        assert!(validate_targets(&targets).is_err());
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.tick_interval_ms, 200);
        assert_eq!(settings.probe_timeout_ms, 10_000);
        assert_eq!(settings.history_capacity, NUM_POINTS);
        assert_eq!(settings.max_in_flight_per_target, 1);
        assert_eq!(settings.failure_policy, FailurePolicy::Marker);
        assert!(settings.http_default_headers.is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::load(None).unwrap();
        settings.history_capacity = 1;
        assert!(settings.validate().is_err());

        let mut settings = Settings::load(None).unwrap();
        settings.tick_interval_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::load(None).unwrap();
        settings.canvas_height = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::load(None).unwrap();
        settings.canvas_width = MAX_CANVAS_DIMENSION + 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_failure_policy_from_str() {
        assert_eq!("ZERO".parse::<FailurePolicy>(), Ok(FailurePolicy::Zero));
        assert_eq!("marker".parse::<FailurePolicy>(), Ok(FailurePolicy::Marker));
        assert!("drop".parse::<FailurePolicy>().is_err());
    }
}
