pub mod appstate;
pub mod config;
pub mod error;
pub mod history;
pub mod render;
pub mod sampler;
pub mod scheduler;
pub mod utils;
pub mod cli;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::Context;
use cli::{apply_overrides, build_cli};
use crate::config::{load_targets, Settings};
use history::{HistoryStore, Sample};
use render::{render, run_render_loop, CanvasSize};
use sampler::HttpProber;
use scheduler::{Scheduler, SchedulerConfig};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, Mutex};
use crate::appstate::{AppState, LatestFrame};
use crate::utils::http_client::HttpClientConfig;

// Entry point: probes run on tokio tasks, the chart is served over HTTP.
#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments using clap.
    let matches = build_cli().get_matches();

    // Layer settings: defaults, settings file, environment, then CLI flags.
    let mut settings = Settings::load(matches.get_one::<String>("settings").map(String::as_str))
        .context("Failed to load settings")?;
    apply_overrides(&mut settings, &matches).map_err(anyhow::Error::msg)?;
    settings.validate().context("Invalid settings")?;

    settings.init_logging();

    let config_file = matches.get_one::<String>("config").map(|s| s.to_string());
    let config_dir = matches.get_one::<String>("config-dir").map(|s| s.to_string());
    let targets = Arc::new(load_targets(config_file, config_dir).context("Failed to load targets")?);
    for target in targets.iter() {
        log::info!("Monitoring '{}' drawn in {}", target.url, target.color);
    }

    let history = Arc::new(HistoryStore::new(targets.iter().map(|t| t.url.clone()), settings.history_capacity));

    let client_config = HttpClientConfig {
        probe_timeout: Duration::from_millis(settings.probe_timeout_ms),
        proxy_url: settings.http_proxy_url.clone(),
        default_headers: settings.http_default_headers.clone(),
    };
    let prober = Arc::new(
        HttpProber::new(client_config, settings.failure_policy).context("Failed to create HTTP client")?,
    );

    let (render_tx, render_rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler::new(
        targets.clone(),
        history.clone(),
        prober,
        render_tx,
        SchedulerConfig::from(&settings),
    );

    if matches.get_flag("once") {
        for (url, sample) in scheduler.probe_once().await {
            match sample {
                Sample::Latency(ms) => println!("{}\t{} ms", url, ms),
                Sample::Failed => println!("{}\tfailed", url),
            }
        }
        return Ok(());
    }

    let canvas = CanvasSize { width: settings.canvas_width, height: settings.canvas_height };
    let latest_frame = Arc::new(Mutex::new(LatestFrame::default()));

    tokio::spawn(run_render_loop(render_rx, targets.clone(), history.clone(), canvas, latest_frame.clone()));
    tokio::spawn(scheduler.run());

    let app_state = web::Data::new(Arc::new(AppState { targets, history, latest_frame, canvas }));

    log::info!("Serving latency chart on http://{}", settings.bind_address);
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .route("/targets", web::get().to(get_targets))
            .route("/history", web::get().to(get_history))
            .route("/chart", web::get().to(get_chart))
            .route("/frame", web::get().to(get_frame))
    })
    .bind(&settings.bind_address)
    .with_context(|| format!("Failed to bind {}", settings.bind_address))?
    .run()
    .await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    width: Option<i32>,
    height: Option<i32>,
}

async fn get_targets(data: web::Data<Arc<AppState>>) -> impl Responder {
    HttpResponse::Ok().json(data.targets.as_ref())
}

// Copies the history so probes can keep appending while the response is written.
async fn get_history(data: web::Data<Arc<AppState>>) -> impl Responder {
    let snapshot = data.history.snapshot().await;
    HttpResponse::Ok().json(&snapshot)
}

// Renders on demand, optionally at a different canvas size than the render loop.
async fn get_chart(data: web::Data<Arc<AppState>>, query: web::Query<ChartQuery>) -> impl Responder {
    let canvas = CanvasSize {
        width: query.width.unwrap_or(data.canvas.width),
        height: query.height.unwrap_or(data.canvas.height),
    };
    let snapshot = data.history.snapshot().await;
    HttpResponse::Ok().json(render(&data.targets, &snapshot, canvas))
}

async fn get_frame(data: web::Data<Arc<AppState>>) -> impl Responder {
    let latest = data.latest_frame.lock().await.clone();
    HttpResponse::Ok().json(&latest)
}
