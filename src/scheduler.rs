use log::{debug, error, info};

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use crate::config::{Settings, Target};
use crate::history::{HistoryStore, Sample};
use crate::sampler::Prober;

/// Sent to the render loop once per completed probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub target: String,
    pub sample: Sample,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub probe_budget: Duration,
    /// `None` lets probes for one target overlap without limit.
    pub max_in_flight_per_target: Option<usize>,
}

impl From<&Settings> for SchedulerConfig {
    fn from(settings: &Settings) -> Self {
        SchedulerConfig {
            tick_interval: Duration::from_millis(settings.tick_interval_ms),
            probe_budget: Duration::from_millis(settings.probe_timeout_ms),
            max_in_flight_per_target: match settings.max_in_flight_per_target {
                0 => None,
                limit => Some(limit),
            },
        }
    }
}

/// Dispatches one probe per target on every tick.
///
/// Probes run as independent tasks; a tick never waits for the previous
/// tick's probes. Each finished probe is appended to the history store and
/// followed by exactly one `RenderRequest`.
pub struct Scheduler {
    targets: Arc<Vec<Target>>,
    history: Arc<HistoryStore>,
    prober: Arc<dyn Prober + Send + Sync>,
    render_tx: mpsc::UnboundedSender<RenderRequest>,
    config: SchedulerConfig,
    in_flight: HashMap<String, Arc<Semaphore>>,
}

impl Scheduler {
    pub fn new(
        targets: Arc<Vec<Target>>,
        history: Arc<HistoryStore>,
        prober: Arc<dyn Prober + Send + Sync>,
        render_tx: mpsc::UnboundedSender<RenderRequest>,
        config: SchedulerConfig,
    ) -> Self {
        let in_flight = match config.max_in_flight_per_target {
            Some(limit) => targets
                .iter()
                .map(|target| (target.url.clone(), Arc::new(Semaphore::new(limit))))
                .collect(),
            None => HashMap::new(),
        };

        Scheduler { targets, history, prober, render_tx, config, in_flight }
    }

    /// Starts one probe per target and returns without waiting for them.
    ///
    /// Targets already at their in-flight limit are skipped for this tick.
    pub fn tick(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.targets.len());

        for target in self.targets.iter() {
            let permit = match self.in_flight.get(&target.url) {
                Some(semaphore) => match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        debug!("Skipping '{}': previous probe still in flight", target.url);
                        continue;
                    }
                },
                None => None,
            };

            let target = target.clone();
            let history = self.history.clone();
            let prober = self.prober.clone();
            let render_tx = self.render_tx.clone();
            let budget = self.config.probe_budget;

            handles.push(tokio::spawn(async move {
                let sample = prober.probe(&target, budget).await;
                record_sample(&history, &render_tx, &target.url, sample).await;
                drop(permit);
            }));
        }

        handles
    }

    /// Probes every target once and waits for all of them.
    pub async fn probe_once(&self) -> Vec<(String, Sample)> {
        let futures: Vec<_> = self.targets.iter().map(|target| {
            let prober = self.prober.clone();
            let history = self.history.clone();
            let render_tx = self.render_tx.clone();
            let budget = self.config.probe_budget;
            async move {
                let sample = prober.probe(target, budget).await;
                record_sample(&history, &render_tx, &target.url, sample).await;
                (target.url.clone(), sample)
            }
        }).collect();

        join_all(futures).await
    }

    /// Ticks forever at the configured interval, starting immediately.
    pub async fn run(self) {
        info!(
            "Probing {} target(s) every {:?} with {} using a {:?} budget",
            self.targets.len(), self.config.tick_interval, self.prober.describe(), self.config.probe_budget
        );

        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.tick();
        }
    }
}

async fn record_sample(
    history: &HistoryStore,
    render_tx: &mpsc::UnboundedSender<RenderRequest>,
    target: &str,
    sample: Sample,
) {
    match history.append(target, sample).await {
        Ok(len) => debug!("Recorded {:?} for '{}' ({} samples)", sample, target, len),
        Err(e) => {
            error!("Dropping sample: {}", e);
            return;
        }
    }

    if render_tx.send(RenderRequest { target: target.to_string(), sample }).is_err() {
        debug!("Render loop has shut down; not requesting a redraw for '{}'", target);
    }
}
