use std::sync::Arc;
use serde::Serialize;
use tokio::sync::Mutex;
use crate::config::Target;
use crate::history::HistoryStore;
use crate::render::{CanvasSize, Frame};

/// Most recent chart published by the render loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LatestFrame {
    /// Number of frames rendered since startup.
    pub renders: u64,
    pub frame: Option<Frame>,
}

#[derive(Debug)]
pub struct AppState {
    /// Monitored targets, in configuration order.
    pub targets: Arc<Vec<Target>>,
    /// Per-target latency history shared with the scheduler.
    pub history: Arc<HistoryStore>,
    /// Frame published after the latest completed probe.
    pub latest_frame: Arc<Mutex<LatestFrame>>,
    /// Canvas the render loop draws onto.
    pub canvas: CanvasSize,
}
