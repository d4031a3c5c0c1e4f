//! Maps latency histories onto fixed chart geometry.
//!
//! The chart is produced as a list of draw commands in pixel coordinates;
//! actually putting pixels on a screen is left to whoever consumes them.

use std::sync::Arc;
use log::trace;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::appstate::LatestFrame;
use crate::config::{Color, Target};
use crate::history::{HistorySnapshot, HistoryStore, Sample};
use crate::scheduler::RenderRequest;

pub const LEFT_PADDING: i32 = 120;
pub const RIGHT_PADDING: i32 = 50;
pub const TOP_PADDING: i32 = 25;
pub const BOTTOM_PADDING: i32 = 50;
/// Length of a Y axis tick mark.
pub const TICK_WIDTH: i32 = 3;
/// Number of intervals between Y axis ticks (ticks are drawn at 0..=TICK_COUNT).
pub const TICK_COUNT: i32 = 10;
/// Smallest Y axis upper bound, in milliseconds.
pub const AXIS_FLOOR_MS: u64 = 300;
/// Largest width or height a canvas is rendered at, in pixels.
pub const MAX_CANVAS_DIMENSION: i32 = 16_384;

pub const BACKGROUND_COLOR: Color = Color::rgb(222, 222, 222);
pub const AXIS_COLOR: Color = Color::rgb(250, 0, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: i32,
    pub height: i32,
}

impl CanvasSize {
    /// Limits both dimensions to `0..=MAX_CANVAS_DIMENSION`.
    pub fn clamped(self) -> Self {
        CanvasSize {
            width: self.width.clamp(0, MAX_CANVAS_DIMENSION),
            height: self.height.clamp(0, MAX_CANVAS_DIMENSION),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawCommand {
    Fill { width: i32, height: i32, color: Color },
    Line { from: Point, to: Point, color: Color },
    Text { at: Point, text: String, color: Color },
}

/// Everything needed to draw one chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub canvas: CanvasSize,
    pub upper_bound: u64,
    pub commands: Vec<DrawCommand>,
}

impl Frame {
    /// Line segments drawn in `color`.
    pub fn segments(&self, color: Color) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.commands.iter().filter_map(move |command| match command {
            DrawCommand::Line { from, to, color: c } if *c == color => Some((*from, *to)),
            _ => None,
        })
    }
}

pub fn round_up_to_hundred(value: u64) -> u64 {
    value.saturating_add(100) / 100 * 100
}

/// Y axis upper bound: the largest sample rounded up to the next hundred plus
/// one hundred of headroom, but never below `AXIS_FLOOR_MS`.
pub fn upper_bound(snapshot: &HistorySnapshot) -> u64 {
    match snapshot.max_latency() {
        Some(max) => round_up_to_hundred(max).saturating_add(100).max(AXIS_FLOOR_MS),
        None => AXIS_FLOOR_MS,
    }
}

/// Renders `targets` from `snapshot` onto a canvas of `canvas` pixels.
///
/// Series are read newest first: the most recent sample sits on the Y axis
/// and older samples trail off to the right. Failed samples break the line.
/// Degenerate canvases still get their axes and ticks but no series. The
/// canvas is clamped first and the frame reports the clamped size.
pub fn render(targets: &[Target], snapshot: &HistorySnapshot, canvas: CanvasSize) -> Frame {
    let canvas = canvas.clamped();
    let upper = upper_bound(snapshot);
    let plot_width = (canvas.width - LEFT_PADDING - RIGHT_PADDING).max(0);
    let plot_height = (canvas.height - TOP_PADDING - BOTTOM_PADDING).max(0);
    let bottom = canvas.height - BOTTOM_PADDING;

    let mut commands = vec![
        DrawCommand::Fill { width: canvas.width, height: canvas.height, color: BACKGROUND_COLOR },
        DrawCommand::Line {
            from: Point { x: LEFT_PADDING, y: TOP_PADDING },
            to: Point { x: LEFT_PADDING, y: bottom },
            color: AXIS_COLOR,
        },
        DrawCommand::Line {
            from: Point { x: LEFT_PADDING, y: bottom },
            to: Point { x: canvas.width - RIGHT_PADDING, y: bottom },
            color: AXIS_COLOR,
        },
        DrawCommand::Text {
            at: Point { x: 10, y: plot_height / 2 + TOP_PADDING },
            text: "Latency (ms)".to_string(),
            color: AXIS_COLOR,
        },
        DrawCommand::Text {
            at: Point { x: plot_width / 2 + LEFT_PADDING - 10, y: canvas.height - 25 },
            text: "Time".to_string(),
            color: AXIS_COLOR,
        },
    ];

    commands.extend(y_ticks(upper, bottom, plot_height));

    if plot_width > 0 && plot_height > 0 {
        let last_index = snapshot.capacity.saturating_sub(1).max(1);
        let x_scale = plot_width as f64 / last_index as f64;
        let y_scale = plot_height as f64 / (upper - 1) as f64;

        for target in targets {
            commands.extend(series(snapshot.samples(&target.url), target.color, upper, x_scale, y_scale));
        }
    }

    Frame { canvas, upper_bound: upper, commands }
}

fn y_ticks(upper: u64, bottom: i32, plot_height: i32) -> Vec<DrawCommand> {
    let mut commands = Vec::with_capacity(2 * (TICK_COUNT as usize + 1));
    for i in 0..=TICK_COUNT {
        let y = bottom - (i * plot_height) / TICK_COUNT;
        commands.push(DrawCommand::Line {
            from: Point { x: LEFT_PADDING, y },
            to: Point { x: LEFT_PADDING + TICK_WIDTH, y },
            color: AXIS_COLOR,
        });
        commands.push(DrawCommand::Text {
            at: Point { x: LEFT_PADDING - 30, y: y + 5 },
            text: (upper as u128 * i as u128 / TICK_COUNT as u128).to_string(),
            color: AXIS_COLOR,
        });
    }
    commands
}

fn series(samples: &[Sample], color: Color, upper: u64, x_scale: f64, y_scale: f64) -> Vec<DrawCommand> {
    let mut commands = Vec::new();
    let mut previous: Option<Point> = None;

    for (i, sample) in samples.iter().rev().enumerate() {
        let Some(ms) = sample.millis() else {
            previous = None;
            continue;
        };
        let point = Point {
            x: (i as f64 * x_scale) as i32 + LEFT_PADDING,
            y: (upper.saturating_sub(ms) as f64 * y_scale) as i32 + TOP_PADDING,
        };
        if let Some(from) = previous {
            commands.push(DrawCommand::Line { from, to: point, color });
        }
        previous = Some(point);
    }

    commands
}

/// Re-renders the chart once per request until every sender is dropped,
/// publishing each frame into `latest`.
pub async fn run_render_loop(
    mut requests: mpsc::UnboundedReceiver<RenderRequest>,
    targets: Arc<Vec<Target>>,
    history: Arc<HistoryStore>,
    canvas: CanvasSize,
    latest: Arc<Mutex<LatestFrame>>,
) {
    while let Some(request) = requests.recv().await {
        let snapshot = history.snapshot().await;
        let frame = render(&targets, &snapshot, canvas);

        let mut latest = latest.lock().await;
        latest.renders += 1;
        latest.frame = Some(frame);
        trace!("Render #{} after {:?} from '{}'", latest.renders, request.sample, request.target);
    }
}
