pub mod analyzer;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod motion_log;
pub mod pause;
pub mod raster;
pub mod sink;

pub use analyzer::{
    cell_label, classify, motion_ratio, Cell, CellBounds, GridGeometry, GridSnapshot,
    GridStateMachine, Intensity, TickStats,
};
pub use config::GridwatchConfig;
pub use engine::{DetectionEngine, DetectionEngineBuilder, TickStatus};
pub use error::{GridwatchError, Result};
pub use events::{MotionEvent, NetworkPayload};
pub use motion_log::MotionLog;
pub use pause::{PauseController, PauseTransition};
pub use raster::{FrameSampler, FrameSource, Raster};
pub use sink::{NetworkSink, NullNetworkSink, NullRenderSink, RateLimiter, RenderSink};
