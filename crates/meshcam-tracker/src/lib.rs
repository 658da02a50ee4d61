//! meshcam-tracker: Live face tracking session control.
//!
//! Drives camera acquisition, per-frame inference and overlay redraw from a
//! refresh-rate frame loop, and derives the blink signal.

pub mod config;
pub mod controller;
pub mod error;
pub mod scheduler;

pub use config::{Config, ConfigError, OverlayConfig};
pub use controller::{
    Clock, SystemClock, TickStats, TrackerEvent, TrackerOptions, TrackingController, TrackingState,
};
pub use error::TrackerError;
pub use scheduler::{run_refresh_loop, FrameLoop, Tick, TickControl};
