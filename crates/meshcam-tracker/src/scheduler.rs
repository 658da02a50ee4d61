//! Refresh-driven frame loop.
//!
//! Mirrors a display's animation-frame callback: a tick runs only when one
//! has been requested, and a tick requests the next one by returning
//! [`TickControl::Reschedule`].

use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Reschedule,
    Halt,
}

/// Something driven once per refresh.
pub trait Tick {
    fn tick(&mut self) -> TickControl;
}

#[derive(Debug, Default)]
pub struct FrameLoop {
    armed: bool,
    ticks_run: u64,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a tick for the next refresh.
    pub fn request(&mut self) {
        self.armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn ticks_run(&self) -> u64 {
        self.ticks_run
    }

    /// Deliver one refresh signal. Runs the pending tick, if any.
    pub fn pump<T: Tick + ?Sized>(&mut self, target: &mut T) -> bool {
        if !self.armed {
            return false;
        }
        self.armed = false;
        self.ticks_run += 1;
        if target.tick() == TickControl::Reschedule {
            self.armed = true;
        }
        true
    }
}

/// Fire refresh signals at `refresh_hz` until the loop halts or `shutdown`
/// resolves. Returns the number of ticks run.
///
/// Late refreshes are skipped rather than bunched up.
pub async fn run_refresh_loop<T, F>(
    target: &mut T,
    frame_loop: &mut FrameLoop,
    refresh_hz: u32,
    shutdown: F,
) -> u64
where
    T: Tick + ?Sized,
    F: Future<Output = ()>,
{
    let period = Duration::from_secs_f64(1.0 / f64::from(refresh_hz.max(1)));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    while frame_loop.is_armed() {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::debug!("refresh loop shutdown requested");
                break;
            }
            _ = interval.tick() => {
                frame_loop.pump(target);
            }
        }
    }

    tracing::debug!(ticks = frame_loop.ticks_run(), "refresh loop finished");
    frame_loop.ticks_run()
}
