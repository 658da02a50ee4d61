//! Tracking controller: camera session lifecycle and the per-frame tick.
//!
//! `Idle -> Starting -> Active -> Idle`. Starting acquires the stream and
//! waits for its first frame; each Active tick dedups the current frame,
//! runs inference when it is new, redraws the overlay and derives the blink
//! signal. Ticks are driven by [`FrameLoop`](crate::scheduler::FrameLoop).

use crate::error::TrackerError;
use crate::scheduler::{Tick, TickControl};
use meshcam_core::blendshapes::EYE_BLINK_RIGHT;
use meshcam_core::render::overlay_dimensions;
use meshcam_core::{
    DetectionResult, FaceLandmarker, FrameDeduplicator, LandmarkEngine, OverlayRenderer, RgbFrame,
    Surface,
};
use meshcam_hw::{StreamConstraints, StreamProvider, VideoSource};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Starting,
    Active,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Started { session: Uuid },
    Blink { score: f32, timestamp_ms: i64 },
    Stopped { session: Uuid, ticks: u64 },
}

/// Per-session tick counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub inferences: u64,
    /// Ticks whose frame had already been processed.
    pub skipped: u64,
    pub inference_errors: u64,
}

#[derive(Debug, Clone)]
pub struct TrackerOptions {
    pub constraints: StreamConstraints,
    /// Strictly-greater threshold on the first face's `eyeBlinkRight`.
    pub blink_threshold: f32,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            constraints: StreamConstraints::default(),
            blink_threshold: 0.4,
        }
    }
}

/// Wall-clock source for inference timestamps.
pub trait Clock {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

pub struct TrackingController<E, P: StreamProvider, S, C = SystemClock> {
    landmarker: FaceLandmarker<E>,
    provider: P,
    source: Option<P::Source>,
    surface: S,
    renderer: OverlayRenderer,
    dedup: FrameDeduplicator,
    state: TrackingState,
    latest: Option<DetectionResult>,
    user_did_blink: bool,
    options: TrackerOptions,
    last_timestamp_ms: i64,
    session: Option<Uuid>,
    stats: TickStats,
    subscribers: Vec<mpsc::UnboundedSender<TrackerEvent>>,
    clock: C,
}

impl<E, P, S> TrackingController<E, P, S, SystemClock>
where
    E: LandmarkEngine,
    P: StreamProvider,
    S: Surface,
{
    pub fn new(
        landmarker: FaceLandmarker<E>,
        provider: P,
        surface: S,
        renderer: OverlayRenderer,
        options: TrackerOptions,
    ) -> Self {
        Self::with_clock(landmarker, provider, surface, renderer, options, SystemClock)
    }
}

impl<E, P, S, C> TrackingController<E, P, S, C>
where
    E: LandmarkEngine,
    P: StreamProvider,
    S: Surface,
    C: Clock,
{
    pub fn with_clock(
        landmarker: FaceLandmarker<E>,
        provider: P,
        surface: S,
        renderer: OverlayRenderer,
        options: TrackerOptions,
        clock: C,
    ) -> Self {
        Self {
            landmarker,
            provider,
            source: None,
            surface,
            renderer,
            dedup: FrameDeduplicator::new(),
            state: TrackingState::Idle,
            latest: None,
            user_did_blink: false,
            options,
            last_timestamp_ms: i64::MIN,
            session: None,
            stats: TickStats::default(),
            subscribers: Vec::new(),
            clock,
        }
    }

    /// Begin a camera session. Returns once the first frame has arrived.
    ///
    /// Calling this while a session is starting or active does nothing.
    pub async fn start(&mut self) -> Result<(), TrackerError> {
        if self.state != TrackingState::Idle {
            tracing::debug!(state = ?self.state, "start ignored, session already running");
            return Ok(());
        }
        if !self.landmarker.is_ready() {
            return Err(TrackerError::ModelNotReady);
        }

        self.state = TrackingState::Starting;
        let mut source = match self.provider.request_stream(&self.options.constraints).await {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(error = %e, "camera stream unavailable");
                self.state = TrackingState::Idle;
                return Err(e.into());
            }
        };

        if let Err(e) = source.first_frame().await {
            tracing::warn!(error = %e, "camera stream ended before first frame");
            source.stop();
            self.state = TrackingState::Idle;
            return Err(e.into());
        }

        let session = Uuid::new_v4();
        self.source = Some(source);
        self.dedup.reset();
        self.stats = TickStats::default();
        self.session = Some(session);
        self.state = TrackingState::Active;
        tracing::info!(%session, "tracking started");
        self.emit(TrackerEvent::Started { session });
        Ok(())
    }

    /// End the session: stop the stream, clear the overlay, halt ticking.
    pub fn stop(&mut self) {
        if self.state == TrackingState::Idle {
            return;
        }
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
        self.surface.clear();
        self.latest = None;
        self.state = TrackingState::Idle;

        if let Some(session) = self.session.take() {
            let ticks = self.stats.ticks;
            tracing::info!(
                %session,
                ticks,
                inferences = self.stats.inferences,
                skipped = self.stats.skipped,
                errors = self.stats.inference_errors,
                "tracking stopped"
            );
            self.emit(TrackerEvent::Stopped { session, ticks });
        }
    }

    /// Start when idle, otherwise stop.
    pub async fn toggle(&mut self) -> Result<(), TrackerError> {
        if self.state == TrackingState::Idle {
            self.start().await
        } else {
            self.stop();
            Ok(())
        }
    }

    /// One pipeline step. Returns whether the loop should run another.
    pub fn tick(&mut self) -> TickControl {
        if self.state != TrackingState::Active {
            return TickControl::Halt;
        }
        self.stats.ticks += 1;

        match self.source.as_ref().and_then(|s| s.current_frame()) {
            Some(frame) => {
                let (width, height) = overlay_dimensions(frame.width, frame.height);
                if (self.surface.width(), self.surface.height()) != (width, height) {
                    self.surface.resize(width, height);
                }

                if self.dedup.should_process(frame.presentation_time) {
                    let timestamp_ms = self.next_timestamp();
                    let rgb = RgbFrame::new(&frame.data, frame.width, frame.height);
                    match self.landmarker.detect(rgb, timestamp_ms) {
                        Ok(result) => {
                            self.stats.inferences += 1;
                            self.check_blink(&result, timestamp_ms);
                            self.latest = Some(result);
                        }
                        Err(e) => {
                            self.stats.inference_errors += 1;
                            tracing::warn!(error = %e, timestamp_ms, "inference failed, keeping previous result");
                        }
                    }
                } else {
                    self.stats.skipped += 1;
                }

                if let Some(result) = &self.latest {
                    self.renderer.render(&mut self.surface, result);
                }
            }
            None => tracing::trace!("no frame available yet"),
        }

        if self.state == TrackingState::Active {
            TickControl::Reschedule
        } else {
            TickControl::Halt
        }
    }

    fn next_timestamp(&mut self) -> i64 {
        let now = self.clock.now_ms().max(self.last_timestamp_ms);
        self.last_timestamp_ms = now;
        now
    }

    fn check_blink(&mut self, result: &DetectionResult, timestamp_ms: i64) {
        let Some(score) = result.category_score(0, EYE_BLINK_RIGHT) else {
            return;
        };
        if score > self.options.blink_threshold {
            tracing::debug!(score, timestamp_ms, "blink detected");
            self.user_did_blink = true;
            self.emit(TrackerEvent::Blink { score, timestamp_ms });
        }
    }

    fn emit(&mut self, event: TrackerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Receive lifecycle and blink events from now on.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TrackerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.state != TrackingState::Idle
    }

    /// Latched once a blink is seen; cleared only by [`reset_blink`](Self::reset_blink).
    pub fn user_did_blink(&self) -> bool {
        self.user_did_blink
    }

    pub fn reset_blink(&mut self) {
        self.user_did_blink = false;
    }

    pub fn latest_result(&self) -> Option<&DetectionResult> {
        self.latest.as_ref()
    }

    pub fn current_frame(&self) -> Option<std::sync::Arc<meshcam_hw::Frame>> {
        self.source.as_ref().and_then(|s| s.current_frame())
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }

    pub fn session(&self) -> Option<Uuid> {
        self.session
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn landmarker_mut(&mut self) -> &mut FaceLandmarker<E> {
        &mut self.landmarker
    }

    /// Stop any session and release the model.
    pub fn shutdown(&mut self) {
        self.stop();
        self.landmarker.dispose();
    }
}

impl<E, P, S, C> Tick for TrackingController<E, P, S, C>
where
    E: LandmarkEngine,
    P: StreamProvider,
    S: Surface,
    C: Clock,
{
    fn tick(&mut self) -> TickControl {
        TrackingController::tick(self)
    }
}
