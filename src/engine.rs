use crate::analyzer::{GridSnapshot, GridStateMachine};
use crate::config::GridwatchConfig;
use crate::error::Result;
use crate::events::NetworkPayload;
use crate::motion_log::MotionLog;
use crate::pause::PauseController;
use crate::raster::{FrameSampler, FrameSource, Raster};
use crate::sink::{NetworkSink, NullNetworkSink, NullRenderSink, RateLimiter, RenderSink};

use chrono::Utc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What a single driver invocation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// Detection is switched off
    Disabled,
    /// The frame source had no frame available
    SourceNotReady,
    /// Less than the minimum tick interval elapsed since the last tick
    Throttled,
    /// Detection is auto-paused; the analyzer was skipped
    Paused,
    /// A scheduled resume fired; the grid was reset
    Resumed,
    /// First frame stored, nothing to compare against yet
    FirstFrame,
    /// Raster dimensions changed; comparison restarted
    DimensionReset,
    /// A full analysis tick ran
    Analyzed { events: usize },
}

/// The grid motion detection engine and its cooperative loop driver.
///
/// Owns all mutable detection state: the cell grid, the previous raster, the
/// pause controller and every pending deadline. External collaborators only
/// see cloned snapshots and serializable payloads. Invocations must be
/// serialized by the caller; nothing here blocks.
pub struct DetectionEngine {
    config: GridwatchConfig,
    sampler: FrameSampler,
    grid: GridStateMachine,
    pause: PauseController,
    log: MotionLog,
    render_sink: Box<dyn RenderSink>,
    network_sink: Box<dyn NetworkSink>,
    enabled: bool,
    previous_raster: Option<Raster>,
    last_tick: Option<Instant>,
    render_limiter: RateLimiter,
    remote_render_limiter: RateLimiter,
    send_limiter: RateLimiter,
}

impl DetectionEngine {
    /// Create a new engine. Fails fast on an invalid configuration.
    pub fn new(
        config: GridwatchConfig,
        render_sink: Box<dyn RenderSink>,
        network_sink: Box<dyn NetworkSink>,
    ) -> Result<Self> {
        config.validate()?;

        info!(
            "Initializing detection engine ({}x{} grid, 1/{} resolution)",
            config.grid.rows, config.grid.cols, config.sampler.downscale
        );

        Ok(Self {
            sampler: FrameSampler::new(config.sampler.downscale),
            grid: GridStateMachine::new(config.grid.rows, config.grid.cols),
            pause: PauseController::new(&config.pause),
            log: MotionLog::new(),
            render_sink,
            network_sink,
            enabled: false,
            previous_raster: None,
            last_tick: None,
            render_limiter: RateLimiter::new(config.driver.render_interval()),
            remote_render_limiter: RateLimiter::new(config.driver.render_interval()),
            send_limiter: RateLimiter::new(config.driver.send_interval()),
            config,
        })
    }

    pub fn builder() -> DetectionEngineBuilder {
        DetectionEngineBuilder::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    pub fn config(&self) -> &GridwatchConfig {
        &self.config
    }

    pub fn log(&self) -> &MotionLog {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn snapshot(&self) -> GridSnapshot {
        self.grid.snapshot()
    }

    /// Switch detection on, resetting all state, and notify the peer.
    /// Re-enabling an enabled engine resets it again.
    pub fn enable(&mut self) {
        self.enabled = true;
        self.reset();
        info!("Grid motion detection enabled");
        self.network_sink
            .send(NetworkPayload::MotionToggle { enabled: true });
    }

    /// Switch detection off, clear overlays and notify the peer
    pub fn disable(&mut self) {
        self.enabled = false;
        self.reset();
        self.render_sink.render_local(&self.grid.snapshot());
        info!("Grid motion detection disabled");
        self.network_sink
            .send(NetworkPayload::MotionToggle { enabled: false });
    }

    /// Reinitialize detection state: grid, pause controller, frame
    /// comparison and every throttle. Pending deadlines are cancelled.
    /// The motion log is preserved.
    pub fn reset(&mut self) {
        self.grid.reset();
        self.pause.reset();
        self.previous_raster = None;
        self.last_tick = None;
        self.render_limiter.reset();
        self.remote_render_limiter.reset();
        self.send_limiter.reset();
    }

    /// Run one driver invocation against the frame source
    pub fn drive(&mut self, source: &mut dyn FrameSource) -> TickStatus {
        self.drive_at(source, Instant::now())
    }

    /// Run one driver invocation at an explicit instant.
    ///
    /// Deadlines (cell expiry, pause resume) are checked against `now`, which
    /// lets callers and tests drive time without sleeping.
    pub fn drive_at(&mut self, source: &mut dyn FrameSource, now: Instant) -> TickStatus {
        if !self.enabled {
            return TickStatus::Disabled;
        }

        // expiry deadlines keep running even while paused; only
        // level/intensity freeze
        if self.grid.expire_stale(now) > 0 {
            self.render_local(now);
        }

        if self.pause.is_paused() {
            if self.pause.poll(now).is_some() {
                self.restart_after_resume();
                return TickStatus::Resumed;
            }
            return TickStatus::Paused;
        }

        if !source.is_ready() {
            return TickStatus::SourceNotReady;
        }

        if let Some(last) = self.last_tick {
            if now.duration_since(last) < self.config.driver.min_tick_interval() {
                return TickStatus::Throttled;
            }
        }

        let Some(frame) = source.current_frame() else {
            return TickStatus::SourceNotReady;
        };
        if !frame.validate_size() {
            warn!(
                "Dropping frame with inconsistent buffer ({}x{}, {} bytes)",
                frame.width,
                frame.height,
                frame.data().len()
            );
            return TickStatus::SourceNotReady;
        }

        self.last_tick = Some(now);
        let raster = self.sampler.sample(&frame);

        let status = match self.previous_raster.take() {
            None => TickStatus::FirstFrame,
            Some(prev) if !prev.dimensions_match(&raster) => {
                debug!(
                    "Raster dimensions changed {}x{} -> {}x{}, restarting comparison",
                    prev.width, prev.height, raster.width, raster.height
                );
                TickStatus::DimensionReset
            }
            Some(prev) => {
                let wall = Utc::now();
                let stats = self
                    .grid
                    .tick(&prev, &raster, &self.config.analyzer, now, wall);
                let emitted = stats.events.len();

                // may enter Paused; this tick's results are still surfaced
                self.pause.update(stats.high_fraction, now);

                for event in &stats.events {
                    self.log.append(event.clone());
                }

                self.render_local(now);

                if !stats.events.is_empty() && self.send_limiter.try_fire(now) {
                    self.network_sink.send(NetworkPayload::GridMotion {
                        events: stats.events,
                        grid_data: self.grid.snapshot(),
                        timestamp: wall,
                    });
                }

                TickStatus::Analyzed { events: emitted }
            }
        };

        self.previous_raster = Some(raster);
        status
    }

    /// Accept a snapshot a remote peer sent and forward it for overlay.
    ///
    /// Malformed shapes are ignored; a peer can never fail the session.
    pub fn handle_remote_grid(&mut self, snapshot: GridSnapshot) {
        self.handle_remote_grid_at(snapshot, Instant::now())
    }

    pub fn handle_remote_grid_at(&mut self, snapshot: GridSnapshot, now: Instant) {
        if !snapshot.matches_shape(self.grid.rows(), self.grid.cols()) {
            debug!(
                "Ignoring malformed remote grid ({}x{} with {} cells)",
                snapshot.rows,
                snapshot.cols,
                snapshot.cells.len()
            );
            return;
        }
        if self.remote_render_limiter.try_fire(now) {
            self.render_sink.render_remote(&snapshot);
        }
    }

    /// Dispatch a decoded peer message
    pub fn handle_remote_message(&mut self, payload: NetworkPayload) {
        match payload {
            NetworkPayload::GridMotion { grid_data, .. } => self.handle_remote_grid(grid_data),
            NetworkPayload::MotionToggle { enabled } => {
                info!(
                    "Remote peer motion detection {}",
                    if enabled { "enabled" } else { "disabled" }
                );
            }
        }
    }

    fn render_local(&mut self, now: Instant) {
        if self.render_limiter.try_fire(now) {
            let snapshot = self.grid.snapshot();
            self.render_sink.render_local(&snapshot);
        }
    }

    fn restart_after_resume(&mut self) {
        // stale diffs against the pre-pause raster would re-pause immediately
        self.grid.reset();
        self.previous_raster = None;
        self.render_sink.render_local(&self.grid.snapshot());
    }
}

/// Builder for DetectionEngine
#[derive(Default)]
pub struct DetectionEngineBuilder {
    config: Option<GridwatchConfig>,
    render_sink: Option<Box<dyn RenderSink>>,
    network_sink: Option<Box<dyn NetworkSink>>,
}

impl DetectionEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: GridwatchConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn render_sink<S: RenderSink + 'static>(mut self, sink: S) -> Self {
        self.render_sink = Some(Box::new(sink));
        self
    }

    pub fn network_sink<S: NetworkSink + 'static>(mut self, sink: S) -> Self {
        self.network_sink = Some(Box::new(sink));
        self
    }

    /// Build the engine; missing sinks default to null sinks
    pub fn build(self) -> Result<DetectionEngine> {
        DetectionEngine::new(
            self.config.unwrap_or_default(),
            self.render_sink
                .unwrap_or_else(|| Box::new(NullRenderSink)),
            self.network_sink
                .unwrap_or_else(|| Box::new(NullNetworkSink)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Intensity;
    use crate::raster::RASTER_BPP;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct QueueSource {
        frames: VecDeque<Raster>,
    }

    impl QueueSource {
        fn new(frames: Vec<Raster>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    impl FrameSource for QueueSource {
        fn is_ready(&self) -> bool {
            !self.frames.is_empty()
        }

        fn current_frame(&mut self) -> Option<Raster> {
            self.frames.pop_front()
        }
    }

    #[derive(Clone, Default)]
    struct RecordingRenderSink {
        local: Arc<Mutex<Vec<GridSnapshot>>>,
        remote: Arc<Mutex<Vec<GridSnapshot>>>,
    }

    impl RenderSink for RecordingRenderSink {
        fn render_local(&mut self, snapshot: &GridSnapshot) {
            self.local.lock().unwrap().push(snapshot.clone());
        }

        fn render_remote(&mut self, snapshot: &GridSnapshot) {
            self.remote.lock().unwrap().push(snapshot.clone());
        }
    }

    #[derive(Clone, Default)]
    struct RecordingNetworkSink {
        payloads: Arc<Mutex<Vec<NetworkPayload>>>,
    }

    impl RecordingNetworkSink {
        fn motion_payloads(&self) -> usize {
            self.payloads
                .lock()
                .unwrap()
                .iter()
                .filter(|payload| matches!(payload, NetworkPayload::GridMotion { .. }))
                .count()
        }
    }

    impl NetworkSink for RecordingNetworkSink {
        fn send(&mut self, payload: NetworkPayload) {
            self.payloads.lock().unwrap().push(payload);
        }
    }

    fn uniform_frame(width: u32, height: u32, value: u8) -> Raster {
        Raster::new(
            width,
            height,
            vec![value; (width * height * RASTER_BPP) as usize],
        )
    }

    /// Dark 100x100 frame with a bright block covering the source region
    /// that downsamples onto grid cell A1
    fn frame_with_top_left_motion() -> Raster {
        let mut data = vec![0u8; (100 * 100 * RASTER_BPP) as usize];
        for y in 0..16u32 {
            for x in 0..16u32 {
                let index = ((y * 100 + x) * RASTER_BPP) as usize;
                data[index] = 255;
                data[index + 1] = 255;
                data[index + 2] = 255;
            }
        }
        Raster::new(100, 100, data)
    }

    fn engine_with_sinks() -> (DetectionEngine, RecordingRenderSink, RecordingNetworkSink) {
        let render = RecordingRenderSink::default();
        let network = RecordingNetworkSink::default();
        let engine = DetectionEngine::builder()
            .render_sink(render.clone())
            .network_sink(network.clone())
            .build()
            .unwrap();
        (engine, render, network)
    }

    #[test]
    fn test_invalid_config_fails_construction() {
        let mut config = GridwatchConfig::default();
        config.grid.rows = 0;
        assert!(DetectionEngine::builder().config(config).build().is_err());
    }

    #[test]
    fn test_disabled_engine_ignores_frames() {
        let (mut engine, _render, _network) = engine_with_sinks();
        let mut source = QueueSource::new(vec![uniform_frame(100, 100, 0)]);

        assert_eq!(
            engine.drive_at(&mut source, Instant::now()),
            TickStatus::Disabled
        );
        assert!(source.is_ready());
    }

    #[test]
    fn test_identical_frames_produce_no_events() {
        let (mut engine, _render, network) = engine_with_sinks();
        engine.enable();
        let frame = uniform_frame(100, 100, 100);
        let mut source = QueueSource::new(vec![frame.clone(), frame]);
        let t0 = Instant::now();

        assert_eq!(engine.drive_at(&mut source, t0), TickStatus::FirstFrame);
        assert_eq!(
            engine.drive_at(&mut source, t0 + Duration::from_millis(60)),
            TickStatus::Analyzed { events: 0 }
        );

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.active_count(), 0);
        assert!(snapshot
            .cells
            .iter()
            .all(|cell| cell.intensity == Intensity::None));
        assert!(engine.log().is_empty());
        assert_eq!(network.motion_payloads(), 0);
    }

    #[test]
    fn test_localized_motion_emits_single_event() {
        let (mut engine, _render, network) = engine_with_sinks();
        engine.enable();
        let mut source = QueueSource::new(vec![
            uniform_frame(100, 100, 0),
            frame_with_top_left_motion(),
        ]);
        let t0 = Instant::now();

        engine.drive_at(&mut source, t0);
        let status = engine.drive_at(&mut source, t0 + Duration::from_millis(60));
        assert_eq!(status, TickStatus::Analyzed { events: 1 });

        assert_eq!(engine.log().len(), 1);
        let event = &engine.log().recent_window(10)[0];
        assert_eq!(event.coordinate, "A1");
        assert_eq!(event.intensity, Intensity::High);

        assert_eq!(network.motion_payloads(), 1);
        let payloads = network.payloads.lock().unwrap();
        let motion = payloads
            .iter()
            .find(|payload| matches!(payload, NetworkPayload::GridMotion { .. }))
            .unwrap();
        match motion {
            NetworkPayload::GridMotion {
                events, grid_data, ..
            } => {
                assert_eq!(events.len(), 1);
                assert!(grid_data.matches_shape(6, 6));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_tick_rate_limit() {
        let (mut engine, _render, _network) = engine_with_sinks();
        engine.enable();
        let frame = uniform_frame(100, 100, 50);
        let mut source = QueueSource::new(vec![frame.clone(), frame]);
        let t0 = Instant::now();

        assert_eq!(engine.drive_at(&mut source, t0), TickStatus::FirstFrame);
        // 10ms later is under the 50ms minimum; the frame is not consumed
        assert_eq!(
            engine.drive_at(&mut source, t0 + Duration::from_millis(10)),
            TickStatus::Throttled
        );
        assert!(source.is_ready());
    }

    #[test]
    fn test_empty_source_is_silent_noop() {
        let (mut engine, _render, _network) = engine_with_sinks();
        engine.enable();
        let mut source = QueueSource::new(Vec::new());

        assert_eq!(
            engine.drive_at(&mut source, Instant::now()),
            TickStatus::SourceNotReady
        );
    }

    #[test]
    fn test_dimension_change_restarts_comparison() {
        let (mut engine, _render, _network) = engine_with_sinks();
        engine.enable();
        let mut source = QueueSource::new(vec![
            uniform_frame(100, 100, 0),
            uniform_frame(80, 80, 255),
            uniform_frame(80, 80, 255),
        ]);
        let t0 = Instant::now();

        assert_eq!(engine.drive_at(&mut source, t0), TickStatus::FirstFrame);
        // resolution changed mid-session: no motion computed despite the
        // full-frame luminance jump
        assert_eq!(
            engine.drive_at(&mut source, t0 + Duration::from_millis(60)),
            TickStatus::DimensionReset
        );
        assert_eq!(
            engine.drive_at(&mut source, t0 + Duration::from_millis(120)),
            TickStatus::Analyzed { events: 0 }
        );
    }

    #[test]
    fn test_auto_pause_and_scheduled_resume() {
        let (mut engine, _render, _network) = engine_with_sinks();
        engine.enable();
        let mut source = QueueSource::new(vec![
            uniform_frame(100, 100, 0),
            uniform_frame(100, 100, 255),
        ]);
        let t0 = Instant::now();

        engine.drive_at(&mut source, t0);
        let status = engine.drive_at(&mut source, t0 + Duration::from_millis(60));
        assert_eq!(status, TickStatus::Analyzed { events: 36 });
        assert!(engine.is_paused());

        // paused invocations skip the analyzer entirely
        for millis in [120u64, 500, 1000, 2000] {
            assert_eq!(
                engine.drive_at(&mut source, t0 + Duration::from_millis(millis)),
                TickStatus::Paused
            );
        }

        // resume deadline was armed at t0+60ms
        let status = engine.drive_at(&mut source, t0 + Duration::from_millis(2060));
        assert_eq!(status, TickStatus::Resumed);
        assert!(!engine.is_paused());
        assert_eq!(engine.snapshot().active_count(), 0);

        // comparison restarts from scratch after the reset
        let mut more = QueueSource::new(vec![uniform_frame(100, 100, 255)]);
        assert_eq!(
            engine.drive_at(&mut more, t0 + Duration::from_millis(2120)),
            TickStatus::FirstFrame
        );
    }

    #[test]
    fn test_cell_expiry_settles_active_cells() {
        let (mut engine, _render, _network) = engine_with_sinks();
        engine.enable();
        let mut source = QueueSource::new(vec![
            uniform_frame(100, 100, 0),
            frame_with_top_left_motion(),
        ]);
        let t0 = Instant::now();

        engine.drive_at(&mut source, t0);
        engine.drive_at(&mut source, t0 + Duration::from_millis(60));
        assert_eq!(engine.snapshot().active_count(), 1);

        // no further motion: the cell settles 200ms after its last refresh
        let mut empty = QueueSource::new(Vec::new());
        engine.drive_at(&mut empty, t0 + Duration::from_millis(261));
        assert_eq!(engine.snapshot().active_count(), 0);
        // intensity freezes at its last observed value until recomputed
        assert_eq!(
            engine.snapshot().cell(0, 0).unwrap().intensity,
            Intensity::High
        );
    }

    #[test]
    fn test_remote_grid_forwarding_and_validation() {
        let (mut engine, render, _network) = engine_with_sinks();
        engine.enable();
        let t0 = Instant::now();

        let valid = GridStateMachine::new(6, 6).snapshot();
        engine.handle_remote_grid_at(valid, t0);
        assert_eq!(render.remote.lock().unwrap().len(), 1);

        // wrong shape: silently ignored
        let malformed = GridStateMachine::new(5, 5).snapshot();
        engine.handle_remote_grid_at(malformed, t0 + Duration::from_millis(40));
        assert_eq!(render.remote.lock().unwrap().len(), 1);

        // remote overlay renders are throttled independently
        let valid = GridStateMachine::new(6, 6).snapshot();
        engine.handle_remote_grid_at(valid.clone(), t0 + Duration::from_millis(50));
        engine.handle_remote_grid_at(valid, t0 + Duration::from_millis(60));
        assert_eq!(render.remote.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_remote_message_dispatch() {
        let (mut engine, render, _network) = engine_with_sinks();
        engine.enable();

        engine.handle_remote_message(NetworkPayload::GridMotion {
            events: Vec::new(),
            grid_data: GridStateMachine::new(6, 6).snapshot(),
            timestamp: Utc::now(),
        });
        assert_eq!(render.remote.lock().unwrap().len(), 1);

        // toggle notifications carry no grid to draw
        engine.handle_remote_message(NetworkPayload::MotionToggle { enabled: false });
        assert_eq!(render.remote.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_toggle_messages_reach_network_sink() {
        let (mut engine, _render, network) = engine_with_sinks();

        engine.enable();
        engine.disable();

        let payloads = network.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 2);
        assert!(matches!(
            payloads[0],
            NetworkPayload::MotionToggle { enabled: true }
        ));
        assert!(matches!(
            payloads[1],
            NetworkPayload::MotionToggle { enabled: false }
        ));
    }

    #[test]
    fn test_log_survives_reset() {
        let (mut engine, _render, _network) = engine_with_sinks();
        engine.enable();
        let mut source = QueueSource::new(vec![
            uniform_frame(100, 100, 0),
            frame_with_top_left_motion(),
        ]);
        let t0 = Instant::now();
        engine.drive_at(&mut source, t0);
        engine.drive_at(&mut source, t0 + Duration::from_millis(60));
        assert_eq!(engine.log().len(), 1);

        engine.enable(); // re-enable resets detection state
        assert_eq!(engine.snapshot().active_count(), 0);
        assert_eq!(engine.log().len(), 1);

        engine.clear_log();
        assert!(engine.log().is_empty());
    }
}
