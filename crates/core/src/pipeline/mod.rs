//! The per-tick driver.
//!
//! [`Pipeline`] runs extraction, beat tracking, classification and the
//! transition update synchronously for one frame of input. [`Visualiser`]
//! wraps it with the capture source so callers only provide timestamps.

use std::time::Duration;

use crate::{
    analysis::{beat::BeatTracker, FeatureExtractor},
    audio::{AudioSource, Connection, SignalProbe, SourceSlot, SourceStatus},
    render::{Crossfade, FrameSnapshot},
    timeline::{FrameClock, TransitionController, TransitionState},
    AppConfig, Atmosphere, AtmosphereClassifier, AudioFeatureState, EventSink, PipelineEvent,
    Result, SampleFrame, TransitionSpeed, VisualMode,
};

/// Owned analysis and mode-decision state, advanced once per tick.
#[derive(Debug)]
pub struct Pipeline {
    extractor: FeatureExtractor,
    features: AudioFeatureState,
    beats: BeatTracker,
    atmosphere: AtmosphereClassifier,
    transitions: TransitionController,
    clock: FrameClock,
    events: EventSink,
}

impl Pipeline {
    pub fn new(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            extractor: FeatureExtractor::new(&config.analysis),
            features: AudioFeatureState::default(),
            beats: BeatTracker::new(config.beat.clone()),
            atmosphere: AtmosphereClassifier::new(config.atmosphere.clone()),
            transitions: TransitionController::new(&config.transition, config.mapping.clone()),
            clock: FrameClock::new(config.frame.max_delta()),
            events: EventSink::disabled(),
        })
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Runs one frame. `input` is `None` while no source is attached, in
    /// which case every feature decays toward zero.
    pub fn tick(&mut self, now: Duration, input: Option<&SampleFrame>) -> FrameSnapshot {
        let dt = self.clock.advance(now);

        let mut beat = false;
        match input {
            Some(frame) => {
                self.extractor.process(&mut self.features, frame);
                if let Some(event) = self.beats.update(&mut self.features, now) {
                    beat = true;
                    self.events.emit(PipelineEvent::BeatDetected {
                        at_ms: millis(event.at),
                        bass: event.bass,
                        spike: event.spike,
                    });
                    if let Some(bpm) = event.bpm {
                        self.events.emit(PipelineEvent::TempoUpdated {
                            bpm,
                            beats: event.beats_in_window,
                        });
                    }
                }
            }
            None => self.extractor.decay(&mut self.features),
        }

        let previous = self.atmosphere.current();
        let atmosphere = self.atmosphere.update(&self.features);
        if atmosphere != previous {
            self.events.emit(PipelineEvent::AtmosphereChanged {
                from: previous,
                to: atmosphere,
            });
        }

        let shown = self.transitions.state().current_mode;
        if let Some(mode) = self.transitions.auto_select(atmosphere, now) {
            self.events.emit(PipelineEvent::ModeSwitchRequested {
                from: shown,
                to: mode,
                automatic: true,
            });
        }

        if let Some(mode) = self.transitions.tick(dt) {
            self.events.emit(PipelineEvent::TransitionCompleted { mode });
        }

        self.snapshot(now, beat)
    }

    /// Manual mode override from the UI.
    pub fn request_switch(&mut self, mode: VisualMode) -> bool {
        let shown = self.transitions.state().current_mode;
        let accepted = self.transitions.request_switch(mode);
        if accepted {
            self.events.emit(PipelineEvent::ModeSwitchRequested {
                from: shown,
                to: mode,
                automatic: false,
            });
        }
        accepted
    }

    pub fn set_automatic_mode(&mut self, automatic: bool) {
        self.transitions.set_automatic(automatic);
    }

    pub fn set_transition_duration(&mut self, seconds: f32) -> Result<()> {
        self.transitions.set_duration(seconds)
    }

    pub fn set_transition_speed(&mut self, speed: TransitionSpeed) {
        self.transitions.set_speed(speed);
    }

    pub fn features(&self) -> &AudioFeatureState {
        &self.features
    }

    pub fn atmosphere(&self) -> Atmosphere {
        self.atmosphere.current()
    }

    pub fn transition(&self) -> &TransitionState {
        self.transitions.state()
    }

    pub fn is_automatic(&self) -> bool {
        self.transitions.is_automatic()
    }

    pub fn beat_tracker(&self) -> &BeatTracker {
        &self.beats
    }

    pub fn bin_count(&self) -> usize {
        self.extractor.bin_count()
    }

    fn snapshot(&self, now: Duration, beat: bool) -> FrameSnapshot {
        let transition = self.transitions.state();
        FrameSnapshot {
            time_ms: millis(now),
            energy: self.features.energy,
            atmosphere: self.atmosphere.current(),
            current_mode: transition.current_mode,
            next_mode: transition.next_mode,
            progress: transition.progress,
            crossfade: Crossfade::from_state(transition),
            bass: self.features.bass,
            mid: self.features.mid,
            treble: self.features.treble,
            bpm: self.features.tempo(),
            beat_pulse: self.features.beat_pulse,
            beat,
            source_attached: self.features.enabled,
        }
    }
}

fn millis(at: Duration) -> u64 {
    u64::try_from(at.as_millis()).unwrap_or(u64::MAX)
}

/// [`Pipeline`] plus the capture source feeding it.
#[derive(Debug)]
pub struct Visualiser {
    pipeline: Pipeline,
    source: SourceSlot,
    frame: SampleFrame,
    probe: SignalProbe,
    arm_probe: bool,
    events: EventSink,
}

impl Visualiser {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let pipeline = Pipeline::new(config)?;
        let frame = SampleFrame::new(pipeline.bin_count());
        Ok(Self {
            pipeline,
            source: SourceSlot::new(),
            frame,
            probe: SignalProbe::new(config.source.signal_check_delay()),
            arm_probe: false,
            events: EventSink::disabled(),
        })
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.pipeline = self.pipeline.with_events(events.clone());
        self.events = events;
        self
    }

    /// Starts acquiring a source without blocking the tick loop.
    pub fn request_source<F>(&mut self, connect: F) -> bool
    where
        F: FnOnce() -> Connection + Send + 'static,
    {
        let started = self.source.request(connect);
        if started {
            self.publish_status();
        }
        started
    }

    /// Attaches a source that is already connected.
    pub fn attach_source(&mut self, source: Box<dyn AudioSource>) {
        self.source.attach(source);
        self.publish_status();
    }

    /// Drops the source without stopping the tick loop.
    pub fn detach_source(&mut self) -> bool {
        let detached = self.source.detach();
        if detached {
            self.probe.disarm();
            self.arm_probe = false;
            self.publish_status();
        }
        detached
    }

    pub fn source_status(&self) -> &SourceStatus {
        self.source.status()
    }

    pub fn tick(&mut self, now: Duration) -> FrameSnapshot {
        if self.source.poll().is_some() {
            self.publish_status();
        }
        if std::mem::take(&mut self.arm_probe) {
            self.probe.arm(now);
        }

        let input = if self.source.read(&mut self.frame) {
            if let Some(detected) = self.probe.check(now, &self.frame) {
                self.events.emit(PipelineEvent::SignalCheck { detected });
            }
            Some(&self.frame)
        } else {
            None
        };

        self.pipeline.tick(now, input)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    fn publish_status(&mut self) {
        let status = self.source.status().clone();
        if status == SourceStatus::Attached {
            self.arm_probe = true;
        }
        self.events
            .emit(PipelineEvent::SourceStatusChanged { status });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::AtmoError;

    const FRAME_MS: u64 = 16;

    fn small_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.analysis.fft_size = 128;
        config
    }

    /// Full-scale bass bins, silence elsewhere.
    fn kick_frame(bins: usize) -> SampleFrame {
        let mut frame = SampleFrame::new(bins);
        let bass_end = (bins as f32 * crate::analysis::BASS_FRACTION) as usize;
        for bin in frame.frequency.iter_mut().take(bass_end + 1) {
            *bin = 255;
        }
        frame.time_domain[0] = 200;
        frame
    }

    fn at(step: u64) -> Duration {
        Duration::from_millis(step * FRAME_MS)
    }

    struct Kick(SampleFrame);

    impl AudioSource for Kick {
        fn read_frame(&mut self, frame: &mut SampleFrame) {
            frame.clone_from(&self.0);
        }

        fn describe(&self) -> String {
            "kick".to_string()
        }
    }

    #[test]
    fn detached_pipeline_reports_ambient() {
        let mut pipeline = Pipeline::new(&small_config()).unwrap();
        let snapshot = pipeline.tick(Duration::ZERO, None);
        assert_eq!(snapshot.atmosphere, Atmosphere::Ambient);
        assert_eq!(snapshot.energy, 0.0);
        assert_eq!(snapshot.bpm, None);
        assert!(!snapshot.source_attached);
        assert_eq!(snapshot.current_mode, VisualMode::Orbit);
    }

    #[test]
    fn loud_bass_switches_to_particles_once() {
        let (sink, rx) = EventSink::channel();
        let mut pipeline = Pipeline::new(&small_config()).unwrap().with_events(sink);
        let frame = kick_frame(pipeline.bin_count());

        let mut last = None;
        for step in 0..400 {
            last = Some(pipeline.tick(at(step), Some(&frame)));
        }
        let last = last.unwrap();

        assert_eq!(last.atmosphere, Atmosphere::Energetic);
        assert_eq!(last.current_mode, VisualMode::Particles);
        assert_eq!(last.next_mode, None);
        assert!(last.source_attached);
        assert!(last.energy > 0.3);

        let events: Vec<_> = rx.try_iter().collect();
        let switches: Vec<_> = events
            .iter()
            .filter(|event| matches!(event, PipelineEvent::ModeSwitchRequested { .. }))
            .collect();
        assert_eq!(
            switches,
            vec![&PipelineEvent::ModeSwitchRequested {
                from: VisualMode::Orbit,
                to: VisualMode::Particles,
                automatic: true,
            }]
        );
        assert!(events.contains(&PipelineEvent::TransitionCompleted {
            mode: VisualMode::Particles
        }));
        assert!(events
            .iter()
            .any(|event| matches!(event, PipelineEvent::BeatDetected { at_ms: 0, .. })));
    }

    #[test]
    fn atmosphere_flips_within_cooldown_switch_once() {
        let mut config = small_config();
        config.atmosphere.history_capacity = 1;
        let (sink, rx) = EventSink::channel();
        let mut pipeline = Pipeline::new(&config).unwrap().with_events(sink);
        let loud = kick_frame(pipeline.bin_count());
        let silent = SampleFrame::new(pipeline.bin_count());

        // Energetic until just past the cooldown, then quiet for 2 s.
        let mut step = 0;
        while at(step) <= Duration::from_millis(2_900) {
            pipeline.tick(at(step), Some(&loud));
            step += 1;
        }
        while at(step) <= Duration::from_millis(4_900) {
            pipeline.tick(at(step), Some(&silent));
            step += 1;
        }

        let requested: Vec<_> = rx
            .try_iter()
            .filter_map(|event| match event {
                PipelineEvent::ModeSwitchRequested { to, .. } => Some(to),
                _ => None,
            })
            .collect();
        assert_eq!(requested, vec![VisualMode::Particles]);
    }

    #[test]
    fn silence_after_signal_decays_to_ambient() {
        let mut pipeline = Pipeline::new(&small_config()).unwrap();
        let frame = kick_frame(pipeline.bin_count());
        for step in 0..60 {
            pipeline.tick(at(step), Some(&frame));
        }

        let mut energy = pipeline.features().energy;
        let mut last = None;
        for step in 60..120 {
            let snapshot = pipeline.tick(at(step), None);
            assert!(snapshot.energy <= energy);
            energy = snapshot.energy;
            last = Some(snapshot);
        }
        let last = last.unwrap();
        assert_eq!(last.atmosphere, Atmosphere::Ambient);
        assert!(!last.source_attached);
    }

    #[test]
    fn manual_switch_is_reported() {
        let (sink, rx) = EventSink::channel();
        let mut pipeline = Pipeline::new(&small_config()).unwrap().with_events(sink);
        pipeline.set_automatic_mode(false);
        assert!(pipeline.request_switch(VisualMode::Lattice));
        assert!(!pipeline.request_switch(VisualMode::Lattice));
        assert!(pipeline.set_transition_duration(0.0).is_err());
        pipeline.set_transition_speed(TransitionSpeed::Fast);

        let mut snapshot = pipeline.tick(Duration::ZERO, None);
        assert_eq!(snapshot.next_mode, Some(VisualMode::Lattice));
        for step in 1..=70 {
            snapshot = pipeline.tick(at(step), None);
        }
        assert_eq!(snapshot.current_mode, VisualMode::Lattice);
        assert!(!pipeline.is_automatic());

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events.first(),
            Some(&PipelineEvent::ModeSwitchRequested {
                from: VisualMode::Orbit,
                to: VisualMode::Lattice,
                automatic: false,
            })
        );
    }

    #[test]
    fn stalled_frames_do_not_jump_the_crossfade() {
        let mut pipeline = Pipeline::new(&small_config()).unwrap();
        pipeline.set_automatic_mode(false);
        pipeline.request_switch(VisualMode::Pulse);
        pipeline.tick(Duration::ZERO, None);
        let snapshot = pipeline.tick(Duration::from_secs(30), None);
        assert_eq!(snapshot.next_mode, Some(VisualMode::Pulse));
        assert!((snapshot.progress - 0.08 / 1.8).abs() < 1e-5);
    }

    #[test]
    fn attached_source_feeds_the_pipeline_and_checks_signal() {
        let (sink, rx) = EventSink::channel();
        let config = small_config();
        let mut visualiser = Visualiser::new(&config).unwrap().with_events(sink);
        let frame = kick_frame(visualiser.pipeline().bin_count());

        assert!(!visualiser.tick(Duration::ZERO).source_attached);
        visualiser.attach_source(Box::new(Kick(frame)));
        for step in 1..=40 {
            assert!(visualiser.tick(at(step)).source_attached);
        }

        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.contains(&PipelineEvent::SourceStatusChanged {
            status: SourceStatus::Attached
        }));
        let checks: Vec<_> = events
            .iter()
            .filter(|event| matches!(event, PipelineEvent::SignalCheck { .. }))
            .collect();
        assert_eq!(checks, vec![&PipelineEvent::SignalCheck { detected: true }]);

        assert!(visualiser.detach_source());
        assert!(!visualiser.tick(at(41)).source_attached);
        assert_eq!(visualiser.source_status(), &SourceStatus::Detached);
    }

    #[test]
    fn unavailable_source_keeps_decay_mode() {
        let (sink, rx) = EventSink::channel();
        let mut visualiser = Visualiser::new(&small_config()).unwrap().with_events(sink);
        visualiser.request_source(|| Err(AtmoError::SourceUnavailable("no device".to_string())));

        let started = Instant::now();
        let mut step = 0;
        while !matches!(visualiser.source_status(), SourceStatus::Unavailable(_)) {
            let snapshot = visualiser.tick(at(step));
            assert!(!snapshot.source_attached);
            assert!(started.elapsed() < Duration::from_secs(5));
            std::thread::sleep(Duration::from_millis(1));
            step += 1;
        }
        assert!(!visualiser.tick(at(step)).source_attached);

        let statuses: Vec<_> = rx
            .try_iter()
            .filter_map(|event| match event {
                PipelineEvent::SourceStatusChanged { status } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0], SourceStatus::Pending);
        assert!(matches!(&statuses[1], SourceStatus::Unavailable(reason) if reason.contains("no device")));
    }
}
