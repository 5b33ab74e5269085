use std::time::Duration;

use atmo_core::{
    analysis::BASS_FRACTION, AppConfig, AudioSource, EventSink, PipelineEvent, SampleFrame,
    SourceStatus, Visualiser,
};

const TICK_MS: u64 = 20;

/// Emits a few full-scale bass frames at the start of every period and
/// silence in between. One read per tick.
struct KickPattern {
    tick: u64,
    period_ticks: u64,
    loud_ticks: u64,
}

impl KickPattern {
    fn at_bpm(bpm: u64) -> Self {
        Self {
            tick: 0,
            period_ticks: 60_000 / bpm / TICK_MS,
            loud_ticks: 3,
        }
    }
}

impl AudioSource for KickPattern {
    fn read_frame(&mut self, frame: &mut SampleFrame) {
        let loud = self.tick % self.period_ticks < self.loud_ticks;
        let bass_end = (frame.bin_count() as f32 * BASS_FRACTION) as usize;
        for (index, bin) in frame.frequency.iter_mut().enumerate() {
            *bin = if loud && index <= bass_end { 255 } else { 0 };
        }
        frame.time_domain.fill(if loud { 250 } else { 128 });
        self.tick += 1;
    }
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.analysis.fft_size = 256;
    config
}

fn at(step: u64) -> Duration {
    Duration::from_millis(step * TICK_MS)
}

#[test]
fn steady_kicks_converge_on_their_tempo() {
    let (sink, rx) = EventSink::channel();
    let mut visualiser = Visualiser::new(&config()).unwrap().with_events(sink);
    visualiser.attach_source(Box::new(KickPattern::at_bpm(120)));

    let mut snapshot = visualiser.tick(at(0));
    for step in 1..1_500 {
        snapshot = visualiser.tick(at(step));
        if let Some(bpm) = snapshot.bpm {
            assert!(bpm > 0.0 && bpm <= 220.0);
        }
    }

    let bpm = snapshot.bpm.expect("tempo should be estimated");
    assert!((bpm - 120.0).abs() < 1.0, "bpm {bpm}");

    let events: Vec<_> = rx.try_iter().collect();
    let beats: Vec<u64> = events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::BeatDetected { at_ms, .. } => Some(*at_ms),
            _ => None,
        })
        .collect();
    assert_eq!(beats.len(), 60);
    assert!(beats.windows(2).all(|pair| pair[1] - pair[0] == 500));
    assert!(events
        .iter()
        .any(|event| matches!(event, PipelineEvent::TempoUpdated { beats: 4, .. })));
}

#[test]
fn detaching_fades_out_and_reattaching_resumes() {
    let mut visualiser = Visualiser::new(&config()).unwrap();
    visualiser.attach_source(Box::new(KickPattern::at_bpm(120)));

    let mut step = 0;
    while step < 500 {
        visualiser.tick(at(step));
        step += 1;
    }
    let tempo = visualiser.pipeline().features().bpm;
    assert!(tempo > 100.0);

    assert!(visualiser.detach_source());
    let mut previous = *visualiser.pipeline().features();
    for _ in 0..100 {
        let snapshot = visualiser.tick(at(step));
        step += 1;
        let features = visualiser.pipeline().features();
        assert!(!snapshot.source_attached);
        assert!(features.bpm <= previous.bpm);
        assert!(features.energy <= previous.energy);
        assert!(features.beat_pulse <= previous.beat_pulse);
        previous = *features;
    }
    assert_eq!(visualiser.source_status(), &SourceStatus::Detached);

    visualiser.attach_source(Box::new(KickPattern::at_bpm(120)));
    let snapshot = visualiser.tick(at(step));
    assert!(snapshot.source_attached);
    assert!(snapshot.beat);
}
