use std::{
    f32::consts::PI,
    thread,
    time::{Duration, Instant},
};

use atmo_core::{
    audio::Connection, AppConfig, AtmoError, AudioSource, ByteSpectrumAnalyser, SampleFrame,
};

const SAMPLE_RATE: f32 = 48_000.0;

/// Where the synthetic source takes its notion of "now" from.
#[derive(Debug, Clone, Copy)]
pub enum SynthClock {
    /// Wall-clock time since the source connected.
    Realtime,
    /// Advances by a fixed step on every read.
    Stepped(Duration),
}

#[derive(Debug, Clone)]
pub struct SynthSettings {
    pub bpm: f32,
    pub clock: SynthClock,
    /// Simulated permission prompt before the source becomes available.
    pub handshake: Duration,
    pub deny: bool,
}

/// Kick, off-beat hi-hat and a quiet pad, analysed like a microphone feed.
pub struct SynthSource {
    analyser: ByteSpectrumAnalyser,
    samples: Vec<f32>,
    bpm: f32,
    clock: SynthClock,
    started: Instant,
    stepped: Duration,
    rng: fastrand::Rng,
}

impl SynthSource {
    pub fn new(config: &AppConfig, settings: &SynthSettings) -> atmo_core::Result<Self> {
        let analyser = ByteSpectrumAnalyser::new(&config.analysis)?;
        let samples = vec![0.0; analyser.fft_size()];
        Ok(Self {
            analyser,
            samples,
            bpm: settings.bpm.clamp(40.0, 220.0),
            clock: settings.clock,
            started: Instant::now(),
            stepped: Duration::ZERO,
            rng: fastrand::Rng::with_seed(0x5eed),
        })
    }

    /// Runs the simulated handshake. Meant to be handed to
    /// `Visualiser::request_source`.
    pub fn connect(config: AppConfig, settings: SynthSettings) -> Connection {
        thread::sleep(settings.handshake);
        if settings.deny {
            return Err(AtmoError::SourceUnavailable(
                "permission denied by user".to_string(),
            ));
        }
        let source = Self::new(&config, &settings)?;
        Ok(Box::new(source))
    }

    fn now(&mut self) -> f32 {
        match self.clock {
            SynthClock::Realtime => self.started.elapsed().as_secs_f32(),
            SynthClock::Stepped(step) => {
                self.stepped += step;
                self.stepped.as_secs_f32()
            }
        }
    }

    fn sample_at(&mut self, t: f32) -> f32 {
        let period = 60.0 / self.bpm;
        let phase = t.rem_euclid(period);
        let sweep = 45.0 + 90.0 * (-phase / 0.03).exp();
        let kick = (2.0 * PI * sweep * phase).sin() * (-phase / 0.11).exp() * 0.9;

        let offbeat = (t + period * 0.5).rem_euclid(period);
        let noise = self.rng.f32() * 2.0 - 1.0;
        let hat = noise * (-offbeat / 0.025).exp() * 0.3;

        let pad = (2.0 * PI * 220.0 * t).sin() * 0.04 + (2.0 * PI * 330.0 * t).sin() * 0.03;

        (kick + hat + pad).clamp(-1.0, 1.0)
    }
}

impl AudioSource for SynthSource {
    fn read_frame(&mut self, frame: &mut SampleFrame) {
        let end = self.now();
        let len = self.samples.len();
        for index in 0..len {
            let offset = (len - index) as f32 / SAMPLE_RATE;
            let sample = self.sample_at(end - offset);
            self.samples[index] = sample;
        }
        if let Err(err) = self.analyser.process(&self.samples, frame) {
            tracing::warn!(error = %err, "synthetic frame dropped");
        }
    }

    fn describe(&self) -> String {
        format!("synthetic kick pattern @ {:.0} bpm", self.bpm)
    }
}
