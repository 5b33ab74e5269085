use std::{collections::VecDeque, time::Duration};

use crate::{config::BeatConfig, AudioFeatureState};

/// Timestamps of recent beats, oldest first.
///
/// Entries older than the retention window, measured from the newest
/// entry, are evicted on every insert.
#[derive(Debug, Clone)]
pub struct BeatHistory {
    times: VecDeque<Duration>,
    window: Duration,
}

impl BeatHistory {
    pub fn new(window: Duration) -> Self {
        Self {
            times: VecDeque::new(),
            window,
        }
    }

    /// Records a beat. Timestamps that do not advance past the newest entry
    /// are rejected.
    pub fn push(&mut self, at: Duration) -> bool {
        if self.times.back().is_some_and(|last| at <= *last) {
            return false;
        }
        self.times.push_back(at);
        while self
            .times
            .front()
            .is_some_and(|first| at.saturating_sub(*first) > self.window)
        {
            self.times.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Duration> {
        self.times.iter()
    }

    /// Mean spacing between consecutive beats, from first to last entry.
    pub fn average_interval(&self) -> Option<Duration> {
        let first = self.times.front()?;
        let last = self.times.back()?;
        let gaps = u32::try_from(self.times.len().checked_sub(1)?).ok()?;
        if gaps == 0 {
            return None;
        }
        Some(last.saturating_sub(*first) / gaps)
    }

    pub fn clear(&mut self) {
        self.times.clear();
    }
}

/// A detected beat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEvent {
    pub at: Duration,
    pub bass: f32,
    /// Bass rise over the previous tick.
    pub spike: f32,
    /// Tempo after this beat, when enough beats were available to update it.
    pub bpm: Option<f32>,
    /// Number of beats currently in the history window.
    pub beats_in_window: usize,
}

/// Spike-and-threshold beat detector with a debounce and a smoothed tempo
/// estimate.
#[derive(Debug, Clone)]
pub struct BeatTracker {
    config: BeatConfig,
    history: BeatHistory,
    last_beat_at: Option<Duration>,
}

impl BeatTracker {
    pub fn new(config: BeatConfig) -> Self {
        let history = BeatHistory::new(config.history_window());
        Self {
            config,
            history,
            last_beat_at: None,
        }
    }

    pub fn history(&self) -> &BeatHistory {
        &self.history
    }

    pub fn last_beat_at(&self) -> Option<Duration> {
        self.last_beat_at
    }

    /// Bass level a beat has to exceed at the given overall energy.
    pub fn threshold(&self, energy: f32) -> f32 {
        self.config.base_threshold + energy * self.config.energy_threshold_gain
    }

    /// Whether `state` qualifies as a beat at `now`.
    pub fn is_beat(&self, state: &AudioFeatureState, now: Duration) -> bool {
        let rested = self
            .last_beat_at
            .map_or(true, |last| now.saturating_sub(last) > self.config.refractory());

        state.bass > self.threshold(state.energy)
            && state.bass - state.prev_bass > self.config.spike_threshold
            && state.rms > self.config.rms_floor
            && rested
    }

    /// Runs detection on freshly extracted features. Updates the pulse, the
    /// tempo and finally `prev_bass`.
    pub fn update(&mut self, state: &mut AudioFeatureState, now: Duration) -> Option<BeatEvent> {
        let event = if self.is_beat(state, now) {
            self.last_beat_at = Some(now);
            self.history.push(now);
            let bpm = self.estimate_tempo(state);
            state.beat_pulse = 1.0;
            Some(BeatEvent {
                at: now,
                bass: state.bass,
                spike: state.bass - state.prev_bass,
                bpm,
                beats_in_window: self.history.len(),
            })
        } else {
            state.beat_pulse *= self.config.pulse_decay;
            None
        };

        state.prev_bass = state.bass;
        event
    }

    fn estimate_tempo(&self, state: &mut AudioFeatureState) -> Option<f32> {
        if self.history.len() < self.config.min_beats_for_tempo {
            return None;
        }

        let interval_ms = self
            .history
            .average_interval()
            .map_or(0.0, |interval| interval.as_secs_f32() * 1_000.0);
        let instant = if interval_ms > 0.0 {
            60_000.0 / interval_ms
        } else {
            0.0
        };
        let clamped = instant.clamp(self.config.min_bpm, self.config.max_bpm);
        let blend = self.config.tempo_blend;
        state.bpm = state.bpm * (1.0 - blend) + clamped * blend;
        Some(state.bpm)
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last_beat_at = None;
    }
}
