use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    config::TransitionConfig, AtmoError, Atmosphere, ModeMapping, Result, TransitionSpeed,
    VisualMode,
};

/// Turns tick timestamps into bounded frame deltas.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Duration>,
    max_delta: Duration,
}

impl FrameClock {
    pub fn new(max_delta: Duration) -> Self {
        Self {
            last: None,
            max_delta,
        }
    }

    /// Time since the previous tick, capped at `max_delta`. The first tick
    /// and timestamps that go backwards yield zero.
    pub fn advance(&mut self, now: Duration) -> Duration {
        let delta = self
            .last
            .map_or(Duration::ZERO, |last| now.saturating_sub(last));
        self.last = Some(self.last.map_or(now, |last| last.max(now)));
        delta.min(self.max_delta)
    }

    pub fn last_tick(&self) -> Option<Duration> {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Whether a crossfade is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Transitioning,
}

/// Current and upcoming visual mode plus crossfade progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionState {
    pub current_mode: VisualMode,
    pub next_mode: Option<VisualMode>,
    /// In [0, 1) while `next_mode` is set, 0 otherwise.
    pub progress: f32,
    /// Crossfade length in seconds.
    pub duration: f32,
    /// Time of the last automatic switch.
    pub last_switch_at: Duration,
}

impl TransitionState {
    pub fn phase(&self) -> Phase {
        if self.next_mode.is_some() {
            Phase::Transitioning
        } else {
            Phase::Idle
        }
    }
}

/// Crossfade state machine with atmosphere-driven mode selection.
#[derive(Debug, Clone)]
pub struct TransitionController {
    state: TransitionState,
    mapping: ModeMapping,
    automatic: bool,
    cooldown: Duration,
}

impl TransitionController {
    pub fn new(config: &TransitionConfig, mapping: ModeMapping) -> Self {
        Self {
            state: TransitionState {
                current_mode: config.initial_mode,
                next_mode: None,
                progress: 0.0,
                duration: config.duration_seconds,
                last_switch_at: Duration::ZERO,
            },
            mapping,
            automatic: config.automatic,
            cooldown: config.cooldown(),
        }
    }

    pub fn state(&self) -> &TransitionState {
        &self.state
    }

    pub fn mapping(&self) -> &ModeMapping {
        &self.mapping
    }

    pub fn is_automatic(&self) -> bool {
        self.automatic
    }

    pub fn set_automatic(&mut self, automatic: bool) {
        self.automatic = automatic;
    }

    /// Changes the crossfade length. Takes effect on the running transition
    /// at the next tick.
    pub fn set_duration(&mut self, seconds: f32) -> Result<()> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(AtmoError::InvalidInput(
                "transition duration must be a positive number of seconds",
            ));
        }
        self.state.duration = seconds;
        Ok(())
    }

    pub fn set_speed(&mut self, speed: TransitionSpeed) {
        self.state.duration = speed.seconds();
    }

    /// Starts a crossfade to `mode`, restarting progress. Returns false when
    /// `mode` is already shown or already the target.
    pub fn request_switch(&mut self, mode: VisualMode) -> bool {
        if mode == self.state.current_mode || Some(mode) == self.state.next_mode {
            return false;
        }
        self.state.next_mode = Some(mode);
        self.state.progress = 0.0;
        true
    }

    /// Advances the crossfade. Returns the newly committed mode when the
    /// transition finishes on this tick.
    pub fn tick(&mut self, dt: Duration) -> Option<VisualMode> {
        let next = self.state.next_mode?;
        self.state.progress += dt.as_secs_f32() / self.state.duration;
        if self.state.progress < 1.0 {
            return None;
        }
        self.state.current_mode = next;
        self.state.next_mode = None;
        self.state.progress = 0.0;
        Some(next)
    }

    /// Requests the mode mapped to `atmosphere` when automatic mode is on
    /// and the cooldown since the last automatic switch has passed.
    pub fn auto_select(&mut self, atmosphere: Atmosphere, now: Duration) -> Option<VisualMode> {
        if !self.automatic || now.saturating_sub(self.state.last_switch_at) <= self.cooldown {
            return None;
        }
        let desired = self.mapping.mode_for(atmosphere);
        if !self.request_switch(desired) {
            return None;
        }
        self.state.last_switch_at = now;
        Some(desired)
    }
}
