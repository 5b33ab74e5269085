use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{AtmoError, ModeMapping, Result, TransitionSpeed, VisualMode};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub analysis: AnalysisConfig,
    pub beat: BeatConfig,
    pub atmosphere: AtmosphereConfig,
    pub transition: TransitionConfig,
    pub mapping: ModeMapping,
    pub frame: FrameConfig,
    pub source: SourceConfig,
}

impl AppConfig {
    pub fn live_defaults() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing sections and fields keep their
    /// defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()?;
        self.beat.validate()?;
        self.atmosphere.validate()?;
        self.transition.validate()?;
        self.frame.validate()
    }
}

fn check_blend(name: &str, value: f32) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(AtmoError::InvalidConfig(format!(
            "{name} must lie in (0, 1], got {value}"
        )))
    }
}

/// Configuration of the spectrum analyser and feature smoothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Analysis window in samples. The frequency array holds half as many
    /// bins.
    pub fft_size: usize,
    /// Blend factor for rms, bands and centroid. Higher reacts faster and
    /// jitters more.
    pub smoothing: f32,
    /// Blend factor for the composite energy score.
    pub energy_smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.22,
            energy_smoothing: 0.15,
            min_decibels: -90.0,
            max_decibels: -10.0,
        }
    }
}

impl AnalysisConfig {
    /// Length of the frequency-domain array.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    fn validate(&self) -> Result<()> {
        if self.fft_size < 2 || self.fft_size % 2 != 0 {
            return Err(AtmoError::InvalidConfig(format!(
                "analysis.fft_size must be an even number of at least 2, got {}",
                self.fft_size
            )));
        }
        check_blend("analysis.smoothing", self.smoothing)?;
        check_blend("analysis.energy_smoothing", self.energy_smoothing)?;
        if self.min_decibels >= self.max_decibels {
            return Err(AtmoError::InvalidConfig(format!(
                "analysis.min_decibels ({}) must be below max_decibels ({})",
                self.min_decibels, self.max_decibels
            )));
        }
        Ok(())
    }
}

/// Thresholds for beat detection and tempo estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    pub base_threshold: f32,
    /// How much the overall energy raises the bass threshold.
    pub energy_threshold_gain: f32,
    /// Minimum tick-over-tick bass rise.
    pub spike_threshold: f32,
    pub rms_floor: f32,
    pub refractory_ms: u64,
    pub history_window_ms: u64,
    /// Beats required in the window before a tempo is estimated.
    pub min_beats_for_tempo: usize,
    pub tempo_blend: f32,
    pub min_bpm: f32,
    pub max_bpm: f32,
    pub pulse_decay: f32,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            base_threshold: 0.15,
            energy_threshold_gain: 0.15,
            spike_threshold: 0.02,
            rms_floor: 0.03,
            refractory_ms: 220,
            history_window_ms: 12_000,
            min_beats_for_tempo: 4,
            tempo_blend: 0.18,
            min_bpm: 40.0,
            max_bpm: 220.0,
            pulse_decay: 0.92,
        }
    }
}

impl BeatConfig {
    pub fn refractory(&self) -> Duration {
        Duration::from_millis(self.refractory_ms)
    }

    pub fn history_window(&self) -> Duration {
        Duration::from_millis(self.history_window_ms)
    }

    fn validate(&self) -> Result<()> {
        check_blend("beat.tempo_blend", self.tempo_blend)?;
        if !(0.0..1.0).contains(&self.pulse_decay) {
            return Err(AtmoError::InvalidConfig(format!(
                "beat.pulse_decay must lie in [0, 1), got {}",
                self.pulse_decay
            )));
        }
        if self.min_bpm <= 0.0 || self.min_bpm >= self.max_bpm {
            return Err(AtmoError::InvalidConfig(format!(
                "beat.min_bpm ({}) must be positive and below max_bpm ({})",
                self.min_bpm, self.max_bpm
            )));
        }
        if self.min_beats_for_tempo < 2 {
            return Err(AtmoError::InvalidConfig(
                "beat.min_beats_for_tempo must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Thresholds of the atmosphere rules and the size of the voting window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtmosphereConfig {
    pub history_capacity: usize,
    pub quiet_rms: f32,
    pub energetic_bass: f32,
    pub energetic_energy: f32,
    pub bright_treble: f32,
    pub bright_centroid: f32,
}

impl Default for AtmosphereConfig {
    fn default() -> Self {
        Self {
            history_capacity: 22,
            quiet_rms: 0.045,
            energetic_bass: 0.25,
            energetic_energy: 0.34,
            bright_treble: 0.2,
            bright_centroid: 0.53,
        }
    }
}

impl AtmosphereConfig {
    fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(AtmoError::InvalidConfig(
                "atmosphere.history_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Crossfade and automatic mode selection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    pub duration_seconds: f32,
    pub automatic: bool,
    pub cooldown_ms: u64,
    pub initial_mode: VisualMode,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            duration_seconds: TransitionSpeed::Normal.seconds(),
            automatic: true,
            cooldown_ms: 2_800,
            initial_mode: VisualMode::Orbit,
        }
    }
}

impl TransitionConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    fn validate(&self) -> Result<()> {
        if !self.duration_seconds.is_finite() || self.duration_seconds <= 0.0 {
            return Err(AtmoError::InvalidConfig(format!(
                "transition.duration_seconds must be positive, got {}",
                self.duration_seconds
            )));
        }
        Ok(())
    }
}

/// Frame pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Upper bound on the time step fed to the transition after a stall.
    pub max_delta_ms: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { max_delta_ms: 80 }
    }
}

impl FrameConfig {
    pub fn max_delta(&self) -> Duration {
        Duration::from_millis(self.max_delta_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.max_delta_ms == 0 {
            return Err(AtmoError::InvalidConfig(
                "frame.max_delta_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Capture source behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Delay after attaching before the one-off signal check runs.
    pub signal_check_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            signal_check_delay_ms: 500,
        }
    }
}

impl SourceConfig {
    pub fn signal_check_delay(&self) -> Duration {
        Duration::from_millis(self.signal_check_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::live_defaults();
        config.validate().unwrap();
        assert_eq!(config.analysis.bin_count(), 1024);
        assert_eq!(config.beat.refractory(), Duration::from_millis(220));
        assert_eq!(config.transition.cooldown(), Duration::from_millis(2_800));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = AppConfig::from_json_str(
            r#"{ "analysis": { "smoothing": 0.5 }, "transition": { "automatic": false } }"#,
        )
        .unwrap();
        assert_eq!(config.analysis.smoothing, 0.5);
        assert_eq!(config.analysis.energy_smoothing, 0.15);
        assert!(!config.transition.automatic);
        assert_eq!(config.atmosphere.history_capacity, 22);
    }

    #[test]
    fn round_trips_through_json() {
        let config = AppConfig::default();
        let json = config.to_json_pretty().unwrap();
        assert_eq!(AppConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cases = [
            r#"{ "analysis": { "smoothing": 0.0 } }"#,
            r#"{ "analysis": { "fft_size": 0 } }"#,
            r#"{ "analysis": { "min_decibels": -10, "max_decibels": -90 } }"#,
            r#"{ "beat": { "min_bpm": 300 } }"#,
            r#"{ "atmosphere": { "history_capacity": 0 } }"#,
            r#"{ "transition": { "duration_seconds": -1 } }"#,
            r#"{ "frame": { "max_delta_ms": 0 } }"#,
        ];
        for json in cases {
            let err = AppConfig::from_json_str(json).unwrap_err();
            assert!(matches!(err, AtmoError::InvalidConfig(_)), "{json}: {err}");
        }
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = AppConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, AtmoError::Json(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AppConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, AtmoError::Io(_)));
    }
}
