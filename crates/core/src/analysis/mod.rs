//! Per-tick feature extraction from a byte-resolution spectrum.
//!
//! The extractor keeps no state of its own: everything it smooths lives in
//! [`AudioFeatureState`], which the pipeline owns and hands in by reference
//! every tick.

pub mod beat;
pub mod spectrum;

use serde::{Deserialize, Serialize};

use crate::{config::AnalysisConfig, SampleFrame};

/// Upper edge of the bass band as a fraction of the bin count.
pub const BASS_FRACTION: f32 = 0.08;
/// Upper edge of the mid band as a fraction of the bin count.
pub const MID_FRACTION: f32 = 0.32;

/// Per-tick multipliers applied while no source is attached.
pub const RMS_DECAY: f32 = 0.96;
pub const BAND_DECAY: f32 = 0.95;
pub const CENTROID_DECAY: f32 = 0.95;
pub const ENERGY_DECAY: f32 = 0.94;
pub const PULSE_DECAY: f32 = 0.93;
pub const BPM_DECAY: f32 = 0.97;

const ENERGY_RMS_WEIGHT: f32 = 1.5;
const ENERGY_BASS_WEIGHT: f32 = 0.65;
const ENERGY_TREBLE_WEIGHT: f32 = 0.25;

/// Smoothed audio features shared by the beat tracker, the classifier and
/// the renderer. Updated in place once per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatureState {
    /// Whether a live source fed this tick.
    pub enabled: bool,
    pub rms: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    /// Normalised [0, 1] spectral centroid; 1.0 is the top bin.
    pub centroid: f32,
    /// Composite loudness score driving the renderer.
    pub energy: f32,
    /// 1.0 on a beat, decays geometrically otherwise.
    pub beat_pulse: f32,
    /// Smoothed tempo estimate; 0.0 until enough beats were seen.
    pub bpm: f32,
    /// Bass of the previous tick, used for spike detection only.
    pub prev_bass: f32,
}

impl AudioFeatureState {
    /// Tempo estimate, or `None` while no estimate exists.
    pub fn tempo(&self) -> Option<f32> {
        (self.bpm > 0.0).then_some(self.bpm)
    }
}

/// Unsmoothed measurements of a single frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawFeatures {
    pub rms: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub centroid: f32,
}

/// Inclusive upper bin indices of the bass and mid bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandLayout {
    pub bin_count: usize,
    pub bass_end: usize,
    pub mid_end: usize,
}

impl BandLayout {
    pub fn new(bin_count: usize) -> Self {
        Self {
            bin_count,
            bass_end: (bin_count as f32 * BASS_FRACTION).floor() as usize,
            mid_end: (bin_count as f32 * MID_FRACTION).floor() as usize,
        }
    }

    fn bass_bins(&self) -> f32 {
        (self.bass_end + 1).max(1) as f32
    }

    fn mid_bins(&self) -> f32 {
        self.mid_end.saturating_sub(self.bass_end).max(1) as f32
    }

    fn treble_bins(&self) -> f32 {
        self.bin_count
            .saturating_sub(self.mid_end + 1)
            .max(1) as f32
    }
}

fn blend(previous: f32, raw: f32, alpha: f32) -> f32 {
    previous * (1.0 - alpha) + raw * alpha
}

/// Turns frequency frames into smoothed loudness, band and centroid values.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    layout: BandLayout,
    smoothing: f32,
    energy_smoothing: f32,
}

impl FeatureExtractor {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            layout: BandLayout::new(config.bin_count()),
            smoothing: config.smoothing,
            energy_smoothing: config.energy_smoothing,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.layout.bin_count
    }

    pub fn layout(&self) -> BandLayout {
        self.layout
    }

    /// Raw measurements of one frequency frame, each in [0, 1].
    pub fn measure(&self, frequency: &[u8]) -> RawFeatures {
        debug_assert_eq!(
            frequency.len(),
            self.layout.bin_count,
            "frequency frame does not match the configured window"
        );

        let mut sum_squares = 0.0;
        let mut weighted = 0.0;
        let mut total = 0.0;
        let mut bass = 0.0;
        let mut mid = 0.0;
        let mut treble = 0.0;

        for (index, byte) in frequency.iter().enumerate() {
            let value = f32::from(*byte) / 255.0;
            sum_squares += value * value;
            weighted += value * index as f32;
            total += value;
            if index <= self.layout.bass_end {
                bass += value;
            } else if index <= self.layout.mid_end {
                mid += value;
            } else {
                treble += value;
            }
        }

        let len = frequency.len().max(1) as f32;
        RawFeatures {
            rms: (sum_squares / len).sqrt(),
            bass: bass / self.layout.bass_bins(),
            mid: mid / self.layout.mid_bins(),
            treble: treble / self.layout.treble_bins(),
            centroid: if total > 0.0 {
                weighted / total / len
            } else {
                0.0
            },
        }
    }

    /// Blends one live frame into `state`. Beat fields are left to the
    /// [`beat::BeatTracker`].
    pub fn process(&self, state: &mut AudioFeatureState, frame: &SampleFrame) -> RawFeatures {
        let raw = self.measure(&frame.frequency);
        let alpha = self.smoothing;

        state.enabled = true;
        state.rms = blend(state.rms, raw.rms, alpha);
        state.bass = blend(state.bass, raw.bass, alpha);
        state.mid = blend(state.mid, raw.mid, alpha);
        state.treble = blend(state.treble, raw.treble, alpha);
        state.centroid = blend(state.centroid, raw.centroid, alpha);

        let energy_raw = (state.rms * ENERGY_RMS_WEIGHT
            + state.bass * ENERGY_BASS_WEIGHT
            + state.treble * ENERGY_TREBLE_WEIGHT)
            .clamp(0.0, 1.0);
        state.energy = blend(state.energy, energy_raw, self.energy_smoothing);

        raw
    }

    /// Fades every field toward zero while no source is attached.
    pub fn decay(&self, state: &mut AudioFeatureState) {
        state.enabled = false;
        state.rms *= RMS_DECAY;
        state.bass *= BAND_DECAY;
        state.mid *= BAND_DECAY;
        state.treble *= BAND_DECAY;
        state.prev_bass *= BAND_DECAY;
        state.centroid *= CENTROID_DECAY;
        state.energy *= ENERGY_DECAY;
        state.beat_pulse *= PULSE_DECAY;
        state.bpm *= BPM_DECAY;
    }
}
