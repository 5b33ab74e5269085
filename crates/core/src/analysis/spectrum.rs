use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{config::AnalysisConfig, AtmoError, Result, SampleFrame};

/// Converts blocks of mono PCM into the byte frames the pipeline consumes.
///
/// Frequency bytes map `[min_decibels, max_decibels]` linearly onto
/// `0..=255` after a Blackman window; time-domain bytes centre silence on
/// 128. No smoothing is applied between blocks.
pub struct ByteSpectrumAnalyser {
    fft_size: usize,
    min_decibels: f32,
    max_decibels: f32,
    window: Vec<f32>,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl ByteSpectrumAnalyser {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let fft_size = config.fft_size;
        if fft_size < 2 {
            return Err(AtmoError::InvalidInput(
                "spectrum analysis requires at least two samples",
            ));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(fft_size);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();

        Ok(Self {
            fft_size,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            window: (0..fft_size)
                .map(|index| blackman_value(index, fft_size))
                .collect(),
            plan,
            input,
            spectrum,
            scratch,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Fills both arrays of `frame` from exactly `fft_size` samples.
    pub fn process(&mut self, samples: &[f32], frame: &mut SampleFrame) -> Result<()> {
        if samples.len() != self.fft_size {
            return Err(AtmoError::InvalidInput(
                "sample block does not match the analysis window",
            ));
        }

        frame.time_domain.clear();
        frame
            .time_domain
            .extend(samples.iter().map(|sample| time_domain_byte(*sample)));

        for ((slot, sample), weight) in self.input.iter_mut().zip(samples).zip(&self.window) {
            *slot = sample * weight;
        }
        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)?;

        let scale = 1.0 / self.fft_size as f32;
        let range = self.max_decibels - self.min_decibels;
        let min_decibels = self.min_decibels;
        frame.frequency.clear();
        frame.frequency.extend(
            self.spectrum
                .iter()
                .take(self.fft_size / 2)
                .map(|bin| decibel_byte(bin.norm() * scale, min_decibels, range)),
        );
        Ok(())
    }
}

impl fmt::Debug for ByteSpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSpectrumAnalyser")
            .field("fft_size", &self.fft_size)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    let phase = 2.0 * PI * index as f32 / len as f32;
    0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
}

fn decibel_byte(magnitude: f32, min_decibels: f32, range: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let decibels = 20.0 * magnitude.log10();
    let scaled = 255.0 * (decibels - min_decibels) / range;
    scaled.clamp(0.0, 255.0) as u8
}

fn time_domain_byte(sample: f32) -> u8 {
    (128.0 * (sample + 1.0)).clamp(0.0, 255.0) as u8
}
