//! Magnitude spectra of fixed-length frames.
//!
//! A [`SpectrumAnalyzer`] is built for one frame length and reuses its FFT
//! plan, window coefficients and scratch buffer for every frame, so the
//! spectrum transformer does not allocate per activation.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Window applied to a frame before the transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowFunction {
    /// No windowing
    Rectangular,
    #[default]
    Hann,
    Hamming,
    /// Very low side lobes
    Blackman,
}

impl WindowFunction {
    /// Names accepted by [`FromStr`], usable as option choices
    pub const NAMES: &'static [&'static str] = &["rectangular", "hann", "hamming", "blackman"];

    pub fn name(&self) -> &'static str {
        match self {
            WindowFunction::Rectangular => "rectangular",
            WindowFunction::Hann => "hann",
            WindowFunction::Hamming => "hamming",
            WindowFunction::Blackman => "blackman",
        }
    }

    pub fn all() -> &'static [WindowFunction] {
        &[
            WindowFunction::Rectangular,
            WindowFunction::Hann,
            WindowFunction::Hamming,
            WindowFunction::Blackman,
        ]
    }

    /// Coefficient `i` of an `n`-point window
    pub fn coefficient(&self, i: usize, n: usize) -> f64 {
        let phase = 2.0 * PI * i as f64 / n as f64;
        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hann => 0.5 * (1.0 - phase.cos()),
            WindowFunction::Hamming => 0.54 - 0.46 * phase.cos(),
            // 0.42 and 0.08 are not exact in binary, clamp the endpoints
            WindowFunction::Blackman => {
                (0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()).max(0.0)
            }
        }
    }

    pub fn generate(&self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.coefficient(i, n)).collect()
    }
}

impl fmt::Display for WindowFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WindowFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WindowFunction::all()
            .iter()
            .copied()
            .find(|w| w.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown window function '{}'", s))
    }
}

/// One-sided magnitude spectrum over a fixed frame length
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f64>>,
    fft_size: usize,
    coefficients: Vec<f64>,
    remove_dc: bool,
    scratch: Vec<Complex<f64>>,
}

impl SpectrumAnalyzer {
    /// Analyzer for frames of `frame_len` samples, zero-padded to the next
    /// power of two
    pub fn new(frame_len: usize, window: WindowFunction, remove_dc: bool) -> Self {
        let frame_len = frame_len.max(1);
        let fft_size = frame_len.next_power_of_two();
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        Self {
            fft,
            fft_size,
            coefficients: window.generate(frame_len),
            remove_dc,
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of output bins, DC to Nyquist
    pub fn bins(&self) -> usize {
        Self::bins_for(self.fft_size)
    }

    /// Bin count for a frame of `frame_len` samples
    pub fn bins_for(frame_len: usize) -> usize {
        frame_len.max(1).next_power_of_two() / 2 + 1
    }

    /// Centre frequency of `bin` at `sample_rate`
    pub fn bin_frequency(&self, bin: usize, sample_rate: f64) -> f64 {
        bin as f64 * sample_rate / self.fft_size as f64
    }

    /// Transform `frame` and write [`bins`](Self::bins) magnitudes into `out`.
    /// Samples past the configured frame length are ignored.
    pub fn magnitudes_into(&mut self, frame: &[f64], out: &mut [f64]) {
        let n = frame.len().min(self.coefficients.len());
        let mean = if self.remove_dc && n > 0 {
            frame[..n].iter().sum::<f64>() / n as f64
        } else {
            0.0
        };

        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let value = if i < n {
                (frame[i] - mean) * self.coefficients[i]
            } else {
                0.0
            };
            *slot = Complex::new(value, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let scale = 2.0 / self.fft_size as f64;
        for (slot, c) in out.iter_mut().zip(&self.scratch[..self.bins()]) {
            *slot = c.norm() * scale;
        }
    }

    pub fn magnitudes(&mut self, frame: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.bins()];
        self.magnitudes_into(frame, &mut out);
        out
    }
}

/// Index of the largest magnitude
pub fn peak_bin(magnitudes: &[f64]) -> Option<usize> {
    magnitudes
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, rate: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / rate).sin())
            .collect()
    }

    #[test]
    fn test_window_coefficients_in_range() {
        for window in WindowFunction::all() {
            for c in window.generate(64) {
                assert!((0.0..=1.0 + 1e-12).contains(&c), "{} produced {}", window, c);
            }
        }
    }

    #[test]
    fn test_window_from_str() {
        assert_eq!("Hann".parse::<WindowFunction>(), Ok(WindowFunction::Hann));
        assert!("kaiser".parse::<WindowFunction>().is_err());
        for name in WindowFunction::NAMES {
            assert!(name.parse::<WindowFunction>().is_ok());
        }
    }

    #[test]
    fn test_sine_peak() {
        let rate = 256.0;
        let mut analyzer = SpectrumAnalyzer::new(256, WindowFunction::Hann, true);
        let spectrum = analyzer.magnitudes(&sine(32.0, rate, 256));
        assert_eq!(spectrum.len(), 129);
        let peak = peak_bin(&spectrum).unwrap();
        assert_eq!(analyzer.bin_frequency(peak, rate), 32.0);
    }

    #[test]
    fn test_dc_removed() {
        let mut analyzer = SpectrumAnalyzer::new(100, WindowFunction::Rectangular, true);
        let spectrum = analyzer.magnitudes(&[5.0; 100]);
        assert!(spectrum[0] < 1e-9);
    }

    #[test]
    fn test_zero_padding() {
        let analyzer = SpectrumAnalyzer::new(100, WindowFunction::Hann, false);
        assert_eq!(analyzer.fft_size(), 128);
        assert_eq!(analyzer.bins(), 65);
        assert_eq!(SpectrumAnalyzer::bins_for(100), 65);
    }
}
