//! Signal analysis used by the built-in transformers.

pub mod fft;

pub use fft::{peak_bin, SpectrumAnalyzer, WindowFunction};
