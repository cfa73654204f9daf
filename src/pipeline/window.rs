//! Frame resolution for multi-rate inputs.
//!
//! A stage declares its frame and step in seconds. Each input converts those
//! durations to sample counts with its own rate. Rounding is applied to the
//! absolute boundary `k * step * rate` of every activation rather than to the
//! per-activation count, so fractional samples carry over and the total never
//! drifts by more than half a sample.

use serde::{Deserialize, Serialize};

/// Frame size and step of a stage, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSpec {
    pub size: f64,
    /// Defaults to `size` (adjacent, non-overlapping frames)
    pub step: Option<f64>,
}

impl FrameSpec {
    pub fn new(size: f64) -> Self {
        Self { size, step: None }
    }

    /// Overlapping (`step < size`) or skipping (`step > size`) frames
    pub fn with_step(size: f64, step: f64) -> Self {
        Self {
            size,
            step: Some(step),
        }
    }

    #[inline]
    pub fn step_secs(&self) -> f64 {
        self.step.unwrap_or(self.size)
    }
}

/// Sample counts for one activation of one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub activation: u64,
    /// Samples to read from the cursor
    pub frame: usize,
    /// Samples to advance the cursor by afterwards
    pub step: usize,
}

/// Turns a [`FrameSpec`] into drift-free per-activation counts for one rate.
#[derive(Debug, Clone)]
pub struct WindowResolver {
    rate: f64,
    frame_samples: f64,
    step_samples: f64,
    activation: u64,
}

impl WindowResolver {
    /// Fails when the frame or step covers less than one sample at `rate`.
    pub fn new(frame: &FrameSpec, rate: f64) -> Result<Self, String> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(format!("invalid sample rate {rate}"));
        }
        let frame_samples = frame.size * rate;
        let step_samples = frame.step_secs() * rate;
        if !frame_samples.is_finite() || frame_samples < 1.0 {
            return Err(format!(
                "frame of {}s is less than one sample at {rate} Hz",
                frame.size
            ));
        }
        if !step_samples.is_finite() || step_samples < 1.0 {
            return Err(format!(
                "step of {}s is less than one sample at {rate} Hz",
                frame.step_secs()
            ));
        }
        Ok(Self {
            rate,
            frame_samples,
            step_samples,
            activation: 0,
        })
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    #[inline]
    pub fn activation(&self) -> u64 {
        self.activation
    }

    /// Absolute sample index where activation `k` starts
    pub fn boundary(&self, k: u64) -> u64 {
        (k as f64 * self.step_samples).round() as u64
    }

    /// Frame length of activation `k`
    pub fn frame_count(&self, k: u64) -> usize {
        let start = k as f64 * self.step_samples;
        ((start + self.frame_samples).round() - start.round()) as usize
    }

    /// Cursor advance after activation `k`
    pub fn step_count(&self, k: u64) -> usize {
        (self.boundary(k + 1) - self.boundary(k)) as usize
    }

    /// Largest frame this resolver will ever request
    pub fn max_frame(&self) -> usize {
        self.frame_samples.ceil() as usize
    }

    /// Largest step this resolver will ever produce
    pub fn max_step(&self) -> usize {
        self.step_samples.ceil() as usize
    }

    /// Counts for the current activation, without moving on
    pub fn peek(&self) -> Window {
        Window {
            activation: self.activation,
            frame: self.frame_count(self.activation),
            step: self.step_count(self.activation),
        }
    }

    /// Move to the next activation
    pub fn commit(&mut self) {
        self.activation += 1;
    }

    pub fn next_window(&mut self) -> Window {
        let window = self.peek();
        self.commit();
        window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_step_defaults_to_size() {
        assert_eq!(FrameSpec::new(0.5).step_secs(), 0.5);
        assert_eq!(FrameSpec::with_step(0.5, 0.25).step_secs(), 0.25);
    }

    #[test]
    fn test_integral_rate() {
        let mut r = WindowResolver::new(&FrameSpec::new(0.1), 50.0).unwrap();
        for k in 0..10 {
            let w = r.next_window();
            assert_eq!(w.activation, k);
            assert_eq!(w.frame, 5);
            assert_eq!(w.step, 5);
        }
    }

    #[test]
    fn test_fractional_rate_carries_remainder() {
        // 0.1 s at 33 Hz is 3.3 samples per frame
        let mut r = WindowResolver::new(&FrameSpec::new(0.1), 33.0).unwrap();
        let steps: Vec<usize> = (0..10).map(|_| r.next_window().step).collect();
        assert_eq!(steps.iter().sum::<usize>(), 33);
        assert!(steps.iter().all(|&s| s == 3 || s == 4));
    }

    #[test]
    fn test_overlap_and_skip() {
        let overlap = WindowResolver::new(&FrameSpec::with_step(1.0, 0.5), 10.0).unwrap();
        assert_eq!(overlap.peek().frame, 10);
        assert_eq!(overlap.peek().step, 5);

        let skip = WindowResolver::new(&FrameSpec::with_step(0.5, 1.0), 10.0).unwrap();
        assert_eq!(skip.peek().frame, 5);
        assert_eq!(skip.peek().step, 10);
    }

    #[test]
    fn test_sub_sample_frame_rejected() {
        assert!(WindowResolver::new(&FrameSpec::new(0.01), 50.0).is_err());
        assert!(WindowResolver::new(&FrameSpec::with_step(1.0, 0.001), 50.0).is_err());
        assert!(WindowResolver::new(&FrameSpec::new(1.0), 0.0).is_err());
    }

    #[test]
    fn test_peek_does_not_advance() {
        let mut r = WindowResolver::new(&FrameSpec::new(1.0), 40.0).unwrap();
        assert_eq!(r.peek(), r.peek());
        r.commit();
        assert_eq!(r.activation(), 1);
        assert_eq!(r.peek().activation, 1);
    }

    proptest! {
        #[test]
        fn prop_total_within_half_sample(
            rate in 1.0f64..2000.0,
            size in 0.001f64..2.0,
            step_ratio in 0.25f64..2.0,
            n in 1u64..500,
        ) {
            let step = size * step_ratio;
            prop_assume!(size * rate >= 1.0 && step * rate >= 1.0);
            let mut r = WindowResolver::new(&FrameSpec::with_step(size, step), rate).unwrap();
            let mut total = 0u64;
            let floor = (size * rate).floor() as usize;
            let ceil = (size * rate).ceil() as usize;
            for _ in 0..n {
                let w = r.next_window();
                prop_assert!(w.frame == floor || w.frame == ceil, "frame {} not in [{}, {}]", w.frame, floor, ceil);
                total += w.step as u64;
            }
            let ideal = n as f64 * step * rate;
            prop_assert!((total as f64 - ideal).abs() <= 0.5 + 1e-6);
        }
    }
}
