//! FFT magnitude spectrum of one input dimension per frame.

use crate::analysis::{SpectrumAnalyzer, WindowFunction};
use crate::config::Options;
use crate::pipeline::component::{OutputContext, OutputSpec, ProcessContext, Transformer};
use crate::pipeline::error::ComponentError;
use crate::pipeline::stream::{Stream, StreamDescriptor};
use crate::types::SampleType;
use std::sync::Arc;

const WINDOW: &str = "window";
const DIMENSION: &str = "dimension";
const REMOVE_DC: &str = "removeDc";

/// Writes one sample per frame whose dimensions are the magnitudes of the
/// bins from DC to Nyquist. Reads a single input.
pub struct SpectrumTransformer {
    name: String,
    options: Options,
    window: WindowFunction,
    dimension: usize,
    analyzer: Option<SpectrumAnalyzer>,
    column: Vec<f64>,
}

impl SpectrumTransformer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Options::new()
                .choice(WINDOW, WindowFunction::NAMES, "hann", "Window applied before the FFT")
                .int(DIMENSION, 0, "Input dimension to analyze")
                .bool(REMOVE_DC, true, "Subtract the frame mean first"),
            window: WindowFunction::Hann,
            dimension: 0,
            analyzer: None,
            column: Vec::new(),
        }
    }

    pub fn with_window(mut self, window: WindowFunction) -> Self {
        self.options.preset(WINDOW, window.name());
        self
    }

    fn frame_len(frame_secs: f64, input: &StreamDescriptor) -> usize {
        ((frame_secs * input.sample_rate).round() as usize).max(1)
    }

    fn single_input<'a>(
        &self,
        inputs: &'a [Arc<StreamDescriptor>],
    ) -> Result<&'a StreamDescriptor, ComponentError> {
        match inputs {
            [input] => {
                let dimension = self.options.get_usize(DIMENSION)?;
                if dimension >= input.dim {
                    return Err(ComponentError::Failed(format!(
                        "dimension {} out of range for a {}-dimensional input",
                        dimension, input.dim
                    )));
                }
                Ok(input)
            }
            _ => Err(ComponentError::Failed(format!(
                "expects exactly one input, got {}",
                inputs.len()
            ))),
        }
    }
}

impl Transformer for SpectrumTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_spec(&self, ctx: &OutputContext) -> Result<OutputSpec, ComponentError> {
        let input = self.single_input(ctx.inputs)?;
        let frame_len = Self::frame_len(ctx.frame.size, input);
        let fft_size = frame_len.next_power_of_two();
        let bins = SpectrumAnalyzer::bins_for(frame_len);
        let labels = (0..bins)
            .map(|bin| format!("{:.2}Hz", bin as f64 * input.sample_rate / fft_size as f64))
            .collect();
        Ok(OutputSpec::new(bins, SampleType::Double, 1).with_labels(labels))
    }

    fn enter(
        &mut self,
        inputs: &[Arc<StreamDescriptor>],
        _output: &StreamDescriptor,
    ) -> Result<(), ComponentError> {
        self.single_input(inputs)?;
        self.window = self
            .options
            .get_text(WINDOW)?
            .parse::<WindowFunction>()
            .map_err(ComponentError::Failed)?;
        self.dimension = self.options.get_usize(DIMENSION)?;
        self.analyzer = None;
        Ok(())
    }

    fn process(
        &mut self,
        inputs: &[Stream],
        output: &mut Stream,
        _ctx: &ProcessContext,
    ) -> Result<(), ComponentError> {
        let input = inputs
            .first()
            .ok_or_else(|| ComponentError::failed("missing input window"))?;
        // The first window is exactly round(frame * rate) samples long
        if self.analyzer.is_none() {
            self.analyzer = Some(SpectrumAnalyzer::new(
                input.num(),
                self.window,
                self.options.get_bool(REMOVE_DC)?,
            ));
        }
        self.column.clear();
        self.column
            .extend((0..input.num()).filter_map(|i| input.get_f64(i, self.dimension)));
        if let Some(analyzer) = self.analyzer.as_mut() {
            analyzer.magnitudes_into(&self.column, output.values_mut::<f64>()?);
        }
        Ok(())
    }

    fn exit(&mut self) -> Result<(), ComponentError> {
        self.analyzer = None;
        Ok(())
    }

    fn options(&self) -> Option<&Options> {
        Some(&self.options)
    }

    fn options_mut(&mut self) -> Option<&mut Options> {
        Some(&mut self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::window::FrameSpec;
    use std::f64::consts::PI;

    #[test]
    fn test_spectrum_peak_bin() {
        let mut stage = SpectrumTransformer::new("fft");
        let input = Arc::new(StreamDescriptor::new(64.0, 1, SampleType::Double));
        let spec = stage
            .output_spec(&OutputContext {
                inputs: &[input.clone()],
                frame: FrameSpec::new(1.0),
            })
            .unwrap();
        assert_eq!(spec.dim, 33);
        assert_eq!(spec.labels[8], "8.00Hz");

        let output_desc = Arc::new(StreamDescriptor::new(1.0, spec.dim, SampleType::Double));
        stage.enter(&[input.clone()], &output_desc).unwrap();
        let mut window = Stream::new(input, 64);
        for (i, v) in window.values_mut::<f64>().unwrap().iter_mut().enumerate() {
            *v = (2.0 * PI * 8.0 * i as f64 / 64.0).sin();
        }
        let mut output = Stream::new(output_desc, 1);
        let ctx = ProcessContext::new("fft", 0, 0.0, &[64], None);
        stage.process(&[window], &mut output, &ctx).unwrap();
        let magnitudes = output.values::<f64>().unwrap();
        assert_eq!(crate::analysis::peak_bin(magnitudes), Some(8));
    }

    #[test]
    fn test_rejects_two_inputs() {
        let stage = SpectrumTransformer::new("fft");
        let input = Arc::new(StreamDescriptor::new(64.0, 1, SampleType::Double));
        let result = stage.output_spec(&OutputContext {
            inputs: &[input.clone(), input],
            frame: FrameSpec::new(1.0),
        });
        assert!(result.is_err());
    }
}
