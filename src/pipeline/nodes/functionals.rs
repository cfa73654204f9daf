//! Per-frame statistics over every input dimension.

use crate::config::Options;
use crate::pipeline::component::{OutputContext, OutputSpec, ProcessContext, Transformer};
use crate::pipeline::error::ComponentError;
use crate::pipeline::stream::{Stream, StreamDescriptor};
use crate::types::SampleType;
use std::str::FromStr;
use std::sync::Arc;

const FUNCTIONALS: &str = "functionals";

/// A statistic computed over one frame of one dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Functional {
    Mean,
    /// Mean of squares
    Energy,
    Min,
    Max,
    /// Population standard deviation
    Std,
    Range,
}

impl Functional {
    pub fn name(&self) -> &'static str {
        match self {
            Functional::Mean => "mean",
            Functional::Energy => "energy",
            Functional::Min => "min",
            Functional::Max => "max",
            Functional::Std => "std",
            Functional::Range => "range",
        }
    }

    pub fn compute(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let n = values.len() as f64;
        let min = || values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = || values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        match self {
            Functional::Mean => values.iter().sum::<f64>() / n,
            Functional::Energy => values.iter().map(|v| v * v).sum::<f64>() / n,
            Functional::Min => min(),
            Functional::Max => max(),
            Functional::Std => {
                let mean = values.iter().sum::<f64>() / n;
                (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
            }
            Functional::Range => max() - min(),
        }
    }
}

impl FromStr for Functional {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Functional::Mean),
            "energy" => Ok(Functional::Energy),
            "min" => Ok(Functional::Min),
            "max" => Ok(Functional::Max),
            "std" => Ok(Functional::Std),
            "range" => Ok(Functional::Range),
            other => Err(format!("unknown functional '{}'", other)),
        }
    }
}

/// Parse a comma-separated list such as `"mean, std"`
fn parse_list(raw: &str) -> Result<Vec<Functional>, ComponentError> {
    let list = raw
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(str::parse)
        .collect::<Result<Vec<Functional>, String>>()
        .map_err(ComponentError::Failed)?;
    if list.is_empty() {
        return Err(ComponentError::failed("no functionals selected"));
    }
    Ok(list)
}

/// Emits one sample per frame holding each selected functional of each
/// input dimension, inputs in connection order.
pub struct Functionals {
    name: String,
    options: Options,
    selected: Vec<Functional>,
    column: Vec<f64>,
}

impl Functionals {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Options::new().text(
                FUNCTIONALS,
                "mean,std",
                "Comma-separated list of mean, energy, min, max, std, range",
            ),
            selected: Vec::new(),
            column: Vec::new(),
        }
    }

    pub fn with_functionals(mut self, list: &[Functional]) -> Self {
        let joined: Vec<&str> = list.iter().map(Functional::name).collect();
        self.options.preset(FUNCTIONALS, joined.join(","));
        self
    }

    fn selection(&self) -> Result<Vec<Functional>, ComponentError> {
        parse_list(self.options.get_text(FUNCTIONALS)?)
    }
}

impl Transformer for Functionals {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_spec(&self, ctx: &OutputContext) -> Result<OutputSpec, ComponentError> {
        let selected = self.selection()?;
        let labels = ctx
            .inputs
            .iter()
            .flat_map(|d| (0..d.dim).map(move |i| d.label(i)))
            .flat_map(|label| {
                selected
                    .iter()
                    .map(move |f| format!("{}_{}", label, f.name()))
            })
            .collect::<Vec<_>>();
        Ok(OutputSpec::new(labels.len(), SampleType::Double, 1).with_labels(labels))
    }

    fn enter(
        &mut self,
        _inputs: &[Arc<StreamDescriptor>],
        _output: &StreamDescriptor,
    ) -> Result<(), ComponentError> {
        self.selected = self.selection()?;
        Ok(())
    }

    fn process(
        &mut self,
        inputs: &[Stream],
        output: &mut Stream,
        _ctx: &ProcessContext,
    ) -> Result<(), ComponentError> {
        let out = output.values_mut::<f64>()?;
        let mut k = 0;
        for input in inputs {
            for d in 0..input.dim() {
                self.column.clear();
                self.column
                    .extend((0..input.num()).filter_map(|i| input.get_f64(i, d)));
                for f in &self.selected {
                    if let Some(slot) = out.get_mut(k) {
                        *slot = f.compute(&self.column);
                    }
                    k += 1;
                }
            }
        }
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
    use crate::types::SampleData;

    #[test]
    fn test_compute() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(Functional::Mean.compute(&values), 2.5);
        assert_eq!(Functional::Energy.compute(&values), 7.5);
        assert_eq!(Functional::Range.compute(&values), 3.0);
        assert!((Functional::Std.compute(&values) - 1.118_033_988_7).abs() < 1e-9);
        assert_eq!(Functional::Max.compute(&[]), 0.0);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list(" Mean , max").unwrap(),
            vec![Functional::Mean, Functional::Max]
        );
        assert!(parse_list("mean,median").is_err());
        assert!(parse_list(" , ").is_err());
    }

    #[test]
    fn test_output_spec_and_process() {
        let mut stage =
            Functionals::new("f").with_functionals(&[Functional::Min, Functional::Max]);
        let input = Arc::new(
            StreamDescriptor::new(10.0, 2, SampleType::Float).with_labels(["x", "y"]),
        );
        let spec = stage
            .output_spec(&OutputContext {
                inputs: &[input.clone()],
                frame: FrameSpec::new(0.3),
            })
            .unwrap();
        assert_eq!(spec.dim, 4);
        assert_eq!(spec.labels, vec!["x_min", "x_max", "y_min", "y_max"]);

        let out_desc = StreamDescriptor::new(1.0 / 0.3, 4, SampleType::Double);
        stage.enter(&[input.clone()], &out_desc).unwrap();
        let window = Stream::from_data(
            input,
            0.0,
            SampleData::Float(vec![1.0, -1.0, 3.0, -5.0, 2.0, 0.0]),
        )
        .unwrap();
        let mut output = Stream::new(Arc::new(out_desc), 1);
        let ctx = ProcessContext::new("f", 0, 0.0, &[3], None);
        stage.process(&[window], &mut output, &ctx).unwrap();
        assert_eq!(output.values::<f64>().unwrap(), &[1.0, 3.0, -5.0, 0.0]);
    }
}
