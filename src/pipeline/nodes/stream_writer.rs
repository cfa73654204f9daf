//! Records its first input to a stream file.

use crate::config::Options;
use crate::pipeline::component::{Consumer, ProcessContext};
use crate::pipeline::error::ComponentError;
use crate::pipeline::stream::{Stream, StreamDescriptor};
use crate::session::StreamFileWriter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

const PATH: &str = "path";

/// Consumer appending every new sample of its first input to a file.
///
/// With overlapping frames only the samples each activation steps past are
/// written, so the file holds the input exactly once.
pub struct StreamWriter {
    name: String,
    options: Options,
    writer: Option<StreamFileWriter>,
}

impl StreamWriter {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut options = Options::new().text(PATH, "", "Output file");
        options.preset(PATH, path.to_string_lossy().into_owned());
        Self {
            name: name.into(),
            options,
            writer: None,
        }
    }

    /// Samples written so far in the current run
    pub fn samples_written(&self) -> u64 {
        self.writer.as_ref().map_or(0, StreamFileWriter::samples_written)
    }

    fn path(&self) -> Result<PathBuf, ComponentError> {
        let path = self.options.get_text(PATH)?;
        if path.is_empty() {
            return Err(ComponentError::failed("no output path set"));
        }
        Ok(PathBuf::from(path))
    }
}

impl Consumer for StreamWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn enter(&mut self, inputs: &[Arc<StreamDescriptor>]) -> Result<(), ComponentError> {
        let input = inputs
            .first()
            .ok_or_else(|| ComponentError::failed("needs one input"))?;
        let path = self.path()?;
        let writer = StreamFileWriter::create(&path, input, 0.0)
            .map_err(|e| ComponentError::Failed(e.to_string()))?;
        debug!("'{}' recording to {}", self.name, path.display());
        self.writer = Some(writer);
        Ok(())
    }

    fn process(&mut self, inputs: &[Stream], ctx: &ProcessContext) -> Result<(), ComponentError> {
        let (Some(input), Some(writer)) = (inputs.first(), self.writer.as_mut()) else {
            return Ok(());
        };
        let fresh = ctx.steps.first().copied().unwrap_or(input.num());
        let result = if fresh >= input.num() {
            writer.write(input)
        } else {
            let mut head = input.clone();
            head.resize(fresh);
            writer.write(&head)
        };
        result.map_err(|e| ComponentError::Failed(e.to_string()))
    }

    fn exit(&mut self) -> Result<(), ComponentError> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let path = writer.path().to_path_buf();
        let header = writer
            .finish()
            .map_err(|e| ComponentError::Failed(e.to_string()))?;
        info!(
            "'{}' wrote {} samples to {}",
            self.name,
            header.num_samples,
            path.display()
        );
        Ok(())
    }

    fn options(&self) -> Option<&Options> {
        Some(&self.options)
    }

    fn options_mut(&mut self) -> Option<&mut Options> {
        Some(&mut self.options)
    }
}
