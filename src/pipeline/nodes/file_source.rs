//! Replays recorded stream files.

use crate::config::Options;
use crate::pipeline::component::{
    ConnectContext, Pacing, ProcessContext, Provider, ProviderStatus, Sensor,
};
use crate::pipeline::error::ComponentError;
use crate::pipeline::stream::{Stream, StreamDescriptor};
use crate::session::StreamFileReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PATH: &str = "path";
const PACED: &str = "paced";

fn open(path: &Path) -> Result<StreamFileReader, ComponentError> {
    if !path.exists() {
        return Err(ComponentError::NotFound(path.display().to_string()));
    }
    StreamFileReader::open(path).map_err(|e| ComponentError::Failed(e.to_string()))
}

/// Sensor standing in for a device when replaying a recording. Connecting
/// checks that every listed file is a readable stream file.
pub struct FileSensor {
    name: String,
    paths: Vec<PathBuf>,
}

impl FileSensor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            paths: Vec::new(),
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }
}

impl Sensor for FileSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self, _ctx: &mut ConnectContext) -> Result<(), ComponentError> {
        for path in &self.paths {
            let reader = open(path)?;
            debug!(
                "'{}' found {} samples in {}",
                self.name,
                reader.header().num_samples,
                path.display()
            );
        }
        Ok(())
    }
}

/// Provider producing the samples of one stream file, then running dry
pub struct FileSource {
    name: String,
    options: Options,
    reader: Option<StreamFileReader>,
}

impl FileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut options = Options::new()
            .text(PATH, "", "Stream file to replay")
            .bool(PACED, false, "Replay at the recorded rate instead of on demand");
        options.preset(PATH, path.to_string_lossy().into_owned());
        Self {
            name: name.into(),
            options,
            reader: None,
        }
    }

    /// Replay at the recorded sample rate
    pub fn paced(mut self) -> Self {
        self.options.preset(PACED, true);
        self
    }

    fn path(&self) -> Result<PathBuf, ComponentError> {
        Ok(PathBuf::from(self.options.get_text(PATH)?))
    }
}

impl Provider for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> Result<StreamDescriptor, ComponentError> {
        let reader = open(&self.path()?)?;
        Ok(reader.header().descriptor())
    }

    fn enter(&mut self, output: &StreamDescriptor) -> Result<(), ComponentError> {
        let reader = open(&self.path()?)?;
        if reader.header().descriptor() != *output {
            return Err(ComponentError::failed("file changed since the pipeline was built"));
        }
        self.reader = Some(reader);
        Ok(())
    }

    fn process(
        &mut self,
        output: &mut Stream,
        _ctx: &ProcessContext,
    ) -> Result<ProviderStatus, ComponentError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| ComponentError::failed("process called before enter"))?;
        let filled = reader
            .read_into(output)
            .map_err(|e| ComponentError::Failed(e.to_string()))?;
        if reader.remaining() == 0 {
            Ok(ProviderStatus::Exhausted { filled })
        } else {
            Ok(ProviderStatus::Ready)
        }
    }

    fn exit(&mut self) -> Result<(), ComponentError> {
        if let Some(reader) = self.reader.take() {
            if reader.remaining() > 0 {
                warn!(
                    "'{}' stopped with {} samples left",
                    self.name,
                    reader.remaining()
                );
            }
        }
        Ok(())
    }

    fn pacing(&self) -> Pacing {
        match self.options.get_bool(PACED) {
            Ok(true) => Pacing::Realtime,
            _ => Pacing::Unpaced,
        }
    }

    fn options(&self) -> Option<&Options> {
        Some(&self.options)
    }

    fn options_mut(&mut self) -> Option<&mut Options> {
        Some(&mut self.options)
    }
}
