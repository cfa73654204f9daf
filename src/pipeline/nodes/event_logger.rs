//! Logs received events and optionally appends them to a JSON-lines file.

use crate::config::Options;
use crate::pipeline::component::EventListener;
use crate::pipeline::error::ComponentError;
use crate::pipeline::event::{Event, EventContext, EventState};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

const PATH: &str = "path";

pub struct EventLogger {
    name: String,
    options: Options,
    file: Option<BufWriter<File>>,
    received: Arc<AtomicU64>,
}

impl EventLogger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Options::new().text(PATH, "", "JSON-lines file to append to, empty for none"),
            file: None,
            received: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        self.options.preset(PATH, path.to_string_lossy().into_owned());
        self
    }

    /// Shared count of received events, readable while the pipeline owns the logger
    pub fn received(&self) -> Arc<AtomicU64> {
        self.received.clone()
    }
}

impl EventListener for EventLogger {
    fn name(&self) -> &str {
        &self.name
    }

    fn enter(&mut self) -> Result<(), ComponentError> {
        let path = self.options.get_text(PATH)?;
        if !path.is_empty() {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            self.file = Some(BufWriter::new(file));
            debug!("'{}' appending events to {}", self.name, path);
        }
        Ok(())
    }

    fn notify(&mut self, event: &Event, ctx: &EventContext) -> Result<(), ComponentError> {
        self.received.fetch_add(1, Ordering::Relaxed);
        let state = match event.state {
            EventState::Continued => "continued",
            EventState::Completed => "completed",
        };
        info!(
            "[{}] {}@{} {} at {}ms for {}ms ({} dropped)",
            ctx.listener,
            event.name,
            event.sender,
            state,
            event.time_ms,
            event.duration_ms,
            ctx.dropped
        );
        if let Some(file) = self.file.as_mut() {
            let line = serde_json::to_string(event)
                .map_err(|e| ComponentError::Failed(e.to_string()))?;
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }

    fn exit(&mut self) -> Result<(), ComponentError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
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
