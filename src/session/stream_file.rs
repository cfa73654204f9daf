//! Persisted stream format.
//!
//! ```text
//! "SSJS" | version: u16 LE | header length: u32 LE | JSON header | payload
//! ```
//!
//! The payload holds `num_samples * dim` elements, little-endian, samples
//! interleaved. The header region is reserved at its largest size when the
//! file is created and rewritten in place by [`StreamFileWriter::finish`],
//! padded with spaces.

use crate::error::{Result, ResultExt, SigflowError};
use crate::pipeline::stream::{Stream, StreamDescriptor};
use crate::types::{SampleData, SampleType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const MAGIC: &[u8; 4] = b"SSJS";
pub const FORMAT_VERSION: u16 = 1;
/// Magic, version and header length
const PREAMBLE_LEN: u64 = 10;
/// Largest JSON header accepted by the reader and produced by the writer
pub const MAX_HEADER_LEN: usize = 64 * 1024;
/// Largest dimension a stream file may declare
pub const MAX_DIM: usize = u16::MAX as usize;

/// JSON header of a stream file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFileHeader {
    pub dim: usize,
    pub byte_width: usize,
    pub sample_type: SampleType,
    pub sample_rate: f64,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Time of the first sample in seconds since its pipeline started
    pub start_time: f64,
    pub num_samples: u64,
    pub recorded_at: DateTime<Utc>,
}

impl StreamFileHeader {
    pub fn new(descriptor: &StreamDescriptor, start_time: f64) -> Self {
        Self {
            dim: descriptor.dim,
            byte_width: descriptor.byte_width(),
            sample_type: descriptor.sample_type,
            sample_rate: descriptor.sample_rate,
            labels: descriptor.labels.clone(),
            start_time,
            num_samples: 0,
            recorded_at: Utc::now(),
        }
    }

    pub fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::new(self.sample_rate, self.dim, self.sample_type)
            .with_labels(self.labels.clone())
    }

    pub fn sample_bytes(&self) -> usize {
        self.dim.saturating_mul(self.byte_width)
    }

    /// Payload size announced by the header, `None` on overflow
    pub fn payload_bytes(&self) -> Option<u64> {
        self.num_samples.checked_mul(self.sample_bytes() as u64)
    }

    fn validate(&self) -> Result<()> {
        if self.dim > MAX_DIM {
            return Err(SigflowError::Format(format!(
                "dimension {} exceeds the limit of {}",
                self.dim, MAX_DIM
            )));
        }
        if self.byte_width != self.sample_type.byte_width() {
            return Err(SigflowError::Format(format!(
                "byte width {} does not match sample type {}",
                self.byte_width, self.sample_type
            )));
        }
        self.descriptor().validate().map_err(SigflowError::Format)
    }

    fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Appends blocks of one stream to a file
pub struct StreamFileWriter {
    file: BufWriter<File>,
    path: PathBuf,
    header: StreamFileHeader,
    descriptor: StreamDescriptor,
    /// Reserved header length in bytes
    header_len: usize,
}

impl StreamFileWriter {
    /// Create (or truncate) `path` and write the preamble
    pub fn create(
        path: impl AsRef<Path>,
        descriptor: &StreamDescriptor,
        start_time: f64,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let header = StreamFileHeader::new(descriptor, start_time);

        let mut largest = header.clone();
        largest.num_samples = u64::MAX;
        let header_len = largest.to_json()?.len();
        if header_len > MAX_HEADER_LEN {
            return Err(SigflowError::Format(format!(
                "header of {} bytes exceeds the {} byte limit",
                header_len, MAX_HEADER_LEN
            )));
        }

        let file = File::create(&path)
            .with_context(|| format!("Failed to create stream file {}", path.display()))?;
        let mut writer = Self {
            file: BufWriter::new(file),
            path,
            header,
            descriptor: descriptor.clone(),
            header_len,
        };
        writer.file.write_all(MAGIC)?;
        writer.file.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.file.write_all(&(header_len as u32).to_le_bytes())?;
        writer.write_header()?;
        Ok(writer)
    }

    fn write_header(&mut self) -> Result<()> {
        let mut json = self.header.to_json()?;
        json.resize(self.header_len, b' ');
        self.file.write_all(&json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples_written(&self) -> u64 {
        self.header.num_samples
    }

    /// Append all samples of `stream`
    pub fn write(&mut self, stream: &Stream) -> Result<()> {
        stream
            .check_compatible(&self.descriptor)
            .map_err(|e| SigflowError::Format(e.to_string()))?;
        stream.data().write_le(&mut self.file)?;
        self.header.num_samples += stream.num() as u64;
        Ok(())
    }

    /// Write the final sample count into the header and flush
    pub fn finish(mut self) -> Result<StreamFileHeader> {
        self.file.seek(SeekFrom::Start(PREAMBLE_LEN))?;
        self.write_header()?;
        self.file.flush()?;
        Ok(self.header)
    }
}

/// Reads a stream file block by block
pub struct StreamFileReader {
    file: BufReader<File>,
    header: StreamFileHeader,
    descriptor: Arc<StreamDescriptor>,
    position: u64,
    bytes: Vec<u8>,
}

impl StreamFileReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open stream file {}", path.display()))?;
        let mut file = BufReader::new(file);

        let mut preamble = [0u8; PREAMBLE_LEN as usize];
        file.read_exact(&mut preamble)
            .map_err(|_| SigflowError::Format("file shorter than its preamble".to_string()))?;
        if &preamble[..4] != MAGIC {
            return Err(SigflowError::Format(format!(
                "{} is not a stream file",
                path.display()
            )));
        }
        let version = u16::from_le_bytes([preamble[4], preamble[5]]);
        if version != FORMAT_VERSION {
            return Err(SigflowError::Format(format!(
                "unsupported format version {}",
                version
            )));
        }
        let header_len =
            u32::from_le_bytes([preamble[6], preamble[7], preamble[8], preamble[9]]) as usize;
        if header_len > MAX_HEADER_LEN {
            return Err(SigflowError::Format(format!(
                "header length {} exceeds the {} byte limit",
                header_len, MAX_HEADER_LEN
            )));
        }
        let mut json = vec![0u8; header_len];
        file.read_exact(&mut json)
            .map_err(|_| SigflowError::Format("truncated header".to_string()))?;
        let header: StreamFileHeader = serde_json::from_slice(&json)?;
        header.validate()?;

        let payload = file
            .get_ref()
            .metadata()?
            .len()
            .saturating_sub(PREAMBLE_LEN + header_len as u64);
        let expected = header.payload_bytes().ok_or_else(|| {
            SigflowError::Format(format!(
                "header announces {} samples of {} bytes, more than a file can hold",
                header.num_samples,
                header.sample_bytes()
            ))
        })?;
        if payload < expected {
            return Err(SigflowError::Format(format!(
                "payload holds {} bytes, header announces {}",
                payload, expected
            )));
        }

        Ok(Self {
            descriptor: Arc::new(header.descriptor()),
            file,
            header,
            position: 0,
            bytes: Vec::new(),
        })
    }

    pub fn header(&self) -> &StreamFileHeader {
        &self.header
    }

    pub fn descriptor(&self) -> &Arc<StreamDescriptor> {
        &self.descriptor
    }

    /// Samples not read yet
    pub fn remaining(&self) -> u64 {
        self.header.num_samples - self.position
    }

    /// Copy up to `output.num()` samples into the front of `output` and
    /// return how many were read. Zero means end of data.
    pub fn read_into(&mut self, output: &mut Stream) -> Result<usize> {
        output
            .check_compatible(&self.descriptor)
            .map_err(|e| SigflowError::Format(e.to_string()))?;
        let n = (output.num() as u64).min(self.remaining()) as usize;
        if n == 0 {
            return Ok(0);
        }
        self.bytes.resize(n * self.header.sample_bytes(), 0);
        self.file.read_exact(&mut self.bytes)?;
        let block = SampleData::from_le_bytes(self.header.sample_type, &self.bytes)
            .map_err(|e| SigflowError::Format(e.to_string()))?;
        output
            .data_mut()
            .copy_from(0, &block, 0, block.len())
            .map_err(|e| SigflowError::Format(e.to_string()))?;
        self.position += n as u64;
        Ok(n)
    }

    /// Read everything that is left into one stream
    pub fn read_all(&mut self) -> Result<Stream> {
        let start = self.header.start_time + self.position as f64 / self.header.sample_rate;
        let mut stream = Stream::new(self.descriptor.clone(), self.remaining() as usize);
        let n = self.read_into(&mut stream)?;
        stream.resize(n);
        stream.set_time(start);
        Ok(stream)
    }
}
