//! Sample blocks exchanged between pipeline stages.
//!
//! A [`Stream`] is a block of `num` samples, each of `dim` elements of one
//! [`SampleType`], taken at a fixed rate. The descriptor is shared and
//! immutable; only the sample count, the start time and the values change as
//! a stream is reused between activations.

use crate::pipeline::error::StreamError;
use crate::types::{Element, SampleData, SampleType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Immutable shape of a stream: rate, dimension, element type and labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Samples per second
    pub sample_rate: f64,
    /// Elements per sample
    pub dim: usize,
    pub sample_type: SampleType,
    /// One label per dimension, or empty
    #[serde(default)]
    pub labels: Vec<String>,
}

impl StreamDescriptor {
    pub fn new(sample_rate: f64, dim: usize, sample_type: SampleType) -> Self {
        Self {
            sample_rate,
            dim,
            sample_type,
            labels: Vec::new(),
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    #[inline]
    pub fn byte_width(&self) -> usize {
        self.sample_type.byte_width()
    }

    /// Bytes occupied by one sample (all dimensions)
    #[inline]
    pub fn sample_bytes(&self) -> usize {
        self.dim * self.byte_width()
    }

    /// Label of dimension `index`, falling back to its number
    pub fn label(&self, index: usize) -> String {
        self.labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| index.to_string())
    }

    /// Reject descriptors no buffer can be built for
    pub fn validate(&self) -> Result<(), String> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(format!("sample rate must be positive, got {}", self.sample_rate));
        }
        if self.dim == 0 {
            return Err("dimension must be at least 1".to_string());
        }
        if !self.labels.is_empty() && self.labels.len() != self.dim {
            return Err(format!(
                "{} labels given for {} dimensions",
                self.labels.len(),
                self.dim
            ));
        }
        Ok(())
    }
}

/// A block of samples sharing one descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    descriptor: Arc<StreamDescriptor>,
    num: usize,
    /// Time of the first sample in seconds since the pipeline started
    time: f64,
    data: SampleData,
}

impl Stream {
    /// A zeroed block of `num` samples
    pub fn new(descriptor: Arc<StreamDescriptor>, num: usize) -> Self {
        let data = SampleData::zeroed(descriptor.sample_type, num * descriptor.dim);
        Self {
            descriptor,
            num,
            time: 0.0,
            data,
        }
    }

    /// Wrap existing storage. `data` must hold `num * dim` elements of the
    /// descriptor's type.
    pub fn from_data(
        descriptor: Arc<StreamDescriptor>,
        time: f64,
        data: SampleData,
    ) -> Result<Self, StreamError> {
        if data.sample_type() != descriptor.sample_type {
            return Err(StreamError::TypeMismatch {
                expected: descriptor.sample_type,
                actual: data.sample_type(),
            });
        }
        if data.len() % descriptor.dim != 0 {
            return Err(StreamError::DimensionMismatch {
                expected: descriptor.dim,
                actual: data.len() % descriptor.dim,
            });
        }
        let num = data.len() / descriptor.dim;
        Ok(Self {
            descriptor,
            num,
            time,
            data,
        })
    }

    #[inline]
    pub fn descriptor(&self) -> &Arc<StreamDescriptor> {
        &self.descriptor
    }

    #[inline]
    pub fn num(&self) -> usize {
        self.num
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.descriptor.dim
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.descriptor.sample_rate
    }

    #[inline]
    pub fn sample_type(&self) -> SampleType {
        self.descriptor.sample_type
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    /// Duration covered by the block in seconds
    pub fn duration(&self) -> f64 {
        self.num as f64 / self.descriptor.sample_rate
    }

    pub fn data(&self) -> &SampleData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut SampleData {
        &mut self.data
    }

    /// Change the sample count, keeping existing values and zero-filling new ones
    pub fn resize(&mut self, num: usize) {
        self.num = num;
        self.data.resize(num * self.descriptor.dim);
    }

    /// Typed view of all elements
    pub fn values<T: Element>(&self) -> Result<&[T], StreamError> {
        T::slice(&self.data).ok_or(StreamError::TypeMismatch {
            expected: self.descriptor.sample_type,
            actual: T::TYPE,
        })
    }

    /// Mutable typed view of all elements
    pub fn values_mut<T: Element>(&mut self) -> Result<&mut [T], StreamError> {
        let expected = self.descriptor.sample_type;
        T::slice_mut(&mut self.data).ok_or(StreamError::TypeMismatch {
            expected,
            actual: T::TYPE,
        })
    }

    /// Element `dim` of sample `index` widened to `f64`
    pub fn get_f64(&self, index: usize, dim: usize) -> Option<f64> {
        if dim >= self.descriptor.dim || index >= self.num {
            return None;
        }
        self.data.get_f64(index * self.descriptor.dim + dim)
    }

    /// All values of one dimension widened to `f64`
    pub fn column_f64(&self, dim: usize) -> Vec<f64> {
        (0..self.num).filter_map(|i| self.get_f64(i, dim)).collect()
    }

    /// Copy `n` samples from `src` (starting at `src_sample`) to `dst_sample`.
    pub fn copy_samples_from(
        &mut self,
        dst_sample: usize,
        src: &Stream,
        src_sample: usize,
        n: usize,
    ) -> Result<(), StreamError> {
        self.check_compatible(src.descriptor())?;
        let dim = self.descriptor.dim;
        self.data
            .copy_from(dst_sample * dim, &src.data, src_sample * dim, n * dim)
    }

    /// Check that `other` can be stored alongside this stream
    pub fn check_compatible(&self, other: &StreamDescriptor) -> Result<(), StreamError> {
        if other.sample_type != self.descriptor.sample_type {
            return Err(StreamError::TypeMismatch {
                expected: self.descriptor.sample_type,
                actual: other.sample_type,
            });
        }
        if other.dim != self.descriptor.dim {
            return Err(StreamError::DimensionMismatch {
                expected: self.descriptor.dim,
                actual: other.dim,
            });
        }
        Ok(())
    }

    /// Check that the storage length matches `num * dim`
    pub fn check_len(&self) -> Result<(), StreamError> {
        let expected = self.num * self.descriptor.dim;
        if self.data.len() != expected {
            return Err(StreamError::LengthMismatch {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}
