//! Recording streams to disk and reading them back.
//!
//! A recording is one file per stream in the SSJS format described in
//! [`stream_file`]. [`StreamWriter`](crate::pipeline::nodes::StreamWriter)
//! records inside a running pipeline, [`FileSource`](crate::pipeline::nodes::FileSource)
//! replays a recording as a provider.

pub mod stream_file;

pub use stream_file::{
    StreamFileHeader, StreamFileReader, StreamFileWriter, FORMAT_VERSION, MAGIC, MAX_HEADER_LEN,
};
