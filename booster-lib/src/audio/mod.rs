//! Decoding side: asset metadata, sample buffers and the pull reader.

pub mod asset;
pub mod buffer;
pub mod reader;
pub mod samples;
