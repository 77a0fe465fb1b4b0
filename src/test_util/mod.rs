//! This module contains utilities for testing stream ingestion: synthetic JPEG-like byte
//!  sequences, and a fake camera endpoint on localhost. They are used by this crate's own
//!  tests, but they are exported for application testing as well.

pub mod camera;
pub mod jpeg;

