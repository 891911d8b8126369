//! Pipeline orchestration for Darwin.
//!
//! This crate ties sanitizing, rendering and format conversion together into
//! the end-to-end `generate` workflow.

pub mod pipeline;

pub use pipeline::{DocumentService, GeneratedDocument, ProgressReporter, SilentProgress, Stage};
