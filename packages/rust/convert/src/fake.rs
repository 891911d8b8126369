//! Scripted converter for tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use darwin_shared::{DarwinError, OutputFormat, Result};

use crate::{Converter, artifact_stem, publish_file};

/// What every call to a [`FakeConverter`] does.
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    /// Copy the input to `<stem>.<ext>`.
    Succeed,
    /// Fail with the given diagnostics.
    Fail(String),
    /// Report a timeout after `seconds`.
    TimeOut(u64),
    /// Report the backend as unavailable.
    Unavailable,
    /// Finish without producing anything.
    NoOutput,
}

/// Converter with a fixed outcome and a call counter.
#[derive(Debug)]
pub struct FakeConverter {
    outcome: FakeOutcome,
    calls: AtomicUsize,
}

impl FakeConverter {
    pub fn new(outcome: FakeOutcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `convert` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Converter for FakeConverter {
    fn name(&self) -> &str {
        "fake"
    }

    async fn convert(
        &self,
        input: &Path,
        target: OutputFormat,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stem = artifact_stem(input)?;

        match &self.outcome {
            FakeOutcome::Succeed => publish_file(input, out_dir, stem, target),
            FakeOutcome::Fail(diagnostics) => Err(DarwinError::conversion_failed(diagnostics)),
            FakeOutcome::TimeOut(seconds) => Err(DarwinError::ConversionTimeout { seconds: *seconds }),
            FakeOutcome::Unavailable => Err(DarwinError::unavailable("fake converter unavailable")),
            FakeOutcome::NoOutput => Err(DarwinError::ConversionOutputMissing {
                expected: out_dir.join(format!("{stem}.{}", target.extension())),
            }),
        }
    }
}
