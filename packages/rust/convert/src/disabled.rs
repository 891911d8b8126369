use std::path::{Path, PathBuf};

use async_trait::async_trait;

use darwin_shared::{DarwinError, OutputFormat, Result};

use crate::Converter;

/// Stand-in when no conversion backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledConverter;

#[async_trait]
impl Converter for DisabledConverter {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn convert(
        &self,
        _input: &Path,
        target: OutputFormat,
        _out_dir: &Path,
    ) -> Result<PathBuf> {
        Err(DarwinError::unavailable(format!(
            "no converter configured, cannot produce {target}; only {} is available",
            OutputFormat::PRIMARY
        )))
    }
}
