//! Format conversion for derivative artifacts.
//!
//! A [`Converter`] turns a primary (`.docx`) artifact into another format.
//! Implementations:
//! - [`LocalBinaryConverter`]: a headless office suite run as a child process
//! - [`RemoteConverter`]: an HTTP conversion service
//! - [`DisabledConverter`]: refuses every conversion
//!
//! Converters only ever add files to the output directory: output is staged
//! under a temporary name and published without replacing existing files.

mod disabled;
#[cfg(any(test, feature = "fake"))]
mod fake;
mod local;
mod remote;

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use darwin_shared::{ConverterConfig, ConverterKind, DarwinError, OutputFormat, Result};

pub use disabled::DisabledConverter;
#[cfg(any(test, feature = "fake"))]
pub use fake::{FakeConverter, FakeOutcome};
pub use local::LocalBinaryConverter;
pub use remote::RemoteConverter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Converts a primary artifact into a derivative format.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Short name for tracing.
    fn name(&self) -> &str;

    /// Convert `input` to `target`, writing exactly one new file into
    /// `out_dir`. Returns the path of that file.
    ///
    /// Callers never pass the primary format; see [`convert_artifact`].
    async fn convert(&self, input: &Path, target: OutputFormat, out_dir: &Path)
    -> Result<PathBuf>;
}

/// Produce `target` from a primary artifact.
///
/// Requesting the primary format is a passthrough: the input path is returned
/// and the converter is never invoked.
#[instrument(skip(converter), fields(backend = converter.name()))]
pub async fn convert_artifact(
    converter: &dyn Converter,
    input: &Path,
    target: OutputFormat,
    out_dir: &Path,
) -> Result<PathBuf> {
    if target.is_primary() {
        debug!("primary format requested, no conversion");
        return Ok(input.to_path_buf());
    }
    converter.convert(input, target, out_dir).await
}

/// Build the converter selected by `[converter]` configuration.
pub fn converter_from_config(config: &ConverterConfig) -> Result<Arc<dyn Converter>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let converter: Arc<dyn Converter> = match config.kind {
        ConverterKind::Local => Arc::new(
            LocalBinaryConverter::new(&config.program, timeout)
                .isolate_profile(config.isolate_profile),
        ),
        ConverterKind::Remote => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                DarwinError::config("converter.kind = \"remote\" requires converter.endpoint")
            })?;
            Arc::new(RemoteConverter::new(endpoint, timeout)?)
        }
        ConverterKind::Disabled => Arc::new(DisabledConverter),
    };
    Ok(converter)
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

/// File stem shared by a primary artifact and its derivatives.
pub(crate) fn artifact_stem(input: &Path) -> Result<&str> {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            DarwinError::validation(format!("{} has no usable file name", input.display()))
        })
}

/// Seconds reported for a timeout, rounded up so sub-second limits never
/// read as zero.
pub(crate) fn timeout_seconds(timeout: Duration) -> u64 {
    timeout.as_secs_f64().ceil() as u64
}

/// Copy a staged conversion result into `out_dir` under a fresh name.
pub(crate) fn publish_file(
    staged: &Path,
    out_dir: &Path,
    stem: &str,
    target: OutputFormat,
) -> Result<PathBuf> {
    let mut source = File::open(staged).map_err(|e| DarwinError::io(staged, e))?;
    let mut file = staging_file(out_dir)?;
    io::copy(&mut source, file.as_file_mut()).map_err(|e| DarwinError::io(file.path(), e))?;
    darwin_render::persist_unique(file, out_dir, stem, target.extension())
}

/// Write converted bytes into `out_dir` under a fresh name.
pub(crate) fn publish_bytes(
    bytes: &[u8],
    out_dir: &Path,
    stem: &str,
    target: OutputFormat,
) -> Result<PathBuf> {
    use std::io::Write;

    let mut file = staging_file(out_dir)?;
    file.write_all(bytes).map_err(|e| DarwinError::io(file.path(), e))?;
    darwin_render::persist_unique(file, out_dir, stem, target.extension())
}

fn staging_file(out_dir: &Path) -> Result<tempfile::NamedTempFile> {
    std::fs::create_dir_all(out_dir).map_err(|e| DarwinError::io(out_dir, e))?;
    tempfile::Builder::new()
        .prefix(".convert-")
        .suffix(".tmp")
        .tempfile_in(out_dir)
        .map_err(|e| DarwinError::io(out_dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn primary_target_never_invokes_converter() {
        let converter = FakeConverter::new(FakeOutcome::Succeed);
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("DAT_x_20260101_000000.docx");
        std::fs::write(&input, b"docx").unwrap();

        let out = convert_artifact(&converter, &input, OutputFormat::Docx, dir.path())
            .await
            .unwrap();
        assert_eq!(out, input);
        assert_eq!(converter.calls(), 0);
    }

    #[tokio::test]
    async fn derivative_target_invokes_converter_once() {
        let converter = FakeConverter::new(FakeOutcome::Succeed);
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("DAT_x_20260101_000000.docx");
        std::fs::write(&input, b"docx").unwrap();

        let out = convert_artifact(&converter, &input, OutputFormat::Pdf, dir.path())
            .await
            .unwrap();
        assert_eq!(out, dir.path().join("DAT_x_20260101_000000.pdf"));
        assert_eq!(converter.calls(), 1);
    }

    #[test]
    fn publish_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("staged.pdf");
        std::fs::write(&staged, b"new").unwrap();
        std::fs::write(dir.path().join("DAT_x.pdf"), b"old").unwrap();

        let out = publish_file(&staged, dir.path(), "DAT_x", OutputFormat::Pdf).unwrap();
        assert_eq!(out, dir.path().join("DAT_x_2.pdf"));
        assert_eq!(std::fs::read(dir.path().join("DAT_x.pdf")).unwrap(), b"old");
        assert_eq!(std::fs::read(out).unwrap(), b"new");
    }

    #[test]
    fn timeout_seconds_round_up() {
        assert_eq!(timeout_seconds(Duration::from_millis(300)), 1);
        assert_eq!(timeout_seconds(Duration::from_secs(60)), 60);
    }

    #[test]
    fn factory_honours_kind() {
        let mut config = ConverterConfig::default();
        assert_eq!(converter_from_config(&config).unwrap().name(), "local");

        config.kind = ConverterKind::Disabled;
        assert_eq!(converter_from_config(&config).unwrap().name(), "disabled");

        config.kind = ConverterKind::Remote;
        assert!(converter_from_config(&config).is_err());
        config.endpoint = Some("http://localhost:3000/convert".into());
        assert_eq!(converter_from_config(&config).unwrap().name(), "remote");
    }
}
