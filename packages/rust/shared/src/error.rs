//! Error types for Darwin.
//!
//! Library crates use [`DarwinError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics, and reports
//! [`DarwinError::kind`] so callers can tell failure classes apart.

use std::path::PathBuf;

/// Top-level error type for all Darwin operations.
#[derive(Debug, thiserror::Error)]
pub enum DarwinError {
    /// The template asset is absent from its configured location.
    #[error("template not found: {}", path.display())]
    TemplateNotFound { path: PathBuf },

    /// A template binding could not be resolved against the request data.
    #[error("render error at `{binding}`: {cause}")]
    Render { binding: String, cause: String },

    /// The external converter could not be located or executed.
    #[error("conversion unavailable: {message}")]
    ConversionUnavailable { message: String },

    /// The external converter exceeded its time budget and was terminated.
    #[error("conversion timed out after {seconds}s")]
    ConversionTimeout { seconds: u64 },

    /// The external converter reported a failure.
    #[error("conversion failed: {diagnostics}")]
    ConversionFailed { diagnostics: String },

    /// The converter exited successfully but produced no output file.
    #[error("conversion produced no output at {}", expected.display())]
    ConversionOutputMissing { expected: PathBuf },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Request validation error (malformed payload, unknown format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DarwinError>;

/// Stable, machine-readable classification of a [`DarwinError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TemplateNotFound,
    RenderError,
    ConversionUnavailable,
    ConversionTimeout,
    ConversionFailed,
    ConversionOutputMissing,
    Config,
    Io,
    Validation,
}

impl ErrorKind {
    /// Identifier surfaced to callers; never changes once published.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TemplateNotFound => "template_not_found",
            Self::RenderError => "render_error",
            Self::ConversionUnavailable => "conversion_unavailable",
            Self::ConversionTimeout => "conversion_timeout",
            Self::ConversionFailed => "conversion_failed",
            Self::ConversionOutputMissing => "conversion_output_missing",
            Self::Config => "config",
            Self::Io => "io",
            Self::Validation => "validation",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DarwinError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TemplateNotFound { .. } => ErrorKind::TemplateNotFound,
            Self::Render { .. } => ErrorKind::RenderError,
            Self::ConversionUnavailable { .. } => ErrorKind::ConversionUnavailable,
            Self::ConversionTimeout { .. } => ErrorKind::ConversionTimeout,
            Self::ConversionFailed { .. } => ErrorKind::ConversionFailed,
            Self::ConversionOutputMissing { .. } => ErrorKind::ConversionOutputMissing,
            Self::Config { .. } => ErrorKind::Config,
            Self::Io { .. } => ErrorKind::Io,
            Self::Validation { .. } => ErrorKind::Validation,
        }
    }

    /// Create a render error for a binding name.
    pub fn render(binding: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Render {
            binding: binding.into(),
            cause: cause.into(),
        }
    }

    /// Create a conversion-unavailable error from any displayable message.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ConversionUnavailable {
            message: msg.into(),
        }
    }

    /// Create a conversion-failed error carrying converter diagnostics.
    pub fn conversion_failed(diagnostics: impl Into<String>) -> Self {
        Self::ConversionFailed {
            diagnostics: diagnostics.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
