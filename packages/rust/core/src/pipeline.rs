//! End-to-end `generate` pipeline: request → sanitize → render → convert.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{info, instrument, warn};

use darwin_convert::{Converter, convert_artifact, converter_from_config};
use darwin_render::TemplateRenderer;
use darwin_shared::{AppConfig, DarwinError, DocumentRequest, OutputFormat, RequestId, Result};

// ---------------------------------------------------------------------------
// Stages and progress
// ---------------------------------------------------------------------------

/// Pipeline states, in order. A run ends in `Finalized` (primary format) or
/// `Converted` (derivative format), or fails in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Sanitized,
    Rendered,
    Finalized,
    Converting,
    Converted,
}

impl Stage {
    /// Human-readable label for progress displays.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Received => "Request received",
            Self::Sanitized => "Rich text sanitized",
            Self::Rendered => "Document rendered",
            Self::Finalized => "Document ready",
            Self::Converting => "Converting document",
            Self::Converted => "Conversion complete",
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when the pipeline enters `stage`.
    fn stage(&self, stage: Stage);
    /// Called when the pipeline completes.
    fn done(&self, document: &GeneratedDocument);
    /// Called when the pipeline stops on an error.
    fn failed(&self, error: &DarwinError);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: Stage) {}
    fn done(&self, _document: &GeneratedDocument) {}
    fn failed(&self, _error: &DarwinError) {}
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// The artifact delivered to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDocument {
    /// Path of the delivered artifact.
    pub path: PathBuf,
    /// Format of the delivered artifact.
    pub format: OutputFormat,
    /// `Content-Type` for `format`.
    pub media_type: &'static str,
    /// Identifier of this invocation, as seen in the logs.
    pub request_id: RequestId,
    /// Total elapsed time.
    #[serde(skip)]
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Generates dossiers. Holds configuration only; every call is independent.
#[derive(Clone)]
pub struct DocumentService {
    renderer: TemplateRenderer,
    converter: Arc<dyn Converter>,
}

impl DocumentService {
    pub fn new(config: &AppConfig, converter: Arc<dyn Converter>) -> Self {
        Self {
            renderer: TemplateRenderer::from_config(config),
            converter,
        }
    }

    /// Build a service with the converter selected by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(config, converter_from_config(&config.converter)?))
    }

    pub fn output_dir(&self) -> &Path {
        self.renderer.output_dir()
    }

    pub fn converter_name(&self) -> &str {
        self.converter.name()
    }

    /// Generate a dossier stamped with the current local time.
    pub async fn generate(
        &self,
        request: DocumentRequest,
        format: OutputFormat,
        progress: &dyn ProgressReporter,
    ) -> Result<GeneratedDocument> {
        let now = chrono::Local::now().naive_local();
        self.generate_at(request, format, now, progress).await
    }

    /// Generate a dossier stamped with `timestamp`.
    ///
    /// 1. Sanitize rich-text fields
    /// 2. Render the primary artifact
    /// 3. Convert it when a derivative format was requested
    ///
    /// A failed conversion fails the whole call; the primary artifact is
    /// never handed back in place of the requested format.
    #[instrument(
        skip_all,
        fields(
            request_id = tracing::field::Empty,
            title = %request.titre_projet,
            format = %format
        )
    )]
    pub async fn generate_at(
        &self,
        request: DocumentRequest,
        format: OutputFormat,
        timestamp: NaiveDateTime,
        progress: &dyn ProgressReporter,
    ) -> Result<GeneratedDocument> {
        let start = Instant::now();
        let request_id = RequestId::new();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));

        match self.run(request, format, timestamp, progress).await {
            Ok(path) => {
                let document = GeneratedDocument {
                    path,
                    format,
                    media_type: format.media_type(),
                    request_id,
                    elapsed: start.elapsed(),
                };
                progress.done(&document);
                info!(
                    path = %document.path.display(),
                    media_type = document.media_type,
                    elapsed_ms = document.elapsed.as_millis() as u64,
                    "generate pipeline complete"
                );
                Ok(document)
            }
            Err(e) => {
                warn!(kind = %e.kind(), error = %e, "generate pipeline failed");
                progress.failed(&e);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: DocumentRequest,
        format: OutputFormat,
        timestamp: NaiveDateTime,
        progress: &dyn ProgressReporter,
    ) -> Result<PathBuf> {
        progress.stage(Stage::Received);
        let title = request.titre_projet.clone();

        // --- Sanitize ---
        let value = serde_json::to_value(&request)
            .map_err(|e| DarwinError::validation(format!("request cannot be encoded: {e}")))?;
        let data = darwin_sanitizer::sanitize_tree(value);
        progress.stage(Stage::Sanitized);

        // --- Render ---
        let renderer = self.renderer.clone();
        let span = tracing::Span::current();
        let primary = tokio::task::spawn_blocking(move || {
            span.in_scope(|| renderer.render(&data, &title, timestamp))
        })
        .await
        .map_err(|e| DarwinError::render("renderer", format!("render task failed: {e}")))??;
        progress.stage(Stage::Rendered);

        if format.is_primary() {
            progress.stage(Stage::Finalized);
            return Ok(primary);
        }

        // --- Convert ---
        progress.stage(Stage::Converting);
        let converted = convert_artifact(
            self.converter.as_ref(),
            &primary,
            format,
            self.renderer.output_dir(),
        )
        .await?;
        progress.stage(Stage::Converted);

        Ok(converted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
