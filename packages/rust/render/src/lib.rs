//! Dossier rendering: binds a sanitized request into the `.docx` template and
//! writes the primary artifact.
//!
//! Pipeline per call:
//! 1. load the template package (fails with `TemplateNotFound` first)
//! 2. pre-process and evaluate every templated XML part in memory
//! 3. write the package to a temp file inside the output directory
//! 4. persist it under a unique name from [`OutputNamer`]
//!
//! Nothing lands in the output directory unless every part rendered.

mod authoring;
mod docx;
mod namer;
mod preprocess;
mod template;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use darwin_shared::{AppConfig, DarwinError, OutputFormat, Result};

pub use authoring::write_default_template;
pub use namer::OutputNamer;

use crate::docx::Part;
use crate::template::Template;

/// Collision suffixes tried before giving up on a name.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Renders document requests into the primary format.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    template_path: PathBuf,
    output_dir: PathBuf,
    namer: OutputNamer,
}

impl TemplateRenderer {
    pub fn new(
        template_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        namer: OutputNamer,
    ) -> Self {
        Self {
            template_path: template_path.into(),
            output_dir: output_dir.into(),
            namer,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.paths.template_path,
            &config.paths.output_dir,
            OutputNamer::from(&config.naming),
        )
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render `data` and write the artifact. Returns its path.
    ///
    /// `title` only drives the file name; `timestamp` is the second the
    /// request was received.
    #[instrument(skip(self, data), fields(template = %self.template_path.display()))]
    pub fn render(&self, data: &Value, title: &str, timestamp: NaiveDateTime) -> Result<PathBuf> {
        if !self.template_path.is_file() {
            return Err(DarwinError::TemplateNotFound {
                path: self.template_path.clone(),
            });
        }

        let parts = docx::read_package(&self.template_path)?;
        let rendered = parts
            .into_iter()
            .map(|part| render_part(part, data))
            .collect::<Result<Vec<_>>>()?;

        fs::create_dir_all(&self.output_dir).map_err(|e| DarwinError::io(&self.output_dir, e))?;

        let mut staged = tempfile::Builder::new()
            .prefix(".render-")
            .suffix(".tmp")
            .tempfile_in(&self.output_dir)
            .map_err(|e| DarwinError::io(&self.output_dir, e))?;
        docx::write_package(&rendered, staged.as_file_mut())?;

        let stem = self.namer.stem(title, timestamp);
        let path = persist_unique(staged, &self.output_dir, &stem, OutputFormat::PRIMARY.extension())?;

        info!(path = %path.display(), "rendered primary artifact");
        Ok(path)
    }
}

fn render_part(part: Part, data: &Value) -> Result<Part> {
    if !docx::is_templated_part(&part.name) {
        return Ok(part);
    }

    let xml = String::from_utf8(part.data)
        .map_err(|_| DarwinError::render(&part.name, "part is not valid UTF-8"))?;
    let prepared = preprocess::run_pipeline(&xml)?;
    let output = Template::parse(&prepared)?.render(data)?;

    debug!(part = %part.name, bytes = output.len(), "rendered part");
    Ok(Part::new(part.name, output))
}

/// Move `file` into `dir` as `<stem>.<ext>`, or `<stem>_N.<ext>` when that
/// name is taken. Never replaces an existing file.
pub fn persist_unique(
    file: NamedTempFile,
    dir: &Path,
    stem: &str,
    extension: &str,
) -> Result<PathBuf> {
    let mut file = file;
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(OutputNamer::file_name(stem, attempt, extension));
        match file.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "name taken, trying next suffix");
                file = e.file;
            }
            Err(e) => return Err(DarwinError::io(path, e.error)),
        }
    }

    Err(DarwinError::io(
        dir.join(OutputNamer::file_name(stem, 0, extension)),
        io::Error::new(io::ErrorKind::AlreadyExists, "no free artifact name"),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
