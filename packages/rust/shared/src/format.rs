//! Output formats a document can be delivered in.

use serde::{Deserialize, Serialize};

/// Output format selector.
///
/// `Docx` is the template's native format; the others are derived by an
/// external converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Docx,
    Pdf,
    Odt,
}

impl OutputFormat {
    /// The format produced directly by the template renderer.
    pub const PRIMARY: OutputFormat = OutputFormat::Docx;

    /// All recognized selectors, primary first.
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Docx, OutputFormat::Pdf, OutputFormat::Odt];

    /// Selector / file extension (without leading dot).
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Pdf => "pdf",
            Self::Odt => "odt",
        }
    }

    /// Registered media type for HTTP `Content-Type` headers.
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Pdf => "application/pdf",
            Self::Odt => "application/vnd.oasis.opendocument.text",
        }
    }

    /// Whether this format needs no conversion step.
    pub fn is_primary(&self) -> bool {
        *self == Self::PRIMARY
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = crate::DarwinError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docx" => Ok(Self::Docx),
            "pdf" => Ok(Self::Pdf),
            "odt" => Ok(Self::Odt),
            other => Err(crate::DarwinError::validation(format!(
                "unknown output format '{other}': expected docx, pdf or odt"
            ))),
        }
    }
}
