//! Artifact naming: `<prefix>_<slug>_<YYYYMMDD_HHMMSS>.<ext>`.

use chrono::NaiveDateTime;

use darwin_shared::NamingConfig;

/// Timestamp layout, second granularity.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Derives filesystem-safe artifact names from document titles.
///
/// Names are deterministic for a given title and second; uniqueness on disk is
/// enforced when the artifact is persisted (see [`OutputNamer::file_name`]).
#[derive(Debug, Clone)]
pub struct OutputNamer {
    prefix: String,
    fallback: String,
}

impl OutputNamer {
    pub fn new(prefix: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            fallback: fallback.into(),
        }
    }

    /// Build the file stem (no extension) for `title` at `timestamp`.
    pub fn stem(&self, title: &str, timestamp: NaiveDateTime) -> String {
        let slug = slugify(title);
        let slug = if slug.is_empty() { self.fallback.as_str() } else { slug.as_str() };
        format!("{}_{}_{}", self.prefix, slug, timestamp.format(TIMESTAMP_FORMAT))
    }

    /// File name for a stem. `attempt` 0 is the plain name; later attempts
    /// append `_2`, `_3`, … to resolve collisions.
    pub fn file_name(stem: &str, attempt: u32, extension: &str) -> String {
        match attempt {
            0 => format!("{stem}.{extension}"),
            n => format!("{stem}_{}.{extension}", n + 1),
        }
    }
}

impl From<&NamingConfig> for OutputNamer {
    fn from(config: &NamingConfig) -> Self {
        Self::new(config.prefix.clone(), config.fallback_title.clone())
    }
}

/// Keep letters, digits, hyphens and underscores.
///
/// Spaces pass the character filter but are dropped from the segment so the
/// name never contains whitespace.
fn slugify(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .filter(|c| *c != ' ')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 18)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap()
    }

    fn namer() -> OutputNamer {
        OutputNamer::new("DAT", "document")
    }

    #[test]
    fn strips_unsafe_characters() {
        assert_eq!(namer().stem("Mon Projet/Test", at()), "DAT_MonProjetTest_20260218_090507");
    }

    #[test]
    fn keeps_unicode_letters_hyphen_and_underscore() {
        assert_eq!(
            namer().stem("Étude-Réseau_v2", at()),
            "DAT_Étude-Réseau_v2_20260218_090507"
        );
    }

    #[test]
    fn empty_title_falls_back() {
        assert_eq!(namer().stem("", at()), "DAT_document_20260218_090507");
        assert_eq!(namer().stem(" /\\:*?", at()), "DAT_document_20260218_090507");
    }

    #[test]
    fn deterministic_for_same_inputs() {
        assert_eq!(namer().stem("Same", at()), namer().stem("Same", at()));
    }

    #[test]
    fn path_traversal_is_neutralized() {
        let stem = namer().stem("../../etc/passwd", at());
        assert!(!stem.contains('/'));
        assert!(!stem.contains(".."));
    }

    #[test]
    fn collision_suffixes() {
        assert_eq!(OutputNamer::file_name("DAT_x_1", 0, "docx"), "DAT_x_1.docx");
        assert_eq!(OutputNamer::file_name("DAT_x_1", 1, "docx"), "DAT_x_1_2.docx");
        assert_eq!(OutputNamer::file_name("DAT_x_1", 2, "pdf"), "DAT_x_1_3.pdf");
    }
}
