//! Reading and writing the OOXML zip package.

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use darwin_shared::{DarwinError, Result};

/// One entry of the package, kept in archive order.
#[derive(Debug, Clone)]
pub(crate) struct Part {
    pub name: String,
    pub data: Vec<u8>,
}

impl Part {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Parts that may carry template tags. Everything else is copied verbatim.
pub(crate) fn is_templated_part(name: &str) -> bool {
    name == "word/document.xml"
        || (name.starts_with("word/header") && name.ends_with(".xml"))
        || (name.starts_with("word/footer") && name.ends_with(".xml"))
}

/// Load every part of the package at `path`.
pub(crate) fn read_package(path: &Path) -> Result<Vec<Part>> {
    let file = File::open(path).map_err(|e| DarwinError::io(path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| invalid_package(path, e))?;

    let mut parts = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| invalid_package(path, e))?;
        if entry.is_dir() {
            continue;
        }
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut data)
            .map_err(|e| DarwinError::io(path, e))?;
        parts.push(Part::new(entry.name(), data));
    }

    if !parts.iter().any(|p| p.name == "word/document.xml") {
        return Err(DarwinError::render(
            "template",
            format!("{} has no word/document.xml part", path.display()),
        ));
    }
    Ok(parts)
}

/// Write `parts` as a zip package. `[Content_Types].xml` goes first, as
/// consumers expect.
pub(crate) fn write_package<W: Write + Seek>(parts: &[Part], writer: W) -> Result<W> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let content_types = parts.iter().filter(|p| p.name == "[Content_Types].xml");
    let others = parts.iter().filter(|p| p.name != "[Content_Types].xml");

    for part in content_types.chain(others) {
        zip.start_file(part.name.as_str(), options)
            .map_err(|e| DarwinError::render(&part.name, format!("cannot write part: {e}")))?;
        zip.write_all(&part.data)
            .map_err(|e| DarwinError::render(&part.name, format!("cannot write part: {e}")))?;
    }

    zip.finish()
        .map_err(|e| DarwinError::render("package", format!("cannot finish archive: {e}")))
}

fn invalid_package(path: &Path, e: zip::result::ZipError) -> DarwinError {
    DarwinError::render(
        "template",
        format!("{} is not a valid document package: {e}", path.display()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn templated_parts() {
        assert!(is_templated_part("word/document.xml"));
        assert!(is_templated_part("word/header1.xml"));
        assert!(is_templated_part("word/footer2.xml"));
        assert!(!is_templated_part("word/styles.xml"));
        assert!(!is_templated_part("word/_rels/document.xml.rels"));
        assert!(!is_templated_part("word/media/header.png"));
    }

    #[test]
    fn package_roundtrip_keeps_parts() {
        let parts = vec![
            Part::new("word/document.xml", "<w:document/>"),
            Part::new("[Content_Types].xml", "<Types/>"),
        ];
        let cursor = write_package(&parts, Cursor::new(Vec::new())).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.docx");
        std::fs::write(&path, cursor.into_inner()).unwrap();

        let read = read_package(&path).unwrap();
        assert_eq!(read[0].name, "[Content_Types].xml");
        assert_eq!(read[1].data, b"<w:document/>");
    }

    #[test]
    fn corrupt_package_is_a_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"not a zip").unwrap();
        let err = read_package(&path).unwrap_err();
        assert_eq!(err.kind().as_str(), "render_error");
    }
}
