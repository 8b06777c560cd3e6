//! Shared plumbing for Office Open XML packages (zip containers of XML parts).

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::ConversionError;

pub(crate) const XML_DECLARATION: &str =
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

pub(crate) fn open_package(path: &Path) -> Result<ZipArchive<File>, ConversionError> {
    ZipArchive::new(File::open(path)?).map_err(ConversionError::library)
}

/// Read one part as UTF-8 text.
pub(crate) fn read_part(
    archive: &mut ZipArchive<File>,
    name: &str,
) -> Result<String, ConversionError> {
    let mut part = archive
        .by_name(name)
        .map_err(|e| ConversionError::Library(format!("{}: {}", name, e)))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Escape text for element content, dropping characters XML 1.0 cannot carry.
pub(crate) fn escape_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || !c.is_control())
        .collect();
    quick_xml::escape::escape(cleaned.as_str()).into_owned()
}

/// Sequential writer of package parts, deflating each one.
pub(crate) struct PackageWriter {
    zip: ZipWriter<File>,
    options: FileOptions,
}

impl PackageWriter {
    pub fn create(path: &Path) -> Result<Self, ConversionError> {
        Ok(Self {
            zip: ZipWriter::new(File::create(path)?),
            options: FileOptions::default().compression_method(CompressionMethod::Deflated),
        })
    }

    pub fn add(&mut self, name: &str, bytes: &[u8]) -> Result<(), ConversionError> {
        self.zip
            .start_file(name, self.options)
            .map_err(ConversionError::library)?;
        self.zip.write_all(bytes)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), ConversionError> {
        self.zip.finish().map_err(ConversionError::library)?;
        Ok(())
    }
}

#[cfg(test)]
mod ooxml_tests {
    use super::*;

    #[test]
    fn escape_text_handles_markup_and_control_chars() {
        assert_eq!(escape_text("a < b & c"), "a &lt; b &amp; c");
        assert_eq!(escape_text("x\u{1}y\tz"), "xy\tz");
    }

    #[test]
    fn written_parts_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.zip");
        let mut writer = PackageWriter::create(&path).unwrap();
        writer.add("a/b.xml", b"<x/>").unwrap();
        writer.finish().unwrap();

        let mut archive = open_package(&path).unwrap();
        assert_eq!(read_part(&mut archive, "a/b.xml").unwrap(), "<x/>");
        let err = read_part(&mut archive, "missing.xml").unwrap_err();
        assert!(err.to_string().contains("missing.xml"));
    }

    #[test]
    fn non_zip_input_is_a_library_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.docx");
        std::fs::write(&path, b"plain text").unwrap();
        assert!(matches!(open_package(&path), Err(ConversionError::Library(_))));
    }
}
