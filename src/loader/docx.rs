//! DOCX text extraction.
//!
//! A .docx file is a zip container; the document body lives in
//! `word/document.xml`. Text runs (`w:t`) are collected per paragraph
//! (`w:p`) and paragraphs joined with newlines, preserving document order.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::core::errors::ApiError;

pub fn extract_text(path: &Path) -> Result<String, ApiError> {
    let file = File::open(path).map_err(ApiError::internal)?;
    let mut archive = zip::ZipArchive::new(file).map_err(ApiError::internal)?;
    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(ApiError::internal)?;

    let mut xml = String::new();
    entry.read_to_string(&mut xml).map_err(ApiError::internal)?;

    Ok(paragraph_text(&xml))
}

fn paragraph_text(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => match start.local_name().as_ref() {
                b"p" => current.clear(),
                b"t" => in_run_text = true,
                _ => {}
            },
            Ok(Event::Text(text)) if in_run_text => {
                if let Ok(decoded) = text.unescape() {
                    current.push_str(&decoded);
                }
            }
            Ok(Event::End(end)) => match end.local_name().as_ref() {
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                b"t" => in_run_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                tracing::warn!("Malformed document.xml, stopping extraction: {}", err);
                break;
            }
            _ => {}
        }
    }

    paragraphs.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>
    <w:p><w:r><w:t>Second </w:t></w:r><w:r><w:t>paragraph.</w:t></w:r></w:p>
    <w:p/>
    <w:p><w:r><w:t>Fish &amp; chips.</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    #[test]
    fn paragraphs_join_with_newlines() {
        let text = paragraph_text(DOCUMENT_XML);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "First paragraph.");
        assert_eq!(lines[1], "Second paragraph.");
        assert!(text.contains("Fish & chips."));
    }

    #[test]
    fn extract_from_real_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.docx");

        let file = File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        std::io::Write::write_all(&mut writer, DOCUMENT_XML.as_bytes()).unwrap();
        writer.finish().unwrap();

        let text = extract_text(&path).unwrap();
        assert!(text.starts_with("First paragraph."));
    }
}
