use std::fs::File;
use std::path::Path;

use docx_rs::{BreakType, Docx, Paragraph, Run};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use super::{ooxml, pdf, ConversionError};

const DOCUMENT_PART: &str = "word/document.xml";

/// Text of every body paragraph in document order. Paragraphs inside tables are
/// skipped; tabs and line breaks are kept as `\t` and `\n`.
pub(crate) fn read_paragraphs(input: &Path) -> Result<Vec<String>, ConversionError> {
    let mut archive = ooxml::open_package(input)?;
    let xml = ooxml::read_part(&mut archive, DOCUMENT_PART)?;
    parse_paragraphs(&xml)
}

fn parse_paragraphs(xml: &str) -> Result<Vec<String>, ConversionError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut para_depth = 0usize;
    let mut table_depth = 0usize;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(ConversionError::library)? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:tbl" => table_depth += 1,
                b"w:p" if table_depth == 0 => para_depth += 1,
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"w:tbl" => table_depth = table_depth.saturating_sub(1),
                b"w:p" if table_depth == 0 && para_depth > 0 => {
                    para_depth -= 1;
                    if para_depth == 0 {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                }
                b"w:t" => in_text = false,
                _ => {}
            },
            Event::Empty(e) if para_depth > 0 && table_depth == 0 => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" | b"w:cr" => current.push('\n'),
                _ => {}
            },
            Event::Empty(e) if e.name().as_ref() == b"w:p" && table_depth == 0 => {
                paragraphs.push(String::new());
            }
            Event::Text(t) if in_text && para_depth > 0 && table_depth == 0 => {
                current.push_str(&t.unescape().map_err(ConversionError::library)?);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs)
}

fn page_break() -> Paragraph {
    Paragraph::new().add_run(Run::new().add_break(BreakType::Page))
}

/// One paragraph per extracted text line, with a page break between source pages.
pub(crate) fn pdf_to_docx(input: &Path, out: &Path) -> Result<(), ConversionError> {
    let pages = pdf::page_texts(input)?;
    let mut doc = Docx::new();
    let mut paragraphs = 0usize;
    for (i, text) in pages.iter().enumerate() {
        if i > 0 {
            doc = doc.add_paragraph(page_break());
        }
        for line in text.trim_end().lines() {
            let line: String = line
                .trim_end()
                .chars()
                .filter(|&c| c == '\t' || !c.is_control())
                .collect();
            doc = doc.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)));
            paragraphs += 1;
        }
    }
    debug!(pages = pages.len(), paragraphs, "pdf text rebuilt as docx");

    let file = File::create(out)?;
    doc.build().pack(file).map_err(ConversionError::library)?;
    Ok(())
}
