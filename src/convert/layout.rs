//! PDF output composed page by page: flowing text on US Letter pages and
//! image-per-page documents.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::GenericImageView;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

use super::{docx, pptx, raster, xlsx, ConversionError};
use crate::intake::UploadedFile;

pub(crate) const PAGE_WIDTH: f32 = 612.0;
pub(crate) const PAGE_HEIGHT: f32 = 792.0;
pub(crate) const MARGIN: f32 = 50.0;
const PRINTABLE_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
/// Pixels per inch assumed when an image becomes a page.
const IMAGE_PAGE_DPI: f32 = 100.0;
const MAX_LINE_CHARS: usize = 100;

/// Helvetica advance widths (1/1000 em) for ' '..='~'.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

/// Width of `text` in points when set in Helvetica at `size`.
pub(crate) fn text_width(text: &str, size: f32) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| {
            let idx = (c as u32).wrapping_sub(32) as usize;
            HELVETICA_WIDTHS.get(idx).copied().unwrap_or(556) as u32
        })
        .sum();
    units as f32 * size / 1000.0
}

/// Greedy word wrap against `max_width`. A word wider than the line stays whole.
pub(crate) fn wrap_words(text: &str, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if line.is_empty() {
            line.push_str(word);
            continue;
        }
        let candidate = format!("{} {}", line, word);
        if text_width(&candidate, size) < max_width {
            line = candidate;
        } else {
            lines.push(std::mem::replace(&mut line, word.to_string()));
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// WinAnsi bytes for a literal string; control characters become spaces and
/// anything outside Latin-1 becomes '?'.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0..=0x1f | 0x7f => b' ',
            n @ 0x20..=0xff => n as u8,
            _ => b'?',
        })
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Top-down text writer; starts with one empty page and moves to a new page
/// once the cursor drops below the bottom margin.
pub(crate) struct TextPdf {
    pages: Vec<Vec<Operation>>,
    y: f32,
}

impl TextPdf {
    pub fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    pub fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = PAGE_HEIGHT - MARGIN;
    }

    pub fn skip(&mut self, dy: f32) {
        self.y -= dy;
    }

    /// Draw one line at the left margin, then move down by `advance`.
    pub fn line(&mut self, font: Font, size: f32, text: &str, advance: f32) {
        if self.y < MARGIN {
            self.new_page();
        }
        let y = self.y;
        if let Some(ops) = self.pages.last_mut() {
            ops.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![font.resource_name().into(), size.into()]),
                Operation::new("Td", vec![MARGIN.into(), y.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
                ),
                Operation::new("ET", vec![]),
            ]);
        }
        self.y -= advance;
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn write_to<W: Write>(self, out: &mut W) -> Result<(), ConversionError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                Font::Regular.resource_name() => regular,
                Font::Bold.resource_name() => bold,
            },
        });

        let mut kids: Vec<Object> = Vec::with_capacity(self.pages.len());
        for operations in self.pages {
            let content = Content { operations }
                .encode()
                .map_err(ConversionError::library)?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    PAGE_WIDTH.into(),
                    PAGE_HEIGHT.into(),
                ],
            }),
        );
        finish(doc, pages_id, out)
    }

    pub fn save(self, path: &Path) -> Result<(), ConversionError> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_to(&mut out)?;
        out.flush()?;
        Ok(())
    }
}

fn finish<W: Write>(
    mut doc: Document,
    pages_id: ObjectId,
    out: &mut W,
) -> Result<(), ConversionError> {
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();
    doc.save_to(out).map_err(ConversionError::library)
}

/// Each image becomes one page sized to the image at 100 dpi, in input order.
pub(crate) fn images_to_pdf(files: &[UploadedFile], out: &Path) -> Result<(), ConversionError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(files.len());

    for file in files {
        let img = raster::open(&file.path)
            .map_err(|e| ConversionError::library(format!("{}: {}", file.original, e)))?;
        let (w, h) = img.dimensions();
        let rgb = img.to_rgb8().into_raw();

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w as i64,
                "Height" => h as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
            },
            rgb,
        ));

        let page_w = w as f32 * 72.0 / IMAGE_PAGE_DPI;
        let page_h = h as f32 * 72.0 / IMAGE_PAGE_DPI;
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        page_w.into(),
                        Object::Integer(0),
                        Object::Integer(0),
                        page_h.into(),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec!["Im0".into()]),
                Operation::new("Q", vec![]),
            ],
        }
        .encode()
        .map_err(ConversionError::library)?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                page_w.into(),
                page_h.into(),
            ],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
        debug!(file = %file.original, width = w, height = h, "image page added");
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let mut writer = BufWriter::new(File::create(out)?);
    finish(doc, pages_id, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Body paragraphs re-flowed at 12pt with manual wrapping.
pub(crate) fn docx_to_pdf(input: &Path, out: &Path) -> Result<(), ConversionError> {
    let paragraphs = docx::read_paragraphs(input)?;
    let mut pdf = TextPdf::new();
    for para in &paragraphs {
        let text = para.trim();
        if text.is_empty() {
            continue;
        }
        for line in wrap_words(text, 12.0, PRINTABLE_WIDTH) {
            pdf.line(Font::Regular, 12.0, &line, 20.0);
        }
    }
    debug!(paragraphs = paragraphs.len(), pages = pdf.page_count(), "docx laid out");
    pdf.save(out)
}

/// Every sheet under a bold heading, each data row as one " | "-joined line.
/// The first row holds column names and is not printed.
pub(crate) fn xlsx_to_pdf(input: &Path, out: &Path) -> Result<(), ConversionError> {
    let sheets = xlsx::read_sheets(input)?;
    let mut pdf = TextPdf::new();
    for sheet in &sheets {
        pdf.line(Font::Bold, 14.0, &format!("Sheet: {}", sheet.name), 30.0);
        for row in sheet.rows.iter().skip(1) {
            let joined = row.join(" | ");
            pdf.line(Font::Regular, 10.0, &truncate_chars(&joined, MAX_LINE_CHARS), 15.0);
        }
        pdf.skip(20.0);
    }
    debug!(sheets = sheets.len(), pages = pdf.page_count(), "xlsx laid out");
    pdf.save(out)
}

/// One page per slide (more if a slide overflows), one line per text-bearing shape.
pub(crate) fn pptx_to_pdf(input: &Path, out: &Path) -> Result<(), ConversionError> {
    let slides = pptx::read_slides(input)?;
    let mut pdf = TextPdf::new();
    for (i, shapes) in slides.iter().enumerate() {
        if i > 0 {
            pdf.new_page();
        }
        for text in shapes {
            let text = text.trim();
            if !text.is_empty() {
                pdf.line(Font::Regular, 12.0, &truncate_chars(text, MAX_LINE_CHARS), 20.0);
            }
        }
    }
    debug!(slides = slides.len(), pages = pdf.page_count(), "pptx laid out");
    pdf.save(out)
}
