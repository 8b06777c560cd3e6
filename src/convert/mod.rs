//! Conversion tools.
//!
//! Every tool is a variant of [`Tool`]; [`Converter::convert`] validates the inputs
//! against the tool's declared arity and accepted extensions, then runs the matching
//! operation. Each operation writes exactly one file into the converted area and
//! returns its path and storage name.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, info};

use crate::intake::UploadedFile;
use crate::storage::StorageAreas;

mod docx;
mod layout;
mod ooxml;
mod pdf;
mod pptx;
mod raster;
mod render;
mod xlsx;

const PDF: &[&str] = &["pdf"];
const IMAGES: &[&str] = &["png", "jpg", "jpeg"];
const DOCX: &[&str] = &["docx"];
const XLSX: &[&str] = &["xlsx"];
const PPTX: &[&str] = &["pptx"];

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// Wrong number or type of inputs for the selected tool.
    #[error("{0}")]
    Validation(String),
    /// The document/image backend could not read or produce a file.
    #[error("{0}")]
    Library(String),
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn library(err: impl fmt::Display) -> Self {
        Self::Library(err.to_string())
    }
}

/// Where a conversion left its output.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub path: PathBuf,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Arity {
    /// Uses the first uploaded file.
    One,
    AtLeast(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Merge,
    PdfToWord,
    PdfToExcel,
    PdfToPpt,
    PngToJpg,
    JpgToPng,
    ImageCompressor,
    ImageToPdf,
    WordToPdf,
    BackgroundRemover,
    SplitPdf,
    CompressPdf,
    ExcelToPdf,
    PptToPdf,
    ResizeImage,
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid tool selected")]
pub struct UnknownTool;

impl Tool {
    pub const ALL: [Tool; 15] = [
        Tool::Merge,
        Tool::PdfToWord,
        Tool::PdfToExcel,
        Tool::PdfToPpt,
        Tool::PngToJpg,
        Tool::JpgToPng,
        Tool::ImageCompressor,
        Tool::ImageToPdf,
        Tool::WordToPdf,
        Tool::BackgroundRemover,
        Tool::SplitPdf,
        Tool::CompressPdf,
        Tool::ExcelToPdf,
        Tool::PptToPdf,
        Tool::ResizeImage,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Tool::Merge => "merge",
            Tool::PdfToWord => "pdf-to-word",
            Tool::PdfToExcel => "pdf-to-excel",
            Tool::PdfToPpt => "pdf-to-ppt",
            Tool::PngToJpg => "png-to-jpg",
            Tool::JpgToPng => "jpg-to-png",
            Tool::ImageCompressor => "image-compressor",
            Tool::ImageToPdf => "image-to-pdf",
            Tool::WordToPdf => "word-to-pdf",
            Tool::BackgroundRemover => "background-remover",
            Tool::SplitPdf => "split-pdf",
            Tool::CompressPdf => "compress-pdf",
            Tool::ExcelToPdf => "excel-to-pdf",
            Tool::PptToPdf => "ppt-to-pdf",
            Tool::ResizeImage => "resize-image",
        }
    }

    /// Input extensions the tool can read.
    pub fn accepts(self) -> &'static [&'static str] {
        match self {
            Tool::Merge
            | Tool::PdfToWord
            | Tool::PdfToExcel
            | Tool::PdfToPpt
            | Tool::SplitPdf
            | Tool::CompressPdf => PDF,
            Tool::PngToJpg
            | Tool::JpgToPng
            | Tool::ImageCompressor
            | Tool::ImageToPdf
            | Tool::BackgroundRemover
            | Tool::ResizeImage => IMAGES,
            Tool::WordToPdf => DOCX,
            Tool::ExcelToPdf => XLSX,
            Tool::PptToPdf => PPTX,
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            Tool::Merge => Arity::AtLeast(2),
            Tool::ImageToPdf => Arity::AtLeast(1),
            _ => Arity::One,
        }
    }

    /// Prefix placed before the random token of the output name.
    fn output_prefix(self) -> &'static str {
        match self {
            Tool::Merge => "merged_",
            Tool::SplitPdf => "split_",
            Tool::CompressPdf | Tool::ImageCompressor => "compressed_",
            Tool::BackgroundRemover => "nobg_",
            Tool::ResizeImage => "resized_",
            _ => "",
        }
    }

    /// Check input count and types before any conversion work starts.
    pub fn validate(self, files: &[UploadedFile]) -> Result<(), ConversionError> {
        let checked = match self.arity() {
            Arity::AtLeast(min) => {
                if files.len() < min {
                    return Err(ConversionError::validation(match self {
                        Tool::Merge => "Please select at least 2 PDF files to merge".to_string(),
                        _ => format!("{} needs at least {} file(s)", self.id(), min),
                    }));
                }
                files
            }
            Arity::One => match files.first() {
                Some(first) => std::slice::from_ref(first),
                None => {
                    return Err(ConversionError::validation(format!(
                        "{} needs one input file",
                        self.id()
                    )))
                }
            },
        };

        let accepted = self.accepts();
        if let Some(bad) = checked.iter().find(|f| !accepted.contains(&f.ext.as_str())) {
            return Err(ConversionError::validation(match self {
                Tool::Merge => format!(
                    "File '{}' is not a PDF. Only PDF files can be merged.",
                    bad.original
                ),
                _ => format!(
                    "File '{}' cannot be used with {} (expected {})",
                    bad.original,
                    self.id(),
                    accepted.join(", ")
                ),
            }));
        }
        Ok(())
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Tool {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tool::ALL
            .into_iter()
            .find(|tool| tool.id() == s)
            .ok_or(UnknownTool)
    }
}

/// Runs tools against saved uploads, writing into the converted area.
#[derive(Debug, Clone)]
pub struct Converter {
    areas: StorageAreas,
    pdfium_library_path: Option<PathBuf>,
}

impl Converter {
    pub fn new(areas: StorageAreas, pdfium_library_path: Option<PathBuf>) -> Self {
        Self {
            areas,
            pdfium_library_path,
        }
    }

    pub fn areas(&self) -> &StorageAreas {
        &self.areas
    }

    pub(crate) fn pdfium_library_path(&self) -> Option<&Path> {
        self.pdfium_library_path.as_deref()
    }

    fn output(&self, tool: Tool, ext: &str) -> (PathBuf, String) {
        self.areas.allocate_output(tool.output_prefix(), ext)
    }

    /// Validate inputs and run `tool` synchronously.
    pub fn convert(
        &self,
        tool: Tool,
        files: &[UploadedFile],
    ) -> Result<ConversionResult, ConversionError> {
        tool.validate(files)?;
        debug!(%tool, inputs = files.len(), "running conversion");

        let first = &files[0];
        let (path, name) = match tool {
            Tool::Merge => {
                let out = self.output(tool, "pdf");
                pdf::merge_pdfs(files, &out.0)?;
                out
            }
            Tool::SplitPdf => {
                let out = self.output(tool, "pdf");
                pdf::split_first_page(&first.path, &out.0)?;
                out
            }
            Tool::CompressPdf => {
                let out = self.output(tool, "pdf");
                pdf::strip_metadata(&first.path, &out.0)?;
                out
            }
            Tool::PdfToWord => {
                let out = self.output(tool, "docx");
                docx::pdf_to_docx(&first.path, &out.0)?;
                out
            }
            Tool::PdfToExcel => {
                let out = self.output(tool, "xlsx");
                xlsx::pdf_to_xlsx(&first.path, &out.0)?;
                out
            }
            Tool::PdfToPpt => {
                let out = self.output(tool, "pptx");
                pptx::pdf_to_pptx(self, &first.path, &out.0)?;
                out
            }
            Tool::PngToJpg => {
                let out = self.output(tool, "jpg");
                raster::to_jpeg(&first.path, &out.0)?;
                out
            }
            Tool::JpgToPng => {
                let out = self.output(tool, "png");
                raster::to_png(&first.path, &out.0)?;
                out
            }
            Tool::ImageCompressor => {
                let out = self.output(tool, &first.ext);
                raster::compress(&first.path, &first.ext, &out.0)?;
                out
            }
            Tool::ResizeImage => {
                let out = self.output(tool, &first.ext);
                raster::halve(&first.path, &first.ext, &out.0)?;
                out
            }
            Tool::BackgroundRemover => {
                let out = self.output(tool, "png");
                raster::remove_background(&first.path, &out.0)?;
                out
            }
            Tool::ImageToPdf => {
                let out = self.output(tool, "pdf");
                layout::images_to_pdf(files, &out.0)?;
                out
            }
            Tool::WordToPdf => {
                let out = self.output(tool, "pdf");
                layout::docx_to_pdf(&first.path, &out.0)?;
                out
            }
            Tool::ExcelToPdf => {
                let out = self.output(tool, "pdf");
                layout::xlsx_to_pdf(&first.path, &out.0)?;
                out
            }
            Tool::PptToPdf => {
                let out = self.output(tool, "pdf");
                layout::pptx_to_pdf(&first.path, &out.0)?;
                out
            }
        };

        info!(%tool, inputs = files.len(), output = %name, "conversion finished");
        Ok(ConversionResult { path, name })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn areas(dir: &tempfile::TempDir) -> StorageAreas {
        let areas = StorageAreas::new(dir.path().join("uploads"), dir.path().join("converted"));
        areas.ensure_dirs().unwrap();
        areas
    }

    pub fn converter(dir: &tempfile::TempDir) -> Converter {
        Converter::new(areas(dir), None)
    }

    /// Write `bytes` into the upload area as if it had gone through intake.
    pub fn upload(areas: &StorageAreas, original: &str, bytes: &[u8]) -> UploadedFile {
        let ext = crate::intake::extension_of(original).unwrap_or_default();
        let stored = crate::storage::allocate_name("", &ext);
        let path = areas.upload_dir().join(&stored);
        std::fs::write(&path, bytes).unwrap();
        UploadedFile {
            original: original.to_string(),
            stored,
            path,
            ext,
        }
    }

    /// A PDF with one text line per page.
    pub fn text_pdf(pages: &[&str]) -> Vec<u8> {
        let mut composer = layout::TextPdf::new();
        for (i, text) in pages.iter().enumerate() {
            if i > 0 {
                composer.new_page();
            }
            composer.line(layout::Font::Regular, 12.0, text, 20.0);
        }
        let mut out = Vec::new();
        composer.write_to(&mut out).unwrap();
        out
    }

    pub fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }
}
