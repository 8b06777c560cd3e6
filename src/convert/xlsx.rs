use std::path::Path;

use calamine::{open_workbook_auto, Reader};
use lazy_static::lazy_static;
use regex::Regex;
use rust_xlsxwriter::{Format, Workbook};
use tracing::debug;

use super::{pdf, ConversionError};

/// Longest string a worksheet cell can hold.
const MAX_CELL_CHARS: usize = 32_767;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

/// All sheets in workbook order, every cell rendered as text. The header row is
/// treated like any other row.
pub(crate) fn read_sheets(input: &Path) -> Result<Vec<Sheet>, ConversionError> {
    let mut workbook = open_workbook_auto(input).map_err(ConversionError::library)?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names().to_vec() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(ConversionError::library)?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        sheets.push(Sheet { name, rows });
    }
    Ok(sheets)
}

/// A table found in page text: header row first.
pub(crate) type Table = Vec<Vec<String>>;

fn split_cells(line: &str) -> Vec<String> {
    lazy_static! {
        static ref CELL_GAP_RE: Regex = Regex::new(r"\t|\s{2,}").unwrap();
    }
    CELL_GAP_RE
        .split(line.trim())
        .map(|cell| cell.trim().to_string())
        .filter(|cell| !cell.is_empty())
        .collect()
}

/// Runs of at least two consecutive lines that each split into two or more
/// cells on tabs or wide gaps.
pub(crate) fn detect_tables(page_text: &str) -> Vec<Table> {
    let mut tables = Vec::new();
    let mut run: Table = Vec::new();
    for line in page_text.lines() {
        let cells = split_cells(line);
        if cells.len() >= 2 {
            run.push(cells);
            continue;
        }
        if run.len() >= 2 {
            tables.push(std::mem::take(&mut run));
        } else {
            run.clear();
        }
    }
    if run.len() >= 2 {
        tables.push(run);
    }
    tables
}

fn cell_text(text: &str) -> String {
    text.chars().take(MAX_CELL_CHARS).collect()
}

/// One sheet per detected table (`Table_N`); without any table, a single
/// `Content` column with one row per page.
pub(crate) fn pdf_to_xlsx(input: &Path, out: &Path) -> Result<(), ConversionError> {
    let pages = pdf::page_texts(input)?;
    let tables: Vec<Table> = pages.iter().flat_map(|text| detect_tables(text)).collect();

    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    if tables.is_empty() {
        let sheet = workbook.add_worksheet();
        sheet
            .write_string_with_format(0, 0, "Content", &header)
            .map_err(ConversionError::library)?;
        for (i, text) in pages.iter().enumerate() {
            sheet
                .write_string(i as u32 + 1, 0, cell_text(text.trim_end()))
                .map_err(ConversionError::library)?;
        }
        debug!(pages = pages.len(), "no tables found; wrote page text");
    } else {
        for (t, table) in tables.iter().enumerate() {
            let sheet = workbook.add_worksheet();
            sheet
                .set_name(format!("Table_{}", t + 1))
                .map_err(ConversionError::library)?;
            for (r, row) in table.iter().enumerate() {
                for (c, cell) in row.iter().enumerate() {
                    let (r, c) = (r as u32, c as u16);
                    let written = if r == 0 {
                        sheet.write_string_with_format(r, c, cell_text(cell), &header)
                    } else {
                        sheet.write_string(r, c, cell_text(cell))
                    };
                    written.map_err(ConversionError::library)?;
                }
            }
        }
        debug!(tables = tables.len(), "tables extracted");
    }

    workbook.save(out).map_err(ConversionError::library)
}
