//! Page-level PDF work: merging, keeping the first page, stripping metadata and
//! per-page text extraction.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use lopdf::{dictionary, Document, Object, ObjectId};
use tracing::{debug, error, warn};

use super::ConversionError;
use crate::intake::UploadedFile;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];
const MAX_TREE_DEPTH: usize = 64;

pub(crate) fn load(path: &Path) -> Result<Document, ConversionError> {
    Document::load(path).map_err(ConversionError::library)
}

fn save(doc: &mut Document, path: &Path) -> Result<(), ConversionError> {
    doc.prune_objects();
    doc.compress();
    let mut out = BufWriter::new(File::create(path)?);
    doc.save_to(&mut out).map_err(ConversionError::library)?;
    out.flush()?;
    Ok(())
}

/// Copy inherited attributes onto the page itself so it survives re-parenting.
fn pin_inherited_attributes(doc: &mut Document, page_id: ObjectId) {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return;
    };
    let mut missing: Vec<&[u8]> = INHERITABLE.iter().copied().filter(|k| !page.has(k)).collect();
    let mut found: Vec<(Vec<u8>, Object)> = Vec::new();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();

    let mut depth = 0;
    while let Some(node_id) = parent {
        if missing.is_empty() || depth >= MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };
        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                found.push((key.to_vec(), value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
        for (key, value) in found {
            page.set(key, value);
        }
    }
}

/// Replace the page tree and catalog with a flat tree holding `pages` in order.
fn rebuild_page_tree(doc: &mut Document, pages: &[ObjectId]) {
    for &page_id in pages {
        pin_inherited_attributes(doc, page_id);
    }
    let pages_id = doc.new_object_id();
    for &page_id in pages {
        if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            page.set("Parent", pages_id);
        }
    }
    let kids: Vec<Object> = pages.iter().map(|&id| id.into()).collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
}

/// Concatenate all pages of `files`, in input order. Every unreadable input is
/// reported, not just the first.
pub(crate) fn merge_pdfs(files: &[UploadedFile], out: &Path) -> Result<(), ConversionError> {
    let mut docs = Vec::with_capacity(files.len());
    let mut failed = Vec::new();
    for file in files {
        match Document::load(&file.path) {
            Ok(doc) => docs.push(doc),
            Err(e) => {
                error!(file = %file.original, error = %e, "cannot read pdf for merge");
                failed.push(file.original.as_str());
            }
        }
    }
    if !failed.is_empty() {
        return Err(ConversionError::Library(format!(
            "Could not merge the following files (possibly corrupt): {}",
            failed.join(", ")
        )));
    }

    let mut merged = Document::with_version("1.5");
    let mut next_id = 1;
    let mut kids = Vec::new();
    for mut doc in docs {
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for &page_id in &pages {
            pin_inherited_attributes(&mut doc, page_id);
        }
        kids.extend(pages);
        merged.objects.extend(doc.objects);
    }
    merged.max_id = next_id - 1;

    rebuild_page_tree(&mut merged, &kids);
    debug!(inputs = files.len(), pages = kids.len(), "pdfs merged");
    save(&mut merged, out)
}

/// Write a document holding only the first page. A source without pages yields
/// a document without pages.
pub(crate) fn split_first_page(input: &Path, out: &Path) -> Result<(), ConversionError> {
    let mut doc = load(input)?;
    let first: Vec<ObjectId> = doc.get_pages().into_values().take(1).collect();
    if first.is_empty() {
        warn!(input = %input.display(), "source pdf has no pages; output will be empty");
    }
    rebuild_page_tree(&mut doc, &first);
    save(&mut doc, out)
}

/// Re-serialize every page with the document information and XMP metadata removed.
pub(crate) fn strip_metadata(input: &Path, out: &Path) -> Result<(), ConversionError> {
    let mut doc = load(input)?;
    doc.trailer.remove(b"Info");
    if let Ok(root) = doc.trailer.get(b"Root").and_then(Object::as_reference) {
        if let Ok(catalog) = doc.get_object_mut(root).and_then(Object::as_dict_mut) {
            catalog.remove(b"Metadata");
        }
    }
    save(&mut doc, out)
}

/// Extracted text of every page, in page order. Pages whose text cannot be
/// decoded come back empty.
pub(crate) fn page_texts(input: &Path) -> Result<Vec<String>, ConversionError> {
    let doc = load(input)?;
    let texts = doc
        .get_pages()
        .into_keys()
        .map(|number| {
            doc.extract_text(&[number]).unwrap_or_else(|e| {
                warn!(page = number, error = %e, "text extraction failed");
                String::new()
            })
        })
        .collect();
    Ok(texts)
}

#[cfg(test)]
pub(crate) fn page_count(path: &Path) -> usize {
    Document::load(path).map(|d| d.get_pages().len()).unwrap_or(0)
}

#[cfg(test)]
mod pdf_tests {
    use super::*;
    use crate::convert::test_support::*;
    use crate::convert::{Converter, Tool};

    fn upload_pdf(conv: &Converter, name: &str, pages: &[&str]) -> UploadedFile {
        upload(conv.areas(), name, &text_pdf(pages))
    }

    #[test]
    fn merge_concatenates_pages_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(&dir);
        let a = upload_pdf(&conv, "a.pdf", &["alpha one", "alpha two"]);
        let b = upload_pdf(&conv, "b.pdf", &["bravo one"]);
        let c = upload_pdf(&conv, "c.pdf", &["charlie one", "charlie two", "charlie three"]);

        let res = conv.convert(Tool::Merge, &[a, b, c]).unwrap();
        assert!(res.name.starts_with("merged_"));
        assert_eq!(page_count(&res.path), 6);

        let texts = page_texts(&res.path).unwrap();
        assert!(texts[0].contains("alpha"));
        assert!(texts[2].contains("bravo"));
        assert!(texts[5].contains("charlie"));
    }

    #[test]
    fn merge_reports_every_corrupt_input() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(&dir);
        let good = upload_pdf(&conv, "good.pdf", &["ok"]);
        let bad1 = upload(conv.areas(), "bad1.pdf", b"%PDF-1.4 garbage");
        let bad2 = upload(conv.areas(), "bad2.pdf", b"not a pdf at all");

        let err = conv.convert(Tool::Merge, &[good, bad1, bad2]).unwrap_err();
        assert!(matches!(err, ConversionError::Library(_)));
        let msg = err.to_string();
        assert!(msg.contains("bad1.pdf"));
        assert!(msg.contains("bad2.pdf"));
        assert!(!msg.contains("good.pdf"));
    }

    #[test]
    fn split_keeps_only_the_first_page() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(&dir);
        let src = upload_pdf(&conv, "three.pdf", &["first", "second", "third"]);

        let res = conv.convert(Tool::SplitPdf, &[src]).unwrap();
        assert!(res.name.starts_with("split_"));
        assert_eq!(page_count(&res.path), 1);
        assert!(page_texts(&res.path).unwrap()[0].contains("first"));
    }

    #[test]
    fn split_of_pageless_pdf_writes_pageless_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(&dir);

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0_i64,
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        let src = upload(conv.areas(), "empty.pdf", &bytes);

        let res = conv.convert(Tool::SplitPdf, &[src]).unwrap();
        assert!(res.name.starts_with("split_"));
        let out = Document::load(&res.path).unwrap();
        assert!(out.get_pages().is_empty());
    }

    #[test]
    fn pinned_attributes_survive_reparenting() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.pdf");
        std::fs::write(&src, text_pdf(&["x"])).unwrap();
        let out = dir.path().join("out.pdf");

        split_first_page(&src, &out).unwrap();

        let doc = Document::load(&out).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        assert!(page.has(b"MediaBox"));
        assert!(page.has(b"Resources"));
    }

    #[test]
    fn compress_strips_info_and_keeps_pages() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(&dir);

        let mut doc = Document::load_mem(&text_pdf(&["a", "b"])).unwrap();
        let info = doc.add_object(dictionary! { "Author" => Object::string_literal("someone") });
        doc.trailer.set("Info", info);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        let src = upload(conv.areas(), "meta.pdf", &bytes);

        let res = conv.convert(Tool::CompressPdf, &[src]).unwrap();
        assert!(res.name.starts_with("compressed_"));
        let out = Document::load(&res.path).unwrap();
        assert_eq!(out.get_pages().len(), 2);
        assert!(out.trailer.get(b"Info").is_err());
    }

    #[test]
    fn corrupt_pdf_is_a_library_error() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(&dir);
        let bad = upload(conv.areas(), "bad.pdf", b"garbage");
        let err = conv.convert(Tool::SplitPdf, &[bad]).unwrap_err();
        assert!(matches!(err, ConversionError::Library(_)));
    }
}
