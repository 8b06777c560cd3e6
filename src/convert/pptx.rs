//! Presentations: reading slide text and writing minimal decks of picture or
//! text slides.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat};
use lazy_static::lazy_static;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use tracing::{debug, warn};

use super::ooxml::{self, escape_text, PackageWriter, XML_DECLARATION};
use super::{pdf, render, ConversionError, Converter};

const EMU_PER_INCH: u64 = 914_400;
const SLIDE_WIDTH: u64 = 10 * EMU_PER_INCH;
const SLIDE_HEIGHT: u64 = 7 * EMU_PER_INCH + EMU_PER_INCH / 2;
const PICTURE_OFFSET: u64 = EMU_PER_INCH / 2;
const PICTURE_HEIGHT: u64 = 6 * EMU_PER_INCH;
const MAX_BODY_CHARS: usize = 5000;

const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_OFFICE_DOC: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const REL_SLIDE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
const REL_SLIDE_MASTER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster";
const REL_SLIDE_LAYOUT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";
const REL_THEME: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme";
const REL_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

fn slide_number(part: &str) -> Option<u32> {
    lazy_static! {
        static ref SLIDE_PART_RE: Regex = Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap();
    }
    SLIDE_PART_RE.captures(part)?.get(1)?.as_str().parse().ok()
}

/// Text of every shape on every slide, slides in presentation order. A shape's
/// paragraphs are joined with `\n`; shapes without text are omitted.
pub(crate) fn read_slides(input: &Path) -> Result<Vec<Vec<String>>, ConversionError> {
    let mut archive = ooxml::open_package(input)?;
    let mut parts: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
        .collect();
    parts.sort();

    let mut slides = Vec::with_capacity(parts.len());
    for (_, part) in parts {
        let xml = ooxml::read_part(&mut archive, &part)?;
        slides.push(parse_shapes(&xml)?);
    }
    Ok(slides)
}

fn parse_shapes(xml: &str) -> Result<Vec<String>, ConversionError> {
    let mut reader = Reader::from_str(xml);
    let mut shapes = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut shape_depth = 0usize;
    let mut in_paragraph = false;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(ConversionError::library)? {
            Event::Start(e) => match e.name().as_ref() {
                b"p:sp" => {
                    shape_depth += 1;
                    if shape_depth == 1 {
                        paragraphs.clear();
                    }
                }
                b"a:p" if shape_depth > 0 => {
                    in_paragraph = true;
                    paragraphs.push(String::new());
                }
                b"a:t" => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"p:sp" if shape_depth > 0 => {
                    shape_depth -= 1;
                    if shape_depth == 0 {
                        let text = paragraphs.join("\n");
                        if !text.trim().is_empty() {
                            shapes.push(text);
                        }
                    }
                }
                b"a:p" => in_paragraph = false,
                b"a:t" => in_text = false,
                _ => {}
            },
            Event::Empty(e) if shape_depth > 0 && e.name().as_ref() == b"a:p" => {
                paragraphs.push(String::new());
            }
            Event::Text(t) if in_text && in_paragraph => {
                if let Some(last) = paragraphs.last_mut() {
                    last.push_str(&t.unescape().map_err(ConversionError::library)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(shapes)
}

enum Slide {
    Picture { png: Vec<u8>, width: u64, height: u64 },
    Text { title: String, body: String },
}

/// A presentation under construction; 4:3 slides, one blank layout.
pub(crate) struct Deck {
    slides: Vec<Slide>,
}

impl Deck {
    pub fn new() -> Self {
        Self { slides: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    /// Add a slide holding `image` at a fixed height, half an inch from the corner.
    pub fn add_picture(&mut self, image: &DynamicImage) -> Result<(), ConversionError> {
        let (w, h) = (image.width() as u64, image.height() as u64);
        if w == 0 || h == 0 {
            return Err(ConversionError::library("rendered page is empty"));
        }
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .map_err(ConversionError::library)?;
        self.slides.push(Slide::Picture {
            png: png.into_inner(),
            width: PICTURE_HEIGHT * w / h,
            height: PICTURE_HEIGHT,
        });
        Ok(())
    }

    pub fn add_text(&mut self, title: impl Into<String>, body: impl Into<String>) {
        self.slides.push(Slide::Text {
            title: title.into(),
            body: body.into(),
        });
    }

    pub fn save(&self, out: &Path) -> Result<(), ConversionError> {
        let mut pkg = PackageWriter::create(out)?;
        pkg.add("[Content_Types].xml", self.content_types().as_bytes())?;
        pkg.add("_rels/.rels", root_rels().as_bytes())?;
        pkg.add("ppt/presentation.xml", self.presentation().as_bytes())?;
        pkg.add("ppt/_rels/presentation.xml.rels", self.presentation_rels().as_bytes())?;
        pkg.add("ppt/slideMasters/slideMaster1.xml", slide_master().as_bytes())?;
        pkg.add(
            "ppt/slideMasters/_rels/slideMaster1.xml.rels",
            relationships(&[
                ("rId1", REL_SLIDE_LAYOUT, "../slideLayouts/slideLayout1.xml"),
                ("rId2", REL_THEME, "../theme/theme1.xml"),
            ])
            .as_bytes(),
        )?;
        pkg.add("ppt/slideLayouts/slideLayout1.xml", slide_layout().as_bytes())?;
        pkg.add(
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
            relationships(&[("rId1", REL_SLIDE_MASTER, "../slideMasters/slideMaster1.xml")])
                .as_bytes(),
        )?;
        pkg.add("ppt/theme/theme1.xml", THEME.as_bytes())?;

        for (i, slide) in self.slides.iter().enumerate() {
            let n = i + 1;
            let layout = ("rId1", REL_SLIDE_LAYOUT, "../slideLayouts/slideLayout1.xml");
            match slide {
                Slide::Picture { png, width, height } => {
                    let media = format!("../media/image{}.png", n);
                    pkg.add(&format!("ppt/media/image{}.png", n), png)?;
                    pkg.add(
                        &format!("ppt/slides/_rels/slide{}.xml.rels", n),
                        relationships(&[layout, ("rId2", REL_IMAGE, media.as_str())]).as_bytes(),
                    )?;
                    pkg.add(
                        &format!("ppt/slides/slide{}.xml", n),
                        slide_xml(&picture_shape(*width, *height)).as_bytes(),
                    )?;
                }
                Slide::Text { title, body } => {
                    pkg.add(
                        &format!("ppt/slides/_rels/slide{}.xml.rels", n),
                        relationships(&[layout]).as_bytes(),
                    )?;
                    let shapes = format!(
                        "{}{}",
                        text_shape(2, "Title", (457_200, 274_638), (8_229_600, 1_143_000), 3200, title),
                        text_shape(3, "Body", (457_200, 1_600_200), (8_229_600, 4_525_963), 1400, body),
                    );
                    pkg.add(&format!("ppt/slides/slide{}.xml", n), slide_xml(&shapes).as_bytes())?;
                }
            }
        }
        pkg.finish()
    }

    fn content_types(&self) -> String {
        let slides: String = (1..=self.slides.len())
            .map(|n| {
                format!(
                    r#"<Override PartName="/ppt/slides/slide{}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#,
                    n
                )
            })
            .collect();
        format!(
            r#"{}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/><Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/><Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/><Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/>{}</Types>"#,
            XML_DECLARATION, slides
        )
    }

    fn presentation(&self) -> String {
        let ids: String = (0..self.slides.len())
            .map(|i| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + i, 3 + i))
            .collect();
        let slide_list = if ids.is_empty() {
            String::new()
        } else {
            format!("<p:sldIdLst>{}</p:sldIdLst>", ids)
        };
        format!(
            r#"{}<p:presentation xmlns:a="{}" xmlns:r="{}" xmlns:p="{}"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>{}<p:sldSz cx="{}" cy="{}"/><p:notesSz cx="{}" cy="{}"/></p:presentation>"#,
            XML_DECLARATION, NS_A, NS_R, NS_P, slide_list, SLIDE_WIDTH, SLIDE_HEIGHT, SLIDE_HEIGHT, SLIDE_WIDTH
        )
    }

    fn presentation_rels(&self) -> String {
        let targets: Vec<(String, String)> = (1..=self.slides.len())
            .map(|n| (format!("rId{}", n + 2), format!("slides/slide{}.xml", n)))
            .collect();
        let mut rels = vec![
            ("rId1", REL_SLIDE_MASTER, "slideMasters/slideMaster1.xml"),
            ("rId2", REL_THEME, "theme/theme1.xml"),
        ];
        rels.extend(targets.iter().map(|(id, target)| (id.as_str(), REL_SLIDE, target.as_str())));
        relationships(&rels)
    }
}

fn relationships(rels: &[(&str, &str, &str)]) -> String {
    let body: String = rels
        .iter()
        .map(|(id, kind, target)| {
            format!(r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#, id, kind, target)
        })
        .collect();
    format!(r#"{}<Relationships xmlns="{}">{}</Relationships>"#, XML_DECLARATION, NS_PKG_REL, body)
}

fn root_rels() -> String {
    relationships(&[("rId1", REL_OFFICE_DOC, "ppt/presentation.xml")])
}

const GROUP_HEADER: &str = r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#;

fn slide_xml(shapes: &str) -> String {
    format!(
        r#"{}<p:sld xmlns:a="{}" xmlns:r="{}" xmlns:p="{}"><p:cSld><p:spTree>{}{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#,
        XML_DECLARATION, NS_A, NS_R, NS_P, GROUP_HEADER, shapes
    )
}

fn slide_master() -> String {
    format!(
        r#"{}<p:sldMaster xmlns:a="{}" xmlns:r="{}" xmlns:p="{}"><p:cSld><p:spTree>{}</p:spTree></p:cSld><p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst></p:sldMaster>"#,
        XML_DECLARATION, NS_A, NS_R, NS_P, GROUP_HEADER
    )
}

fn slide_layout() -> String {
    format!(
        r#"{}<p:sldLayout xmlns:a="{}" xmlns:r="{}" xmlns:p="{}" type="blank" preserve="1"><p:cSld name="Blank"><p:spTree>{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#,
        XML_DECLARATION, NS_A, NS_R, NS_P, GROUP_HEADER
    )
}

fn text_shape(
    id: u32,
    name: &str,
    (x, y): (u64, u64),
    (cx, cy): (u64, u64),
    size: u32,
    text: &str,
) -> String {
    let paragraphs: String = text
        .lines()
        .map(|line| {
            format!(
                r#"<a:p><a:r><a:rPr lang="en-US" sz="{}" dirty="0"/><a:t>{}</a:t></a:r></a:p>"#,
                size,
                escape_text(line)
            )
        })
        .collect();
    let paragraphs = if paragraphs.is_empty() {
        "<a:p/>".to_string()
    } else {
        paragraphs
    };
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{}" name="{}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr><a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr><p:txBody><a:bodyPr wrap="square"><a:normAutofit/></a:bodyPr><a:lstStyle/>{}</p:txBody></p:sp>"#,
        id, name, x, y, cx, cy, paragraphs
    )
}

fn picture_shape(cx: u64, cy: u64) -> String {
    format!(
        r#"<p:pic><p:nvPicPr><p:cNvPr id="2" name="Picture 1"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId2"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr><a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#,
        PICTURE_OFFSET, PICTURE_OFFSET, cx, cy
    )
}

const THEME: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme"><a:themeElements><a:clrScheme name="Office"><a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1><a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1><a:dk2><a:srgbClr val="1F497D"/></a:dk2><a:lt2><a:srgbClr val="EEECE1"/></a:lt2><a:accent1><a:srgbClr val="4F81BD"/></a:accent1><a:accent2><a:srgbClr val="C0504D"/></a:accent2><a:accent3><a:srgbClr val="9BBB59"/></a:accent3><a:accent4><a:srgbClr val="8064A2"/></a:accent4><a:accent5><a:srgbClr val="4BACC6"/></a:accent5><a:accent6><a:srgbClr val="F79646"/></a:accent6><a:hlink><a:srgbClr val="0000FF"/></a:hlink><a:folHlink><a:srgbClr val="800080"/></a:folHlink></a:clrScheme><a:fontScheme name="Office"><a:majorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme><a:fmtScheme name="Office"><a:fillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:fillStyleLst><a:lnStyleLst><a:ln w="9525"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="25400"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="38100"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln></a:lnStyleLst><a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst><a:bgFillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:bgFillStyleLst></a:fmtScheme></a:themeElements><a:objectDefaults/><a:extraClrSchemeLst/></a:theme>"#;

fn picture_deck(pages: Vec<DynamicImage>) -> Result<Deck, ConversionError> {
    let mut deck = Deck::new();
    for page in &pages {
        deck.add_picture(page)?;
    }
    Ok(deck)
}

/// One titled slide per page that has text. Never fails: unreadable input
/// yields an empty deck.
fn text_deck(input: &Path) -> Deck {
    let mut deck = Deck::new();
    match pdf::page_texts(input) {
        Ok(pages) => {
            for (i, text) in pages.iter().enumerate() {
                if text.trim().is_empty() {
                    continue;
                }
                let body: String = text.chars().take(MAX_BODY_CHARS).collect();
                deck.add_text(format!("Page {}", i + 1), body);
            }
        }
        Err(e) => warn!(error = %e, "text extraction failed; writing empty presentation"),
    }
    deck
}

/// Each page rendered as a picture slide; when rendering is unavailable or
/// fails, one text slide per non-empty page instead.
pub(crate) fn pdf_to_pptx(
    conv: &Converter,
    input: &Path,
    out: &Path,
) -> Result<(), ConversionError> {
    let deck = render::render_pages(conv.pdfium_library_path(), input)
        .and_then(picture_deck)
        .unwrap_or_else(|e| {
            warn!(error = %e, "page rendering failed; falling back to text slides");
            text_deck(input)
        });
    debug!(slides = deck.len(), "presentation assembled");
    deck.save(out)
}
