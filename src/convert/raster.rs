use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, Rgba, RgbImage};
use tracing::debug;

use super::ConversionError;

const CONVERT_JPEG_QUALITY: u8 = 95;
const COMPRESS_JPEG_QUALITY: u8 = 50;
/// Channel value above which a pixel counts as background.
const BACKGROUND_THRESHOLD: u8 = 200;

/// Decode by content rather than by the stored extension.
pub(crate) fn open(path: &Path) -> Result<DynamicImage, ConversionError> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(ConversionError::library)
}

/// Composite onto a white background, dropping alpha.
fn flatten_on_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let blend = |c: u8| ((c as u16 * a as u16 + 255 * (255 - a as u16)) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

fn write_jpeg(img: &DynamicImage, quality: u8, out: &Path) -> Result<(), ConversionError> {
    let rgb = flatten_on_white(img);
    let mut writer = BufWriter::new(File::create(out)?);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode_image(&rgb)
        .map_err(ConversionError::library)?;
    writer.flush()?;
    Ok(())
}

fn write_png(img: &DynamicImage, compression: CompressionType, out: &Path) -> Result<(), ConversionError> {
    let mut writer = BufWriter::new(File::create(out)?);
    let encoder = PngEncoder::new_with_quality(&mut writer, compression, PngFilter::Adaptive);
    img.write_with_encoder(encoder).map_err(ConversionError::library)?;
    writer.flush()?;
    Ok(())
}

fn is_jpeg(ext: &str) -> bool {
    matches!(ext, "jpg" | "jpeg")
}

pub(crate) fn to_jpeg(input: &Path, out: &Path) -> Result<(), ConversionError> {
    let img = open(input)?;
    write_jpeg(&img, CONVERT_JPEG_QUALITY, out)
}

pub(crate) fn to_png(input: &Path, out: &Path) -> Result<(), ConversionError> {
    let img = open(input)?;
    img.save_with_format(out, ImageFormat::Png)
        .map_err(ConversionError::library)
}

/// Re-encode in the input's own format: lossy JPEG, or PNG at maximum deflate effort.
pub(crate) fn compress(input: &Path, ext: &str, out: &Path) -> Result<(), ConversionError> {
    let img = open(input)?;
    if is_jpeg(ext) {
        write_jpeg(&img, COMPRESS_JPEG_QUALITY, out)
    } else {
        write_png(&img, CompressionType::Best, out)
    }
}

/// Halve both dimensions (floor) with a Lanczos filter.
pub(crate) fn halve(input: &Path, ext: &str, out: &Path) -> Result<(), ConversionError> {
    let img = open(input)?;
    let (w, h) = img.dimensions();
    let (nw, nh) = (w / 2, h / 2);
    if nw == 0 || nh == 0 {
        return Err(ConversionError::Library(format!(
            "image of {}x{} is too small to resize",
            w, h
        )));
    }
    let resized = img.resize_exact(nw, nh, FilterType::Lanczos3);
    debug!(from_w = w, from_h = h, to_w = nw, to_h = nh, "image resized");
    if is_jpeg(ext) {
        write_jpeg(&resized, CONVERT_JPEG_QUALITY, out)
    } else {
        write_png(&resized, CompressionType::Default, out)
    }
}

/// Make every near-white pixel fully transparent. Output is always PNG.
pub(crate) fn remove_background(input: &Path, out: &Path) -> Result<(), ConversionError> {
    let mut rgba = open(input)?.to_rgba8();
    let mut cleared = 0usize;
    for px in rgba.pixels_mut() {
        let Rgba([r, g, b, _]) = *px;
        if r > BACKGROUND_THRESHOLD && g > BACKGROUND_THRESHOLD && b > BACKGROUND_THRESHOLD {
            *px = Rgba([255, 255, 255, 0]);
            cleared += 1;
        }
    }
    debug!(cleared, "background pixels cleared");
    DynamicImage::ImageRgba8(rgba)
        .save_with_format(out, ImageFormat::Png)
        .map_err(ConversionError::library)
}

#[cfg(test)]
mod raster_tests {
    use super::*;
    use crate::convert::test_support::*;
    use crate::convert::Tool;

    #[test]
    fn png_to_jpg_flattens_transparency_onto_white() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(&dir);
        let src = upload(conv.areas(), "clear.png", &png(8, 6, [0, 0, 0, 0]));

        let res = conv.convert(Tool::PngToJpg, &[src]).unwrap();
        assert!(res.name.ends_with(".jpg"));
        let out = open(&res.path).unwrap();
        assert_eq!(out.dimensions(), (8, 6));
        let px = out.to_rgb8().get_pixel(3, 3).0;
        assert!(px.iter().all(|&c| c > 240));
    }

    #[test]
    fn jpg_to_png_keeps_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.jpg");
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 7, image::Rgb([40, 80, 120])));
        write_jpeg(&img, 90, &src).unwrap();
        let out = dir.path().join("out.png");

        to_png(&src, &out).unwrap();

        let decoded = image::open(&out).unwrap();
        assert_eq!(decoded.dimensions(), (10, 7));
    }

    #[test]
    fn compress_keeps_input_format() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(&dir);
        let src = upload(conv.areas(), "big.png", &png(32, 32, [1, 2, 3, 255]));

        let res = conv.convert(Tool::ImageCompressor, &[src]).unwrap();
        assert!(res.name.starts_with("compressed_"));
        assert!(res.name.ends_with(".png"));
        let bytes = std::fs::read(&res.path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn halve_floors_odd_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.png");
        std::fs::write(&src, png(101, 50, [9, 9, 9, 255])).unwrap();
        let out = dir.path().join("out.png");

        halve(&src, "png", &out).unwrap();
        assert_eq!(image::open(&out).unwrap().dimensions(), (50, 25));
    }

    #[test]
    fn halve_rejects_single_pixel_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.png");
        std::fs::write(&src, png(1, 10, [9, 9, 9, 255])).unwrap();

        let err = halve(&src, "png", &dir.path().join("out.png")).unwrap_err();
        assert!(matches!(err, ConversionError::Library(_)));
    }

    #[test]
    fn background_remover_clears_only_near_white() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.png");
        let mut img = image::RgbaImage::from_pixel(2, 1, Rgba([250, 240, 230, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        DynamicImage::ImageRgba8(img).save(&src).unwrap();
        let out = dir.path().join("out.png");

        remove_background(&src, &out).unwrap();

        let result = image::open(&out).unwrap().to_rgba8();
        assert_eq!(result.get_pixel(0, 0).0, [255, 255, 255, 0]);
        assert_eq!(result.get_pixel(1, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn background_remover_over_whole_images() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(&dir);

        let white = upload(conv.areas(), "white.png", &png(12, 9, [255, 255, 255, 255]));
        let res = conv.convert(Tool::BackgroundRemover, &[white]).unwrap();
        let cleared = open(&res.path).unwrap().to_rgba8();
        assert_eq!(cleared.dimensions(), (12, 9));
        assert!(cleared.pixels().all(|px| px.0[3] == 0));

        let black = upload(conv.areas(), "black.png", &png(12, 9, [0, 0, 0, 255]));
        let res = conv.convert(Tool::BackgroundRemover, &[black]).unwrap();
        let kept = open(&res.path).unwrap().to_rgba8();
        assert!(kept.pixels().all(|px| px.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn png_to_jpg_to_png_keeps_odd_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(&dir);
        let src = upload(conv.areas(), "odd.png", &png(33, 17, [200, 30, 60, 255]));

        let jpg = conv.convert(Tool::PngToJpg, &[src]).unwrap();
        let jpg_bytes = std::fs::read(&jpg.path).unwrap();
        assert_eq!(image::guess_format(&jpg_bytes).unwrap(), ImageFormat::Jpeg);
        let back = upload(conv.areas(), "odd.jpg", &jpg_bytes);

        let res = conv.convert(Tool::JpgToPng, &[back]).unwrap();
        assert!(res.name.ends_with(".png"));
        let bytes = std::fs::read(&res.path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
        assert_eq!(open(&res.path).unwrap().dimensions(), (33, 17));
    }

    #[test]
    fn undecodable_image_is_a_library_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("bad.png");
        std::fs::write(&src, b"definitely not a png").unwrap();
        let err = to_jpeg(&src, &dir.path().join("o.jpg")).unwrap_err();
        assert!(matches!(err, ConversionError::Library(_)));
    }
}
