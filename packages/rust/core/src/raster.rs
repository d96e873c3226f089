//! Raster decoding into PDF image XObjects.
//!
//! PNG and JPEG take separate paths. PNGs are decoded to 8-bit samples and
//! stored Flate-compressed, with alpha split into a soft mask. JPEGs are
//! validated by a full decode and then embedded as-is (`DCTDecode`) when
//! they are grayscale or RGB; anything else (CMYK, YCCK) is re-encoded as RGB.

use image::{DynamicImage, ImageFormat};
use lopdf::{Object, Stream, dictionary};

use everythingpdf_shared::ImageSubkind;

/// A decoded image ready to be added to a document.
pub(crate) struct EmbeddedImage {
    /// Native pixel width.
    pub width: u32,
    /// Native pixel height.
    pub height: u32,
    /// The image XObject (without `SMask`, which is linked on insertion).
    pub xobject: Stream,
    /// Optional alpha channel.
    pub soft_mask: Option<Stream>,
}

/// Decode `bytes` according to `subkind`.
pub(crate) fn decode(bytes: &[u8], subkind: ImageSubkind) -> Result<EmbeddedImage, String> {
    match subkind {
        ImageSubkind::Png => decode_png(bytes),
        ImageSubkind::Jpeg => decode_jpeg(bytes),
    }
}

fn decode_png(bytes: &[u8]) -> Result<EmbeddedImage, String> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| format!("invalid PNG image: {e}"))?;
    let (width, height) = (img.width(), img.height());
    let color = img.color();

    let soft_mask = if color.has_alpha() {
        let alpha: Vec<u8> = img.to_rgba8().pixels().map(|p| p.0[3]).collect();
        Some(flate_image(width, height, "DeviceGray", alpha)?)
    } else {
        None
    };

    let xobject = if color.has_color() {
        flate_image(width, height, "DeviceRGB", img.to_rgb8().into_raw())?
    } else {
        flate_image(width, height, "DeviceGray", img.to_luma8().into_raw())?
    };

    Ok(EmbeddedImage {
        width,
        height,
        xobject,
        soft_mask,
    })
}

fn decode_jpeg(bytes: &[u8]) -> Result<EmbeddedImage, String> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
        .map_err(|e| format!("invalid JPEG image: {e}"))?;
    let (width, height) = (img.width(), img.height());

    Ok(EmbeddedImage {
        width,
        height,
        xobject: jpeg_xobject(bytes, &img)?,
        soft_mask: None,
    })
}

/// Pass gray and RGB JPEGs through untouched; re-encode everything else.
fn jpeg_xobject(bytes: &[u8], img: &DynamicImage) -> Result<Stream, String> {
    let (width, height) = (img.width(), img.height());
    match jpeg_component_count(bytes) {
        Some(1) => Ok(dct_image(width, height, "DeviceGray", bytes)),
        Some(3) => Ok(dct_image(width, height, "DeviceRGB", bytes)),
        _ => reencode_rgb(img),
    }
}

fn reencode_rgb(img: &DynamicImage) -> Result<Stream, String> {
    flate_image(img.width(), img.height(), "DeviceRGB", img.to_rgb8().into_raw())
}

fn image_dict(width: u32, height: u32, color_space: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => Object::Integer(i64::from(width)),
        "Height" => Object::Integer(i64::from(height)),
        "ColorSpace" => Object::Name(color_space.as_bytes().to_vec()),
        "BitsPerComponent" => Object::Integer(8),
    }
}

fn flate_image(width: u32, height: u32, color_space: &str, samples: Vec<u8>) -> Result<Stream, String> {
    let mut stream = Stream::new(image_dict(width, height, color_space), samples);
    stream
        .compress()
        .map_err(|e| format!("failed to compress image samples: {e}"))?;
    Ok(stream)
}

fn dct_image(width: u32, height: u32, color_space: &str, jpeg: &[u8]) -> Stream {
    let mut dict = image_dict(width, height, color_space);
    dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    Stream::new(dict, jpeg.to_vec()).with_compression(false)
}

/// Number of colour components declared in the JPEG frame header (SOFn).
fn jpeg_component_count(bytes: &[u8]) -> Option<u8> {
    jpeg_component_offset(bytes).and_then(|at| bytes.get(at).copied())
}

/// Byte offset of the frame header's `Nf` field.
fn jpeg_component_offset(bytes: &[u8]) -> Option<usize> {
    if bytes.get(0..2) != Some(&[0xFF, 0xD8][..]) {
        return None;
    }

    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        // fill bytes and standalone markers carry no length
        if marker == 0xFF {
            i += 1;
            continue;
        }
        if marker == 0x01 || (0xD0..=0xD9).contains(&marker) {
            i += 2;
            continue;
        }

        let len = usize::from(u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]));
        let is_frame_header =
            (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame_header {
            // Lf(2) P(1) Y(2) X(2) Nf(1)
            return (i + 9 < bytes.len()).then_some(i + 9);
        }
        i += 2 + len;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage, Rgba};
    use std::io::Cursor;

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).expect("encode test image");
        out.into_inner()
    }

    fn name_of<'a>(stream: &'a Stream, key: &[u8]) -> &'a [u8] {
        match stream.dict.get(key).expect("key present") {
            Object::Name(n) => n.as_slice(),
            other => panic!("expected name, got {other:?}"),
        }
    }

    #[test]
    fn png_rgb_dimensions_and_colorspace() {
        let img = RgbImage::from_pixel(80, 60, Rgb([10, 20, 30]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);

        let embedded = decode(&bytes, ImageSubkind::Png).unwrap();
        assert_eq!((embedded.width, embedded.height), (80, 60));
        assert_eq!(name_of(&embedded.xobject, b"ColorSpace"), b"DeviceRGB");
        assert!(embedded.soft_mask.is_none());
    }

    #[test]
    fn png_alpha_gets_soft_mask() {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(4, 3, Rgba([255, 0, 0, 128]));
        let bytes = encode(DynamicImage::ImageRgba8(img), ImageFormat::Png);

        let embedded = decode(&bytes, ImageSubkind::Png).unwrap();
        let mask = embedded.soft_mask.expect("alpha channel becomes a soft mask");
        assert_eq!(name_of(&mask, b"ColorSpace"), b"DeviceGray");
    }

    #[test]
    fn png_grayscale_stays_gray() {
        let img = GrayImage::from_pixel(5, 5, Luma([200]));
        let bytes = encode(DynamicImage::ImageLuma8(img), ImageFormat::Png);

        let embedded = decode(&bytes, ImageSubkind::Png).unwrap();
        assert_eq!(name_of(&embedded.xobject, b"ColorSpace"), b"DeviceGray");
    }

    #[test]
    fn jpeg_is_passed_through_as_dct() {
        let img = RgbImage::from_pixel(32, 16, Rgb([0, 128, 255]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg);

        assert_eq!(jpeg_component_count(&bytes), Some(3));
        let embedded = decode(&bytes, ImageSubkind::Jpeg).unwrap();
        assert_eq!((embedded.width, embedded.height), (32, 16));
        assert_eq!(name_of(&embedded.xobject, b"Filter"), b"DCTDecode");
        assert_eq!(embedded.xobject.content, bytes);
    }

    #[test]
    fn jpeg_gray_is_passed_through_as_dct_gray() {
        let img = GrayImage::from_pixel(8, 8, Luma([90]));
        let bytes = encode(DynamicImage::ImageLuma8(img), ImageFormat::Jpeg);

        assert_eq!(jpeg_component_count(&bytes), Some(1));
        let embedded = decode(&bytes, ImageSubkind::Jpeg).unwrap();
        assert_eq!(name_of(&embedded.xobject, b"Filter"), b"DCTDecode");
        assert_eq!(name_of(&embedded.xobject, b"ColorSpace"), b"DeviceGray");
    }

    #[test]
    fn four_component_jpeg_is_reencoded_as_flate_rgb() {
        let img = RgbImage::from_pixel(12, 7, Rgb([40, 80, 160]));
        let mut bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg);
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).unwrap();

        // declare the frame as CMYK
        let at = jpeg_component_offset(&bytes).expect("frame header");
        bytes[at] = 4;
        assert_eq!(jpeg_component_count(&bytes), Some(4));

        let xobject = jpeg_xobject(&bytes, &decoded).unwrap();
        assert_eq!(name_of(&xobject, b"Filter"), b"FlateDecode");
        assert_eq!(name_of(&xobject, b"ColorSpace"), b"DeviceRGB");
        assert_ne!(xobject.content, bytes);

        let samples = xobject.get_plain_content().unwrap();
        assert_eq!(samples.len(), 12 * 7 * 3);
    }

    #[test]
    fn subkind_paths_are_distinct() {
        let img = RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]));
        let png = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);

        let err = decode(&png, ImageSubkind::Jpeg).err().expect("png is not a jpeg");
        assert!(err.contains("invalid JPEG"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode(b"definitely not an image", ImageSubkind::Png).is_err());
        assert_eq!(jpeg_component_count(b"nope"), None);
    }
}
