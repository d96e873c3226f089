//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use everythingpdf_core::{RawInput, Session};
use everythingpdf_shared::MemoryStore;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};

/// A PDF with `pages` empty pages of `width` × 792 points.
pub fn pdf_bytes(pages: usize, width: i64) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            let content_id = doc.add_object(Stream::new(Dictionary::new(), b"0 0 1 1 re".to_vec()));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(width),
                    Object::Integer(792),
                ],
                "Contents" => content_id,
            })
            .into()
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("serialize fixture pdf");
    out
}

/// A one-page PDF whose trailer declares standard-handler encryption.
pub fn encrypted_pdf_bytes() -> Vec<u8> {
    let mut doc = Document::load_mem(&pdf_bytes(1, 612)).expect("fixture pdf parses");
    doc.trailer.set(
        "Encrypt",
        dictionary! {
            "Filter" => "Standard",
            "V" => Object::Integer(1),
            "R" => Object::Integer(2),
            "O" => Object::string_literal(vec![0x4Fu8; 32]),
            "U" => Object::string_literal(vec![0x55u8; 32]),
            "P" => Object::Integer(-4),
        },
    );
    doc.trailer.set(
        "ID",
        vec![
            Object::string_literal(vec![0x11u8; 16]),
            Object::string_literal(vec![0x11u8; 16]),
        ],
    );
    let mut out = Vec::new();
    doc.save_to(&mut out).expect("serialize encrypted fixture");
    out
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Jpeg)
}

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, format)
        .expect("encode fixture image");
    out.into_inner()
}

pub fn pdf_input(name: &str, pages: usize) -> RawInput {
    RawInput::from_bytes(name, "application/pdf", pdf_bytes(pages, 612))
}

pub fn pdf_input_with_width(name: &str, width: i64) -> RawInput {
    RawInput::from_bytes(name, "application/pdf", pdf_bytes(1, width))
}

pub fn png_input(name: &str, width: u32, height: u32) -> RawInput {
    RawInput::from_bytes(name, "image/png", png_bytes(width, height))
}

pub async fn free_session() -> Session {
    Session::open(Arc::new(MemoryStore::new()))
        .await
        .expect("open session")
}

pub async fn pro_session() -> Session {
    let mut session = free_session().await;
    session.upgrade().await.expect("upgrade");
    session
}

/// `[x0, y0, x1, y1]` for each page of `bytes`, as whole points.
pub fn media_boxes(bytes: &[u8]) -> Vec<[i64; 4]> {
    let doc = Document::load_mem(bytes).expect("output parses");
    doc.get_pages()
        .into_values()
        .map(|id| {
            let page = doc.get_dictionary(id).expect("page dict");
            let arr = page
                .get(b"MediaBox")
                .and_then(Object::as_array)
                .expect("MediaBox");
            let n: Vec<i64> = arr
                .iter()
                .map(|o| match o {
                    Object::Integer(i) => *i,
                    Object::Real(r) => *r as i64,
                    other => panic!("unexpected MediaBox entry {other:?}"),
                })
                .collect();
            [n[0], n[1], n[2], n[3]]
        })
        .collect()
}

pub fn temp_path(file: &str) -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("everythingpdf-it-{}", uuid::Uuid::now_v7()))
        .join(file)
}
