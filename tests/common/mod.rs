//! Fixtures shared by the integration tests.
#![allow(dead_code)]

pub mod fake_meili;

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::time::{Duration, SystemTime};

use docsync::config::{Config, StorageConfig};
use docsync::scanner::mtime_secs;

/// Minimal PDF whose only page shows `phrase`.
/// Offsets in the xref table are computed as the body is written.
pub fn pdf_with_text(phrase: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    let mut offsets = Vec::new();

    out.extend_from_slice(b"%PDF-1.4\n");
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!("<< /Length {} >>\nstream\n{}\nendstream", stream.len(), stream),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

/// Bytes that claim to be a PDF and are not.
pub fn broken_pdf() -> Vec<u8> {
    b"%PDF-1.4\nthis is not a pdf body\n%%EOF\n".to_vec()
}

/// Single-chapter EPUB holding one paragraph per entry of `paragraphs`.
pub fn epub_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<p>{}</p>", p))
        .collect();
    let chapter = format!(
        "<?xml version=\"1.0\"?><html xmlns=\"http://www.w3.org/1999/xhtml\">\
         <head><title>t</title><style>p {{ color: red }}</style></head><body>{}</body></html>",
        body
    );
    let entries = [
        ("mimetype", "application/epub+zip".to_string()),
        (
            "META-INF/container.xml",
            "<?xml version=\"1.0\"?><container version=\"1.0\" \
             xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\"><rootfiles>\
             <rootfile full-path=\"OEBPS/book.opf\" media-type=\"application/oebps-package+xml\"/>\
             </rootfiles></container>"
                .to_string(),
        ),
        (
            "OEBPS/book.opf",
            "<?xml version=\"1.0\"?><package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\">\
             <manifest><item id=\"ch1\" href=\"ch1.xhtml\" media-type=\"application/xhtml+xml\"/></manifest>\
             <spine><itemref idref=\"ch1\"/></spine></package>"
                .to_string(),
        ),
        ("OEBPS/ch1.xhtml", chapter),
    ];

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
        for (name, content) in entries {
            zip.start_file(name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

/// Writes `bytes` to `dir/name` and pins its mtime to `secs` after the epoch.
pub fn write_file(dir: &Path, name: &str, bytes: &[u8], secs: u64) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, bytes).unwrap();
    set_mtime(&path, secs);
}

pub fn set_mtime(path: &Path, secs: u64) {
    let file = fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

/// The mtime the scanner will record for `path`.
pub fn disk_mtime(path: &Path) -> f64 {
    mtime_secs(fs::metadata(path).unwrap().modified().ok())
}

/// Defaults, rooted at `root`, with no pause between chunks.
pub fn config_for(root: &Path) -> Config {
    let mut config = Config {
        storage: StorageConfig {
            root: root.to_path_buf(),
            ..StorageConfig::default()
        },
        ..Config::default()
    };
    config.search.batch_pause_ms = 0;
    config
}
