//! Format-specific text extraction for plain text, PDF, and EPUB files.
//!
//! Each supported format is a [`DocumentFormat`] variant selected by file
//! extension; all variants share the same bytes-in, text-out contract and
//! report failures as [`ExtractError`] so the caller can skip the file and
//! carry on with the rest of the run. Unsupported extensions are not an
//! error: [`ContentExtractor::extract`] returns `Ok(None)` for them.

use std::borrow::Cow;
use std::io::{Cursor, Read};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use quick_xml::escape::resolve_html5_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;

use crate::config::ExtractConfig;
use crate::error::ExtractError;
use crate::models::{Document, LocalFile};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_ZIP_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Media types treated as EPUB content documents.
const CONTENT_DOCUMENT_TYPES: [&str; 2] = ["application/xhtml+xml", "text/html"];

// ═══════════════════════════════════════════════════════════════════════
// Formats
// ═══════════════════════════════════════════════════════════════════════

/// A document format docsync knows how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    Pdf,
    Epub,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 3] = [
        DocumentFormat::PlainText,
        DocumentFormat::Pdf,
        DocumentFormat::Epub,
    ];

    /// Lower-case file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            DocumentFormat::PlainText => "txt",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Epub => "epub",
        }
    }

    /// Picks the format for `path` by extension, ignoring case.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }

    /// Extracts raw (untrimmed) text from the file's bytes.
    pub fn extract(self, bytes: &[u8], encodings: &[TextEncoding]) -> Result<String, ExtractError> {
        match self {
            DocumentFormat::PlainText => decode_text(bytes, encodings).map(|(text, _)| text),
            DocumentFormat::Pdf => extract_pdf(bytes),
            DocumentFormat::Epub => extract_epub(bytes),
        }
    }
}

/// Returns true if some [`DocumentFormat`] handles `path`.
pub fn is_supported(path: &Path) -> bool {
    DocumentFormat::from_path(path).is_some()
}

// ═══════════════════════════════════════════════════════════════════════
// Extractor
// ═══════════════════════════════════════════════════════════════════════

/// Turns files into document text.
///
/// Cheap to clone; the orchestrator hands one copy to each extraction task.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    encodings: Vec<TextEncoding>,
}

impl ContentExtractor {
    pub fn new(config: &ExtractConfig) -> Self {
        Self::with_encodings(config.encodings.clone())
    }

    pub fn with_encodings(encodings: Vec<TextEncoding>) -> Self {
        Self { encodings }
    }

    /// Extracts trimmed text from `path`.
    ///
    /// Returns `Ok(None)` when no format applies to the file's extension.
    /// Text that is empty after trimming is reported as [`ExtractError::Empty`].
    pub fn extract(&self, path: &Path) -> Result<Option<String>, ExtractError> {
        let Some(format) = DocumentFormat::from_path(path) else {
            return Ok(None);
        };
        let bytes = std::fs::read(path)?;
        let text = format.extract(&bytes, &self.encodings)?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ExtractError::Empty);
        }
        Ok(Some(trimmed.to_string()))
    }

    /// Extracts `file` and stamps the result with its mtime and the current time.
    pub fn extract_document(&self, file: &LocalFile) -> Result<Option<Document>, ExtractError> {
        let content = self.extract(&file.path)?;
        Ok(content.map(|content| Document {
            id: file.id.clone(),
            content,
            file_mtime: file.mtime,
            indexed_at: now_secs(),
        }))
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

// ═══════════════════════════════════════════════════════════════════════
// Plain text
// ═══════════════════════════════════════════════════════════════════════

/// A candidate encoding for plain-text files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum TextEncoding {
    Utf8,
    Windows1251,
    Latin1,
}

impl TextEncoding {
    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Windows1251 => "windows-1251",
            TextEncoding::Latin1 => "latin-1",
        }
    }

    /// Decodes `bytes`, or returns `None` if they are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => {
                let (text, had_errors) = encoding_rs::UTF_8.decode_with_bom_removal(bytes);
                (!had_errors).then(|| text.into_owned())
            }
            TextEncoding::Windows1251 => encoding_rs::WINDOWS_1251
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(Cow::into_owned),
            // ISO-8859-1 maps every byte to the code point of the same value.
            TextEncoding::Latin1 => Some(bytes.iter().copied().map(char::from).collect()),
        }
    }
}

impl TryFrom<String> for TextEncoding {
    type Error = String;

    fn try_from(label: String) -> Result<Self, Self::Error> {
        match label.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "windows-1251" | "cp1251" => Ok(TextEncoding::Windows1251),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            _ => Err(format!(
                "unknown text encoding '{}'. Must be utf-8, windows-1251, or latin-1.",
                label
            )),
        }
    }
}

/// Decodes `bytes` with the first candidate that accepts them, in order.
pub fn decode_text(
    bytes: &[u8],
    encodings: &[TextEncoding],
) -> Result<(String, TextEncoding), ExtractError> {
    for &encoding in encodings {
        if let Some(text) = encoding.decode(bytes) {
            return Ok((text, encoding));
        }
        tracing::trace!(encoding = encoding.label(), "decode attempt failed");
    }
    Err(ExtractError::Encoding {
        tried: encodings.iter().map(|e| e.label()).collect(),
    })
}

// ═══════════════════════════════════════════════════════════════════════
// PDF
// ═══════════════════════════════════════════════════════════════════════

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    let result = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)))
        .map_err(|_| ExtractError::Format("PDF parser aborted on malformed input".to_string()))?;

    result.map_err(|e| match e {
        pdf_extract::OutputError::PdfError(err) => ExtractError::Format(err.to_string()),
        other => ExtractError::Io(other.to_string()),
    })
}

// ═══════════════════════════════════════════════════════════════════════
// EPUB
// ═══════════════════════════════════════════════════════════════════════

type EpubArchive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn extract_epub(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(zip_error)?;

    let container = read_zip_entry_bounded(&mut archive, CONTAINER_PATH)?;
    let package_path = find_package_path(&container)?;
    let package = read_zip_entry_bounded(&mut archive, &package_path)?;

    let mut sections = Vec::new();
    for name in content_documents(&package, &package_path)? {
        let xhtml = read_zip_entry_bounded(&mut archive, &name)?;
        let text = xhtml_text(&xhtml)?;
        if !text.is_empty() {
            sections.push(text);
        }
    }
    Ok(sections.join("\n\n"))
}

fn zip_error(e: zip::result::ZipError) -> ExtractError {
    match e {
        zip::result::ZipError::Io(io) => ExtractError::Io(io.to_string()),
        other => ExtractError::Format(other.to_string()),
    }
}

fn read_zip_entry_bounded(archive: &mut EpubArchive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive.by_name(name).map_err(|e| match e {
        zip::result::ZipError::FileNotFound => {
            ExtractError::Format(format!("missing archive entry {}", name))
        }
        other => zip_error(other),
    })?;
    let mut out = Vec::new();
    entry.take(MAX_ZIP_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_ZIP_ENTRY_BYTES {
        return Err(ExtractError::Format(format!(
            "archive entry {} exceeds size limit ({} bytes)",
            name, MAX_ZIP_ENTRY_BYTES
        )));
    }
    Ok(out)
}

fn xml_error(e: quick_xml::Error) -> ExtractError {
    ExtractError::Format(e.to_string())
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, ExtractError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ExtractError::Format(err.to_string()))?;
        if attr.key.local_name().as_ref() == name {
            let value = attr.unescape_value().map_err(xml_error)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Reads the package document path from `META-INF/container.xml`.
fn find_package_path(container: &[u8]) -> Result<String, ExtractError> {
    let mut reader = Reader::from_reader(container);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(path) = attribute(&e, b"full-path")? {
                    return Ok(path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Err(ExtractError::Format(
        "container.xml does not name a package document".to_string(),
    ))
}

struct ManifestItem {
    id: String,
    href: String,
    media_type: String,
}

/// Lists the archive paths of the package's content documents in reading order.
///
/// Spine order comes first; content documents the spine does not reference
/// follow in manifest order.
fn content_documents(package: &[u8], package_path: &str) -> Result<Vec<String>, ExtractError> {
    let mut manifest = Vec::new();
    let mut spine = Vec::new();

    let mut reader = Reader::from_reader(package);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"item" => {
                    if let (Some(id), Some(href)) = (attribute(&e, b"id")?, attribute(&e, b"href")?) {
                        let media_type = attribute(&e, b"media-type")?.unwrap_or_default();
                        manifest.push(ManifestItem {
                            id,
                            href,
                            media_type,
                        });
                    }
                }
                b"itemref" => {
                    if let Some(idref) = attribute(&e, b"idref")? {
                        spine.push(idref);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let documents: Vec<&ManifestItem> = manifest
        .iter()
        .filter(|item| CONTENT_DOCUMENT_TYPES.contains(&item.media_type.as_str()))
        .collect();

    let mut ordered: Vec<&ManifestItem> = Vec::with_capacity(documents.len());
    for idref in &spine {
        if let Some(item) = documents.iter().find(|item| &item.id == idref) {
            if !ordered.iter().any(|seen| seen.id == item.id) {
                ordered.push(item);
            }
        }
    }
    for item in &documents {
        if !ordered.iter().any(|seen| seen.id == item.id) {
            ordered.push(item);
        }
    }

    let base = package_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    Ok(ordered
        .into_iter()
        .map(|item| resolve_href(base, &item.href))
        .collect())
}

/// Resolves a manifest `href` against the package directory into an archive path.
fn resolve_href(base: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let href = percent_decode(href);
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn percent_decode(s: &str) -> Cow<'_, str> {
    if !s.contains('%') {
        return Cow::Borrowed(s);
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(byte) = s.get(i + 1..i + 3).and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    Cow::Owned(String::from_utf8_lossy(&out).into_owned())
}

fn is_skipped_element(name: &[u8]) -> bool {
    name.eq_ignore_ascii_case(b"script") || name.eq_ignore_ascii_case(b"style")
}

/// Collects the visible text of an XHTML document, one text node per line.
fn xhtml_text(xhtml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = Reader::from_reader(xhtml);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;

    let mut lines: Vec<String> = Vec::new();
    let mut skip_depth = 0usize;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if is_skipped_element(e.local_name().as_ref()) {
                    skip_depth += 1;
                }
            }
            Ok(Event::End(e)) => {
                if skip_depth > 0 && is_skipped_element(e.local_name().as_ref()) {
                    skip_depth -= 1;
                }
            }
            Ok(Event::Text(te)) if skip_depth == 0 => {
                let text = te
                    .unescape_with(resolve_html5_entity)
                    .map(Cow::into_owned)
                    .unwrap_or_else(|_| String::from_utf8_lossy(&te).into_owned());
                push_line(&mut lines, &text);
            }
            Ok(Event::CData(cd)) if skip_depth == 0 => {
                push_line(&mut lines, &String::from_utf8_lossy(&cd));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(lines.join("\n"))
}

fn push_line(lines: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        lines.push(text.to_string());
    }
}
