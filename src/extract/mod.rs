//! Text extraction and chunking for contract documents.
//!
//! PDFs go through `pdftotext -layout`, which separates pages with form
//! feeds. Every page becomes one chunk, and pages longer than the configured
//! limit are split further at paragraph, line, then word boundaries.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use thiserror::Error;

/// Default upper bound on chunk size in bytes.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 8000;

const PAGE_BREAK: char = '\x0c';

/// Errors that can occur during text extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle command output, extracting stdout on success or returning appropriate error.
fn handle_cmd_output(
    result: std::io::Result<std::process::Output>,
    tool_name: &str,
    error_prefix: &str,
) -> Result<String, ExtractionError> {
    match result {
        Ok(output) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ExtractionError::ExtractionFailed(format!(
                    "{}: {}",
                    error_prefix,
                    stderr.trim()
                )))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ExtractionError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(ExtractionError::Io(e)),
    }
}

/// One unit of text sent to the categorizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// 1-based position in the document.
    pub index: usize,
    /// 1-based source page.
    pub page: usize,
    /// 1-based part number when a page was split.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<usize>,
    pub text: String,
}

impl Chunk {
    /// File name the chunk is stored under, e.g. `page_03.txt` or `page_03_2.txt`.
    pub fn file_name(&self) -> String {
        match self.part {
            Some(part) => format!("page_{:02}_{}.txt", self.page, part),
            None => format!("page_{:02}.txt", self.page),
        }
    }
}

/// Split extracted text into pages on form feeds.
///
/// `pdftotext` ends the last page with a form feed too, so a trailing empty
/// page is dropped.
pub fn split_pages(text: &str) -> Vec<&str> {
    let mut pages: Vec<&str> = text.split(PAGE_BREAK).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

/// Largest char boundary at or below `index`.
fn floor_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Split a page into pieces of at most `max_chars` bytes.
///
/// Cuts prefer a blank line, then a newline, then whitespace within the
/// window; text with none of those is cut at the last char boundary.
pub fn chunk_page(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut pieces = Vec::new();
    let mut rest = text.trim();

    while rest.len() > max_chars {
        let window_end = floor_boundary(rest, max_chars);
        let window = &rest[..window_end];

        let cut = window
            .rfind("\n\n")
            .or_else(|| window.rfind('\n'))
            .or_else(|| window.rfind(char::is_whitespace))
            .filter(|&i| i > 0)
            .unwrap_or(window_end);

        // A multi-byte char wider than the window still has to go somewhere.
        let cut = if cut == 0 {
            rest.chars().next().map_or(rest.len(), char::len_utf8)
        } else {
            cut
        };

        let piece = rest[..cut].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        rest = rest[cut..].trim_start();
    }

    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Turn extracted document text into numbered chunks.
///
/// Blank pages produce no chunk.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for (page_idx, page) in split_pages(text).into_iter().enumerate() {
        let pieces = chunk_page(page, max_chars);
        let split = pieces.len() > 1;
        for (part_idx, piece) in pieces.into_iter().enumerate() {
            chunks.push(Chunk {
                index: chunks.len() + 1,
                page: page_idx + 1,
                part: split.then_some(part_idx + 1),
                text: piece,
            });
        }
    }
    chunks
}

/// Write chunks to `dir`, one text file each.
///
/// Chunk files from an earlier split of the same document are removed
/// first, so a re-split with a different chunk size leaves no strays.
pub fn write_chunks(dir: &Path, chunks: &[Chunk]) -> Result<Vec<PathBuf>, ExtractionError> {
    std::fs::create_dir_all(dir)?;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("page_") && name.ends_with(".txt") && entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())?;
        }
    }
    let mut paths = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let path = dir.join(chunk.file_name());
        std::fs::write(&path, &chunk.text)?;
        paths.push(path);
    }
    tracing::debug!("Wrote {} chunks to {}", chunks.len(), dir.display());
    Ok(paths)
}

/// Text extractor that uses external tools.
#[derive(Debug, Clone)]
pub struct TextExtractor {
    max_chunk_chars: usize,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }
}

impl TextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chunk size limit.
    pub fn with_max_chunk_chars(mut self, max_chars: usize) -> Self {
        self.max_chunk_chars = max_chars;
        self
    }

    pub fn max_chunk_chars(&self) -> usize {
        self.max_chunk_chars
    }

    /// Extract a document and chunk it.
    ///
    /// PDFs are read with `pdftotext`; `.txt` files are read directly, with
    /// form feeds as page breaks.
    pub fn extract(&self, file_path: &Path) -> Result<Vec<Chunk>, ExtractionError> {
        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let text = match ext.as_str() {
            "pdf" => self.run_pdftotext(file_path)?,
            "txt" => std::fs::read_to_string(file_path)?,
            other => {
                return Err(ExtractionError::UnsupportedFileType(if other.is_empty() {
                    file_path.display().to_string()
                } else {
                    other.to_string()
                }))
            }
        };

        let chunks = chunk_text(&text, self.max_chunk_chars);
        if chunks.is_empty() {
            return Err(ExtractionError::ExtractionFailed(format!(
                "No text found in {}",
                file_path.display()
            )));
        }

        tracing::info!(
            "Extracted {} chunks from {}",
            chunks.len(),
            file_path.display()
        );
        Ok(chunks)
    }

    /// Run pdftotext on a PDF file.
    fn run_pdftotext(&self, file_path: &Path) -> Result<String, ExtractionError> {
        let output = Command::new("pdftotext")
            .args(["-layout", "-enc", "UTF-8"])
            .arg(file_path)
            .arg("-")
            .output();

        handle_cmd_output(output, "pdftotext (install poppler-utils)", "pdftotext failed")
    }

    /// Get the page count of a PDF.
    pub fn get_pdf_page_count(&self, file_path: &Path) -> Option<u32> {
        let output = Command::new("pdfinfo").arg(file_path).output().ok()?;

        if !output.status.success() {
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .find(|line| line.starts_with("Pages:"))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
    }

    /// Check if required tools are available.
    pub fn check_tools() -> Vec<(String, bool)> {
        ["pdftotext", "pdfinfo"]
            .iter()
            .map(|tool| (tool.to_string(), which::which(tool).is_ok()))
            .collect()
    }
}
