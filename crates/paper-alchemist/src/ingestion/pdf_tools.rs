//! Local PDF tooling (poppler-utils + tesseract)
//!
//! - pdftotext: text layer extraction
//! - pdftoppm: first-page preview and OCR rasterization
//! - tesseract: OCR
//!
//! Tool runs are async children spawned with `kill_on_drop`, so a caller that
//! times out and drops the future also stops the process.

use std::path::Path;
use std::process::{Command as StdCommand, Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Check if pdftotext is available
pub fn has_pdftotext() -> bool {
    StdCommand::new("pdftotext")
        .arg("-v")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check if pdftoppm is available
pub fn has_pdftoppm() -> bool {
    StdCommand::new("pdftoppm")
        .arg("-v")
        .output()
        .map(|_| true) // prints its version on stderr
        .unwrap_or(false)
}

/// Check if tesseract is available
pub fn has_tesseract() -> bool {
    StdCommand::new("tesseract")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run a tool to completion, optionally feeding `input` on stdin.
/// Fails with the tool's stderr on a non-zero exit.
async fn run_tool(tool: &str, mut command: Command, input: Option<&[u8]>) -> Result<Output> {
    command
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| Error::ocr(format!("Failed to spawn {}: {}", tool, e)))?;

    if let (Some(data), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin
            .write_all(data)
            .await
            .map_err(|e| Error::ocr(format!("Failed to write to {}: {}", tool, e)))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| Error::ocr(format!("{} failed: {}", tool, e)))?;

    if !output.status.success() {
        return Err(Error::ocr(format!(
            "{} error: {}",
            tool,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(output)
}

/// Extract the embedded text layer
///
/// Uses pdftotext when installed, otherwise (or on failure) pdf-extract.
/// An empty string is a valid result for image-only PDFs.
pub async fn extract_text_layer(data: Vec<u8>) -> Result<String> {
    if has_pdftotext() {
        match pdftotext(&data).await {
            Ok(text) => return Ok(text),
            Err(e) => tracing::warn!("pdftotext failed, falling back to pdf-extract: {}", e),
        }
    }

    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&data))
        .await
        .map_err(|e| Error::internal(format!("Text extraction task panicked: {}", e)))?
        .map_err(|e| Error::ocr(format!("Text layer extraction failed: {}", e)))
}

async fn pdftotext(data: &[u8]) -> Result<String> {
    let mut command = Command::new("pdftotext");
    command.args([
        "-layout",       // Maintain original layout
        "-nopgbrk",      // Don't insert page breaks
        "-enc", "UTF-8", // Output encoding
        "-",             // Read from stdin
        "-",             // Write to stdout
    ]);

    let output = run_tool("pdftotext", command, Some(data)).await?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Render page 1 to PNG bytes
pub async fn render_first_page(data: &[u8], dpi: u32) -> Result<Vec<u8>> {
    if !has_pdftoppm() {
        return Err(Error::ocr("Preview rendering requires pdftoppm (poppler-utils)"));
    }

    let dir = tempfile::tempdir()?;
    let pdf_path = dir.path().join("input.pdf");
    tokio::fs::write(&pdf_path, data).await?;

    let prefix = dir.path().join("preview");
    let mut command = Command::new("pdftoppm");
    command
        .args(["-png", "-singlefile", "-f", "1", "-l", "1", "-r", &dpi.to_string()])
        .arg(&pdf_path)
        .arg(&prefix);
    run_tool("pdftoppm", command, None).await?;

    let png = tokio::fs::read(prefix.with_extension("png"))
        .await
        .map_err(|e| Error::ocr(format!("pdftoppm produced no image: {}", e)))?;
    Ok(png)
}

/// OCR every page: rasterize with pdftoppm, recognize with tesseract
pub async fn ocr_pdf(data: &[u8], dpi: u32, languages: &str) -> Result<String> {
    if !has_pdftoppm() || !has_tesseract() {
        return Err(Error::ocr(
            "OCR requires pdftoppm and tesseract. Install with: apt install poppler-utils tesseract-ocr",
        ));
    }

    let dir = tempfile::tempdir()?;
    let pdf_path = dir.path().join("input.pdf");
    tokio::fs::write(&pdf_path, data).await?;

    let mut command = Command::new("pdftoppm");
    command
        .args(["-png", "-r", &dpi.to_string()])
        .arg(&pdf_path)
        .arg(dir.path().join("page"));
    run_tool("pdftoppm", command, None).await?;

    let mut pages = Vec::new();
    let mut entries = tokio::fs::read_dir(dir.path()).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "png") {
            pages.push(path);
        }
    }
    pages.sort();

    if pages.is_empty() {
        return Err(Error::ocr("pdftoppm produced no images"));
    }

    let mut text = String::new();
    for (i, page) in pages.iter().enumerate() {
        match tesseract(page, languages).await {
            Ok(page_text) if !page_text.trim().is_empty() => {
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(page_text.trim_end());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("tesseract failed on page {}: {}", i + 1, e),
        }
    }

    if text.trim().is_empty() {
        return Err(Error::ocr("OCR produced no text"));
    }

    tracing::info!("OCR extracted {} characters from {} pages", text.len(), pages.len());
    Ok(text)
}

async fn tesseract(image: &Path, languages: &str) -> Result<String> {
    let mut command = Command::new("tesseract");
    command.arg(image).args(["stdout", "-l", languages]);

    let output = run_tool("tesseract", command, None).await?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
