//! Page-by-page PDF text extraction through poppler's `pdfinfo` and
//! `pdftotext` binaries.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, anyhow};
use tracing::{debug, warn};

use super::{
    ExtractLimits, ExtractStats, SinkControl, append_bounded, extraction_failed, flush_then_fail,
};
use crate::Result;

const PDFINFO_BIN: &str = "pdfinfo";
const PDFTOTEXT_BIN: &str = "pdftotext";

pub(crate) fn extract_pdf<F>(
    path: &Path,
    limits: &ExtractLimits,
    mut sink: F,
) -> Result<ExtractStats>
where
    F: FnMut(&str) -> Result<SinkControl>,
{
    let pages = page_count(path).map_err(|e| extraction_failed(path, &format!("{e:#}")))?;
    debug!("{} has {} pages", path.display(), pages);

    let mut stats = ExtractStats::default();
    let mut buffer = String::new();

    for page in 1..=pages {
        let text = match page_text(path, page) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                debug!("Page {} of {} has no text", page, path.display());
                stats.pages_skipped += 1;
                continue;
            }
            Err(e) => {
                warn!("Skipping page {} of {}: {:#}", page, path.display(), e);
                stats.pages_skipped += 1;
                continue;
            }
        };
        stats.bytes_read += text.len();

        if let Err(error) = append_bounded(&mut buffer, &text, path)
            .and_then(|()| append_bounded(&mut buffer, "\n", path))
        {
            return flush_then_fail(&buffer, &mut stats, &mut sink, path, error);
        }

        if buffer.len() >= limits.pdf_flush_bytes {
            stats.segments += 1;
            if sink(&buffer)? == SinkControl::Stop {
                stats.stopped_early = true;
                return Ok(stats);
            }
            buffer.clear();
        }
    }

    if !buffer.is_empty() {
        stats.segments += 1;
        sink(&buffer)?;
    }

    Ok(stats)
}

fn page_count(path: &Path) -> anyhow::Result<usize> {
    let output = Command::new(PDFINFO_BIN)
        .arg(path)
        .output()
        .with_context(|| format!("{PDFINFO_BIN} failed to start (is poppler installed?)"))?;

    if !output.status.success() {
        return Err(anyhow!(
            "{PDFINFO_BIN} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    parse_page_count(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| anyhow!("{PDFINFO_BIN} output has no page count"))
}

/// Reads the `Pages:` line of `pdfinfo` output.
pub(crate) fn parse_page_count(info: &str) -> Option<usize> {
    info.lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|value| value.trim().parse().ok())
}

fn page_text(path: &Path, page: usize) -> anyhow::Result<String> {
    let page = page.to_string();
    let output = Command::new(PDFTOTEXT_BIN)
        .args(["-f", page.as_str(), "-l", page.as_str(), "-enc", "UTF-8"])
        .arg(path)
        .arg("-")
        .output()
        .with_context(|| format!("{PDFTOTEXT_BIN} failed to start"))?;

    if !output.status.success() {
        return Err(anyhow!(
            "{PDFTOTEXT_BIN} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    // Page breaks come out as form feeds
    Ok(String::from_utf8_lossy(&output.stdout).replace('\u{c}', "\n"))
}
