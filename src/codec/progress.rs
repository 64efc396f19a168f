use once_cell::sync::Lazy;
use regex::Regex;

/// Fallback used whenever a failure carries no readable text.
pub const GENERIC_FAILURE: &str = "Processing failed.";

static PROCESSING_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)PROCESSING LIST #\s*(\d+)").expect("valid regex"));
static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Reference:\s*([A-Z0-9]+)\b").expect("valid regex"));
static ERROR_PROCESSING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Error processing list #\s*(\d+)\s*:\s*(.+)$").expect("valid regex")
});
static FAILED_SUMMARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*List #\s*(\d+)\s*:\s*(.+)\s*$").expect("valid regex"));

/// One classified line of processor output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// `PROCESSING LIST #n`: position `n` (1-based) is now being submitted.
    ProcessingAnnounced(usize),
    /// `Reference: X`: the current position succeeded.
    Success(String),
    /// `Error processing list #n: reason` or `List #n: reason`.
    Failed(usize, String),
    Opaque(String),
}

/// Classifies a raw output line. Failure shapes are tried first because
/// `Error processing list #n` also contains an announcement.
pub fn classify_line(line: &str) -> ProgressEvent {
    let line = line.trim();

    for pattern in [&*ERROR_PROCESSING, &*FAILED_SUMMARY] {
        if let Some((position, reason)) = pattern.captures(line).and_then(|caps| {
            let position = caps[1].parse().ok()?;
            Some((position, caps[2].trim().to_owned()))
        }) {
            return ProgressEvent::Failed(position, reason);
        }
    }

    if let Some(position) = PROCESSING_LIST
        .captures(line)
        .and_then(|caps| caps[1].parse().ok())
    {
        return ProgressEvent::ProcessingAnnounced(position);
    }

    if let Some(caps) = REFERENCE.captures(line) {
        return ProgressEvent::Success(caps[1].trim().to_owned());
    }

    ProgressEvent::Opaque(line.to_owned())
}

/// First non-blank line across `lines`, trimmed, or [`GENERIC_FAILURE`].
pub fn first_meaningful_line<'a>(lines: impl IntoIterator<Item = &'a str>) -> String {
    lines
        .into_iter()
        .flat_map(str::lines)
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or(GENERIC_FAILURE)
        .to_owned()
}
