//! Map SoX exit codes to user-friendly messages.
//!
//! SoX exits with 1 for command-line problems and 2 for failures while
//! processing. -1 is used for spawn failure. Stderr is kept as detail.

use serde::Serialize;

/// Payload for error events. Front ends show summary; detail is expandable.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoxErrorPayload {
    pub summary: String,
    pub detail: String,
}

/// Maps a SoX exit code to a short summary. Stderr is passed through as detail.
pub fn parse_sox_error(stderr: &str, exit_code: Option<i32>) -> SoxErrorPayload {
    let summary = match exit_code {
        Some(code) => known_exit_code_summary(code)
            .unwrap_or_else(|| format!("SoX failed (exit code {}).", code)),
        None => first_line_truncated(stderr, 120),
    };
    let detail = stderr.trim().to_string();
    SoxErrorPayload { summary, detail }
}

fn known_exit_code_summary(code: i32) -> Option<String> {
    match code {
        -1 => Some("SoX not found or failed to start.".into()),
        1 => Some("Invalid SoX command line.".into()),
        2 => Some("SoX failed while processing audio.".into()),
        _ => None,
    }
}

const ELLIPSIS: &str = "…";

fn first_line_truncated(stderr: &str, max_len: usize) -> String {
    let first = stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if first.len() <= max_len {
        return first.to_string();
    }
    let mut cut = max_len.saturating_sub(ELLIPSIS.len());
    while !first.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &first[..cut], ELLIPSIS)
}
