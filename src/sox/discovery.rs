use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

use crate::error::TranscodeError;

/// Environment variable that overrides executable discovery.
pub const SOX_PATH_ENV: &str = "SOX_PATH";

#[cfg(target_os = "windows")]
const LOOKUP_COMMAND: &str = "where";
#[cfg(not(target_os = "windows"))]
const LOOKUP_COMMAND: &str = "which";

fn find_in_path() -> Option<PathBuf> {
    let output = Command::new(LOOKUP_COMMAND).arg("sox").output().ok()?;
    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout);
        let first = path.lines().next()?.trim();
        if !first.is_empty() {
            return Some(PathBuf::from(first));
        }
    }
    None
}

fn common_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/opt/homebrew/bin/sox"),
            PathBuf::from("/usr/local/bin/sox"),
            PathBuf::from("/opt/local/bin/sox"),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from("C:\\Program Files (x86)\\sox-14-4-2\\sox.exe"),
            PathBuf::from("C:\\Program Files\\sox\\sox.exe"),
        ]
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/bin/sox"),
            PathBuf::from("/usr/local/bin/sox"),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", unix)))]
    {
        vec![]
    }
}

fn resolve_sox_path() -> Result<PathBuf, TranscodeError> {
    if let Some(path) = std::env::var_os(SOX_PATH_ENV).map(PathBuf::from) {
        if path.is_file() {
            log::debug!(
                target: "sox_transcode::sox::discovery",
                "SoX found via {}: {}",
                SOX_PATH_ENV,
                path.display()
            );
            return Ok(path);
        }
        log::warn!(
            target: "sox_transcode::sox::discovery",
            "{} points at a missing file, ignoring: {}",
            SOX_PATH_ENV,
            path.display()
        );
    }

    for path in common_paths() {
        if path.exists() {
            log::debug!(
                target: "sox_transcode::sox::discovery",
                "SoX found in common path: {}",
                path.display()
            );
            return Ok(path);
        }
    }

    if let Some(path) = find_in_path() {
        log::debug!(
            target: "sox_transcode::sox::discovery",
            "SoX found in PATH: {}",
            path.display()
        );
        return Ok(path);
    }

    log::error!(
        target: "sox_transcode::sox::discovery",
        "SoX not found (checked {}, common paths, PATH)",
        SOX_PATH_ENV
    );
    Err(TranscodeError::SoxNotFound(format!(
        "SoX not found. Install sox or set {} to its location.",
        SOX_PATH_ENV
    )))
}

static SOX_PATH_CACHE: OnceLock<PathBuf> = OnceLock::new();

/// Locate the `sox` executable. A successful lookup is cached for the process.
pub fn get_sox_path() -> Result<PathBuf, TranscodeError> {
    if let Some(path) = SOX_PATH_CACHE.get() {
        return Ok(path.clone());
    }
    let path = resolve_sox_path()?;
    Ok(SOX_PATH_CACHE.get_or_init(|| path).clone())
}
