use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Where staged stream data lives while SoX works on it.
pub trait TempStorage: Send + Sync {
    /// Create a new, uniquely named, empty writable file and return its path.
    fn allocate(&self) -> io::Result<PathBuf>;

    /// Remove a path and everything under it. Missing paths are not an error.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Temp files under a directory on the local filesystem (system temp dir by default).
#[derive(Debug, Clone)]
pub struct SystemTempStorage {
    dir: PathBuf,
    prefix: String,
}

impl Default for SystemTempStorage {
    fn default() -> Self {
        Self::in_dir(std::env::temp_dir())
    }
}

impl SystemTempStorage {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: "sox-".to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TempStorage for SystemTempStorage {
    fn allocate(&self) -> io::Result<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix(&self.prefix)
            .tempfile_in(&self.dir)?;
        Ok(file.into_temp_path().keep()?)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }
}

/// Converted-file path for a staged input: `<input>.<format>`.
pub fn staged_output_path(input: &Path, format: &str) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(".");
    name.push(format);
    PathBuf::from(name)
}
