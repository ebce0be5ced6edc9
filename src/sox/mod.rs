mod builder;
pub mod discovery;
mod error;
pub mod probe;
mod progress;
mod runner;
mod temp;

pub use builder::{
    InfoQuery, build_info_args, build_sox_command, format_args_for_display_multiline,
};
pub use error::{SoxErrorPayload, parse_sox_error};
pub use probe::{MediaInfo, parse_bit_rate};
pub use progress::{ProgressEvent, ProgressLine, ProgressParser, ProgressSignal, parse_progress_line};
pub use runner::{CapturedOutput, capture, run_sox_streaming};
pub use temp::{SystemTempStorage, TempStorage, staged_output_path};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{ProbeError, TranscodeError};

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_FORMAT: &str = "mp3";
pub const DEFAULT_CHANNEL_COUNT: u32 = 2;
pub const DEFAULT_BIT_RATE: u64 = 192 * 1024;
/// Added to the kbps value of `-C` when encoding mp3.
pub const DEFAULT_MP3_COMPRESSION_QUALITY: u32 = 5;

/// Caller overrides for one transcode. Unset (or zero) fields fall back to defaults.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeOptions {
    pub sample_rate: Option<u32>,
    pub format: Option<String>,
    pub channel_count: Option<u32>,
    /// Bits per second.
    pub bit_rate: Option<u64>,
    pub compression_quality: Option<u32>,
    /// `(effect, parameter)` pairs appended after the output file, in order.
    pub effects: Option<Vec<(String, String)>>,
}

impl TranscodeOptions {
    pub fn effective_sample_rate(&self) -> u32 {
        self.sample_rate
            .filter(|&r| r > 0)
            .unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn effective_format(&self) -> String {
        self.format
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FORMAT)
            .to_lowercase()
    }

    pub fn effective_channel_count(&self) -> u32 {
        self.channel_count
            .filter(|&c| c > 0)
            .unwrap_or(DEFAULT_CHANNEL_COUNT)
    }

    pub fn effective_bit_rate(&self) -> u64 {
        self.bit_rate.filter(|&b| b > 0).unwrap_or(DEFAULT_BIT_RATE)
    }

    /// Defaults to 5 for mp3; other formats only get it when set explicitly.
    pub fn effective_compression_quality(&self) -> Option<u32> {
        let explicit = self.compression_quality.filter(|&q| q > 0);
        if self.effective_format() == DEFAULT_FORMAT {
            Some(explicit.unwrap_or(DEFAULT_MP3_COMPRESSION_QUALITY))
        } else {
            explicit
        }
    }

    /// Flattened `name, parameter, name, parameter, ...` effect arguments.
    pub fn effective_effects(&self) -> Vec<String> {
        self.effects
            .iter()
            .flatten()
            .flat_map(|(name, param)| [name.clone(), param.clone()])
            .collect()
    }

    /// Merge with defaults into the fixed settings used for one operation.
    pub fn resolve(&self) -> TranscodeSettings {
        TranscodeSettings {
            sample_rate: self.effective_sample_rate(),
            format: self.effective_format(),
            channel_count: self.effective_channel_count(),
            bit_rate: self.effective_bit_rate(),
            compression_quality: self.effective_compression_quality(),
            effects: self.effective_effects(),
        }
    }
}

/// Fully resolved conversion parameters. Built once per operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeSettings {
    pub sample_rate: u32,
    pub format: String,
    pub channel_count: u32,
    pub bit_rate: u64,
    pub compression_quality: Option<u32>,
    pub effects: Vec<String>,
}

impl TranscodeSettings {
    /// Value for `-C`: rounded kbps plus the compression quality.
    pub fn compression_flag(&self) -> Option<u64> {
        self.compression_quality
            .map(|q| (self.bit_rate as f64 / 1024.0).round() as u64 + u64::from(q))
    }
}

/// Handle on one SoX executable plus the temp storage used for stream staging.
#[derive(Clone)]
pub struct Sox {
    program: PathBuf,
    temp: Arc<dyn TempStorage>,
}

impl fmt::Debug for Sox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sox")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl Sox {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            temp: Arc::new(SystemTempStorage::default()),
        }
    }

    /// Use the executable found by [`discovery::get_sox_path`].
    pub fn discover() -> Result<Self, TranscodeError> {
        Ok(Self::new(discovery::get_sox_path()?))
    }

    pub fn with_temp_storage(mut self, storage: Arc<dyn TempStorage>) -> Self {
        self.temp = storage;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn temp_storage(&self) -> &Arc<dyn TempStorage> {
        &self.temp
    }

    /// Probe format, sample rate, channels, sample count, duration and bit rate.
    pub async fn identify(&self, path: impl AsRef<Path>) -> Result<MediaInfo, ProbeError> {
        probe::identify_with(&self.program, path.as_ref()).await
    }
}

/// Path to string for SoX args or logging.
pub fn path_to_string(path: &(impl AsRef<Path> + ?Sized)) -> String {
    path.as_ref().to_string_lossy().to_string()
}
