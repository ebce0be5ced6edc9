//! `sox --info` based audio metadata extraction.
//!
//! Each property is a separate `sox --info -<flag> <file>` invocation; the six
//! queries run concurrently and the first failure wins.

use std::path::Path;

use super::builder::{InfoQuery, build_info_args};
use super::runner::capture;
use crate::error::{ProbeError, ProbeErrorKind};

/// Properties of one audio file as reported by SoX.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub format: String,
    pub sample_rate: u64,
    pub sample_count: u64,
    pub channel_count: u64,
    /// Seconds.
    pub duration: f64,
    /// Bits per second.
    pub bit_rate: u64,
}

const SUFFIX_KILO: u64 = 1024;
const SUFFIX_MEGA: u64 = 1024 * 1024;
const SUFFIX_GIGA: u64 = 1024 * 1024 * 1024;

/// Parse a SoX bit rate such as `706k` or `722944`.
///
/// Lower-case `k`/`m`/`g` suffixes scale by powers of 1024. Only the leading
/// integer digits count, so `705.6k` is 705 * 1024.
pub fn parse_bit_rate(s: &str) -> Option<u64> {
    let s = s.trim();
    let multiplier = match s.chars().last()? {
        'k' => SUFFIX_KILO,
        'm' => SUFFIX_MEGA,
        'g' => SUFFIX_GIGA,
        _ => 1,
    };
    let digits_end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let n: u64 = s[..digits_end].parse().ok()?;
    n.checked_mul(multiplier)
}

fn parse_int(property: &'static str, value: &str) -> Result<u64, ProbeErrorKind> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(property, value))
}

fn parse_float(property: &'static str, value: &str) -> Result<f64, ProbeErrorKind> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite())
        .ok_or_else(|| invalid(property, value))
}

fn invalid(property: &'static str, value: &str) -> ProbeErrorKind {
    ProbeErrorKind::InvalidValue {
        property,
        value: value.to_string(),
    }
}

/// Raw `sox --info` answers, one per query, before unit conversion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawInfo {
    pub format: String,
    pub sample_rate: String,
    pub channel_count: String,
    pub sample_count: String,
    pub duration: String,
    pub bit_rate: String,
}

impl RawInfo {
    /// Apply per-field conversions. Format passes through untouched.
    pub fn convert(self) -> Result<MediaInfo, ProbeErrorKind> {
        Ok(MediaInfo {
            sample_rate: parse_int("sampleRate", &self.sample_rate)?,
            sample_count: parse_int("sampleCount", &self.sample_count)?,
            channel_count: parse_int("channelCount", &self.channel_count)?,
            duration: parse_float("duration", &self.duration)?,
            bit_rate: parse_bit_rate(&self.bit_rate)
                .ok_or_else(|| invalid("bitRate", &self.bit_rate))?,
            format: self.format,
        })
    }
}

/// Run all six metadata queries for `path` against the given executable.
pub async fn identify_with(program: &Path, path: &Path) -> Result<MediaInfo, ProbeError> {
    log::debug!(
        target: "sox_transcode::sox::probe",
        "identify: path={}",
        path.display()
    );

    let query = |q: InfoQuery| capture(program, build_info_args(q, path));
    let (format, sample_rate, channel_count, sample_count, duration, bit_rate) = tokio::try_join!(
        query(InfoQuery::Format),
        query(InfoQuery::SampleRate),
        query(InfoQuery::ChannelCount),
        query(InfoQuery::SampleCount),
        query(InfoQuery::Duration),
        query(InfoQuery::BitRate),
    )
    .map_err(|e| ProbeError::new(path, e))?;

    let raw = RawInfo {
        format,
        sample_rate,
        channel_count,
        sample_count,
        duration,
        bit_rate,
    };
    let info = raw.convert().map_err(|kind| ProbeError::new(path, kind))?;
    log::debug!(
        target: "sox_transcode::sox::probe",
        "identify: path={}, format={}, duration={}s, rate={}",
        path.display(),
        info.format,
        info.duration,
        info.sample_rate
    );
    Ok(info)
}
