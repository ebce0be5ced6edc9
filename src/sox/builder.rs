use std::path::Path;

use super::{TranscodeSettings, path_to_string};

/// One `sox --info` property selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoQuery {
    Format,
    SampleRate,
    ChannelCount,
    SampleCount,
    Duration,
    BitRate,
}

impl InfoQuery {
    pub const ALL: [InfoQuery; 6] = [
        InfoQuery::Format,
        InfoQuery::SampleRate,
        InfoQuery::ChannelCount,
        InfoQuery::SampleCount,
        InfoQuery::Duration,
        InfoQuery::BitRate,
    ];

    pub fn flag(self) -> &'static str {
        match self {
            InfoQuery::Format => "-t",
            InfoQuery::SampleRate => "-r",
            InfoQuery::ChannelCount => "-c",
            InfoQuery::SampleCount => "-s",
            InfoQuery::Duration => "-D",
            InfoQuery::BitRate => "-B",
        }
    }
}

pub fn build_info_args(query: InfoQuery, input_path: &Path) -> Vec<String> {
    vec![
        "--info".to_string(),
        query.flag().to_string(),
        path_to_string(input_path),
    ]
}

/// Conversion command: global flags, input, output format options, output, effects.
pub fn build_sox_command(
    input_path: &Path,
    output_path: &Path,
    settings: &TranscodeSettings,
) -> Vec<String> {
    let mut args = vec![
        "--guard".to_string(),
        "--show-progress".to_string(),
        path_to_string(input_path),
        "-r".to_string(),
        settings.sample_rate.to_string(),
        "-t".to_string(),
        settings.format.clone(),
    ];

    if let Some(compression) = settings.compression_flag() {
        args.extend(["-C".to_string(), compression.to_string()]);
    }

    args.extend([
        "-c".to_string(),
        settings.channel_count.to_string(),
        path_to_string(output_path),
    ]);
    args.extend(settings.effects.iter().cloned());

    log::debug!(
        target: "sox_transcode::sox::builder",
        "build_sox_command: format={}, rate={}, channels={}, effects={}",
        settings.format,
        settings.sample_rate,
        settings.channel_count,
        settings.effects.len() / 2
    );
    args
}

/// Multi-line form for logs: one flag with its value per line.
pub fn format_args_for_display_multiline(args: &[String]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        let takes_value = matches!(arg.as_str(), "-r" | "-t" | "-C" | "-c");
        if takes_value && i + 1 < args.len() {
            lines.push(format!("{} {}", arg, quote(&args[i + 1])));
            i += 2;
        } else {
            lines.push(quote(arg));
            i += 1;
        }
    }
    lines.join(" \\\n  ")
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.contains(char::is_whitespace) {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}
