//! Incremental parser for the `--show-progress` lines SoX writes to stderr.
//!
//! SoX redraws its status line with carriage returns, and the pipe hands us
//! arbitrary slices of it. The parser keeps the trailing partial line until
//! the next chunk completes it.

use regex::Regex;
use std::sync::LazyLock;

/// One status line, e.g.
/// `In:45.3%  00:00:00.68 [00:00:00.82] Out:30.0k [ -====|====- ] Hd:1.2 Clip:0`
///
/// Capture groups: 1 input percent, 2-4 elapsed h/m/s, 5-7 remaining h/m/s,
/// 8 output size, 9 optional headroom, 10 clip count.
static PROGRESS_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^In:([\d.]+)%\s+(\d\d):(\d\d):([\d.]+)\s+\[(\d\d):(\d\d):([\d.]+)\]\s+Out:([\d.\w]+)\s+\[[\s|\-!=]+\]\s+(?:Hd:([\d.]+))?\s+Clip:(\d+)\s*$",
    )
    .expect("invalid progress regex")
});

/// Fields of a matched status line. Times are in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressLine {
    pub input_percent: f64,
    pub elapsed: f64,
    pub remaining: f64,
    pub output_size: String,
    pub headroom: Option<f64>,
    pub clips: u64,
}

/// Elapsed and total seconds for one progress notification.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub elapsed_seconds: f64,
    pub total_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressSignal {
    /// Observed elapsed time exceeded the known total; this is the new total.
    DurationCorrected(f64),
    Progress(ProgressEvent),
}

fn hms_to_seconds(hours: &str, minutes: &str, seconds: &str) -> Option<f64> {
    let h: f64 = hours.parse().ok()?;
    let m: f64 = minutes.parse().ok()?;
    let s: f64 = seconds.parse().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}

/// Match a single complete line. Returns None for anything that is not a status line.
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let caps = PROGRESS_LINE_RE.captures(line)?;
    Some(ProgressLine {
        input_percent: caps[1].parse().ok()?,
        elapsed: hms_to_seconds(&caps[2], &caps[3], &caps[4])?,
        remaining: hms_to_seconds(&caps[5], &caps[6], &caps[7])?,
        output_size: caps[8].to_string(),
        headroom: caps.get(9).and_then(|m| m.as_str().parse().ok()),
        clips: caps[10].parse().ok()?,
    })
}

/// Stateful chunk-to-event decoder for one operation.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    buffer: String,
    total: f64,
    last_elapsed: f64,
}

impl ProgressParser {
    pub fn new(total_seconds: f64) -> Self {
        Self {
            buffer: String::new(),
            total: total_seconds.max(0.0),
            last_elapsed: 0.0,
        }
    }

    /// Current total duration, including any upward corrections.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Data held back because no line terminator has arrived for it yet.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Append a chunk and return the signals for every line it completed, in order.
    pub fn feed(&mut self, chunk: &str) -> Vec<ProgressSignal> {
        self.buffer.push_str(chunk);
        let Some(last_break) = self.buffer.rfind(['\r', '\n']) else {
            return Vec::new();
        };
        let rest = self.buffer.split_off(last_break + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        let mut signals = Vec::new();
        for line in complete.split(['\r', '\n']) {
            if let Some(parsed) = parse_progress_line(line) {
                self.apply(parsed.elapsed, &mut signals);
            }
        }
        signals
    }

    fn apply(&mut self, elapsed: f64, signals: &mut Vec<ProgressSignal>) {
        // SoX can repeat a status line; never report time going backwards.
        let elapsed = elapsed.max(self.last_elapsed);
        self.last_elapsed = elapsed;
        if elapsed > self.total {
            self.total = elapsed;
            signals.push(ProgressSignal::DurationCorrected(elapsed));
        }
        signals.push(ProgressSignal::Progress(ProgressEvent {
            elapsed_seconds: elapsed,
            total_seconds: self.total,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE_HALF: &str =
        "In:50.0%  00:00:00.75 [00:00:00.75] Out:33.1k [ -====|====- ] Hd:1.5 Clip:0    ";
    const LINE_DONE: &str = "In:100%  00:00:01.50 [00:00:00.00] Out:66.2k [      |      ]        Clip:3    ";

    fn progress(elapsed: f64, total: f64) -> ProgressSignal {
        ProgressSignal::Progress(ProgressEvent {
            elapsed_seconds: elapsed,
            total_seconds: total,
        })
    }

    #[test]
    fn parses_all_fields() {
        let line = parse_progress_line(LINE_HALF).unwrap();
        assert_eq!(line.input_percent, 50.0);
        assert_eq!(line.elapsed, 0.75);
        assert_eq!(line.remaining, 0.75);
        assert_eq!(line.output_size, "33.1k");
        assert_eq!(line.headroom, Some(1.5));
        assert_eq!(line.clips, 0);
    }

    #[test]
    fn headroom_is_optional() {
        let line = parse_progress_line(LINE_DONE).unwrap();
        assert_eq!(line.headroom, None);
        assert_eq!(line.clips, 3);
        assert_eq!(line.elapsed, 1.5);
    }

    #[test]
    fn hours_and_minutes_count() {
        let line = parse_progress_line(
            "In:12.5%  01:02:03.25 [00:10:00.00] Out:1.2M [ -====|====- ] Hd:0.0 Clip:0",
        )
        .unwrap();
        assert_eq!(line.elapsed, 3723.25);
        assert_eq!(line.remaining, 600.0);
    }

    #[test]
    fn noise_lines_are_ignored() {
        assert!(parse_progress_line("").is_none());
        assert!(parse_progress_line("Input File     : 'sound.wav'").is_none());
        assert!(parse_progress_line("sox WARN rate: rate clipped 2 samples").is_none());

        let mut parser = ProgressParser::new(1.5);
        let signals = parser.feed("\nInput File     : 'sound.wav'\nChannels       : 1\n");
        assert!(signals.is_empty());
        assert_eq!(parser.pending(), "");
    }

    #[test]
    fn incomplete_line_is_held_back() {
        let mut parser = ProgressParser::new(1.5);
        assert!(parser.feed(LINE_HALF).is_empty());
        assert_eq!(parser.pending(), LINE_HALF);
        assert_eq!(parser.feed("\r"), vec![progress(0.75, 1.5)]);
        assert_eq!(parser.pending(), "");
    }

    #[test]
    fn split_line_matches_single_chunk() {
        let whole = format!("{}\r", LINE_HALF);
        let mut reference = ProgressParser::new(1.5);
        let expected = reference.feed(&whole);
        assert_eq!(expected.len(), 1);

        for split in 1..whole.len() {
            let mut parser = ProgressParser::new(1.5);
            let mut signals = parser.feed(&whole[..split]);
            signals.extend(parser.feed(&whole[split..]));
            assert_eq!(signals, expected, "split at {}", split);
        }
    }

    #[test]
    fn multiple_lines_in_one_chunk_keep_order() {
        let mut parser = ProgressParser::new(1.5);
        let chunk = format!("{}\r{}\r\nIn:", LINE_HALF, LINE_DONE);
        let signals = parser.feed(&chunk);
        assert_eq!(signals, vec![progress(0.75, 1.5), progress(1.5, 1.5)]);
        assert_eq!(parser.pending(), "In:");
    }

    #[test]
    fn elapsed_beyond_total_corrects_duration_first() {
        let mut parser = ProgressParser::new(1.0);
        let signals = parser.feed(&format!("{}\n", LINE_DONE));
        assert_eq!(
            signals,
            vec![ProgressSignal::DurationCorrected(1.5), progress(1.5, 1.5)]
        );
        assert_eq!(parser.total(), 1.5);
    }

    #[test]
    fn elapsed_equal_to_total_does_not_correct() {
        let mut parser = ProgressParser::new(1.5);
        let signals = parser.feed(&format!("{}\n", LINE_DONE));
        assert_eq!(signals, vec![progress(1.5, 1.5)]);
    }

    #[test]
    fn elapsed_never_goes_backwards() {
        let mut parser = ProgressParser::new(1.5);
        let signals = parser.feed(&format!("{}\r{}\r", LINE_DONE, LINE_HALF));
        assert_eq!(signals, vec![progress(1.5, 1.5), progress(1.5, 1.5)]);
    }
}
