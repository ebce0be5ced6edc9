#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use sox_transcode::{MediaInfo, Sox, SystemTempStorage, TranscodeEvent};

/// Stand-in for the `sox` executable.
///
/// `--info` answers depend on the path: `*.mp3` is the converted file, names
/// containing `short` report a duration shorter than the progress output, and
/// names containing `unreadable` fail with exit code 1. Conversions print three
/// status lines to stderr, copy input to output and log their arguments.
/// Inputs containing `corrupt` fail with exit code 2; format `bogus` with 1.
const FAKE_SOX: &str = r#"#!/bin/sh
if [ "$1" = "--info" ]; then
  case "$3" in
    *unreadable*)
      echo "sox FAIL formats: can't open input file \`$3': No such file or directory" >&2
      exit 1 ;;
    *.mp3) fmt=mp3; rate=44100; ch=2; samples=68096; dur=1.544127; br=192k ;;
    *short*) fmt=wav; rate=44100; ch=1; samples=44100; dur=1.000000; br=706k ;;
    *) fmt=wav; rate=44100; ch=1; samples=66150; dur=1.500000; br=706k ;;
  esac
  case "$2" in
    -t) echo "$fmt" ;;
    -r) echo "$rate" ;;
    -c) echo "$ch" ;;
    -s) echo "$samples" ;;
    -D) echo "$dur" ;;
    -B) echo "$br" ;;
    *) exit 1 ;;
  esac
  exit 0
fi

echo "$@" >> "__CALL_LOG__"
in="$3"
shift 3
fmt=""
while [ $# -gt 0 ]; do
  case "$1" in
    -t) fmt="$2"; shift 2 ;;
    -r|-C|-c) shift 2 ;;
    *) out="$1"; shift; break ;;
  esac
done

if [ "$fmt" = "bogus" ]; then
  echo "sox FAIL formats: no handler for given file type \`bogus'" >&2
  exit 1
fi

printf '\nInput File     : %s\n\n' "$in" >&2
printf 'In:33.3%%  00:00:00.50 [00:00:01.00] Out:22.0k [ -====|====- ] Hd:1.2 Clip:0\r' >&2
printf 'In:66.7%%  00:00:01.00 [00:00:00.50] Out:44.1k [ -====|====- ] Hd:0.8 Clip:0\r' >&2

case "$in" in
  *corrupt*)
    echo "sox FAIL formats: can't read input: premature EOF" >&2
    exit 2 ;;
esac

printf 'In:100%%  00:00:01.50 [00:00:00.00] Out:66.2k [      |      ]        Clip:0\r' >&2
printf '\nDone.\n' >&2
cp "$in" "$out"
"#;

/// Scratch directory with a fake `sox` and helpers for test inputs.
pub struct IntegrationEnv {
    pub sox_path: PathBuf,
    dir: tempfile::TempDir,
}

impl IntegrationEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let sox_path = dir.path().join("sox");
        let log = dir.path().join("calls.log");
        let script = FAKE_SOX.replace("__CALL_LOG__", &log.to_string_lossy());
        fs::write(&sox_path, script).expect("write fake sox");
        make_executable(&sox_path);
        Self { sox_path, dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn sox(&self) -> Sox {
        Sox::new(&self.sox_path)
    }

    /// A [`Sox`] whose stream staging happens in a fresh `staging/` subdirectory.
    pub fn sox_with_staging(&self) -> (Sox, PathBuf) {
        let staging = self.path("staging");
        fs::create_dir_all(&staging).expect("create staging dir");
        let sox = self
            .sox()
            .with_temp_storage(std::sync::Arc::new(SystemTempStorage::in_dir(&staging)));
        (sox, staging)
    }

    /// Write a placeholder input file and return its path.
    pub fn with_input(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).expect("write input");
        path
    }

    /// Arguments of every conversion the fake has run, one line per call.
    pub fn conversion_calls(&self) -> Vec<String> {
        fs::read_to_string(self.path("calls.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path).expect("stat fake sox").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod fake sox");
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}

pub fn wav_info(duration: f64) -> MediaInfo {
    MediaInfo {
        format: "wav".into(),
        sample_rate: 44100,
        sample_count: if duration < 1.5 { 44100 } else { 66150 },
        channel_count: 1,
        duration,
        bit_rate: 706 * 1024,
    }
}

pub fn mp3_info() -> MediaInfo {
    MediaInfo {
        format: "mp3".into(),
        sample_rate: 44100,
        sample_count: 68096,
        channel_count: 2,
        duration: 1.544127,
        bit_rate: 192 * 1024,
    }
}

pub fn wav_bytes() -> Vec<u8> {
    let mut data = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();
    data.extend(std::iter::repeat_n(0u8, 4096));
    data
}

/// Names of the events in order, for sequence assertions.
pub fn event_names(events: &[TranscodeEvent]) -> Vec<&'static str> {
    events.iter().map(TranscodeEvent::name).collect()
}

/// Drain a handle into a vector.
pub async fn collect_events(mut handle: sox_transcode::Transcode) -> Vec<TranscodeEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    events
}

pub fn dir_is_empty(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
