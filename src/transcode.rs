//! File-to-file transcode lifecycle: probe source, run SoX, probe destination.
//!
//! Every operation runs on its own tokio task and reports through one ordered
//! channel: `Src`, then any number of `Progress` (with `Src` re-sent on
//! duration correction), then `Dest`, a final `Progress` at 100%, and `End`.
//! A failure at any stage produces a single `Error` and nothing after it.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::TranscodeError;
use crate::sox::{
    MediaInfo, ProgressEvent, ProgressParser, ProgressSignal, Sox, TranscodeOptions,
    TranscodeSettings, build_sox_command, run_sox_streaming,
};

/// Notification from a running operation.
#[derive(Debug)]
pub enum TranscodeEvent {
    /// Source metadata; sent again whenever its duration is corrected upward.
    Src(MediaInfo),
    Progress(ProgressEvent),
    Dest(MediaInfo),
    Error(TranscodeError),
    End,
}

impl TranscodeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TranscodeEvent::Src(_) => "src",
            TranscodeEvent::Progress(_) => "progress",
            TranscodeEvent::Dest(_) => "dest",
            TranscodeEvent::Error(_) => "error",
            TranscodeEvent::End => "end",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TranscodeEvent::Error(_) | TranscodeEvent::End)
    }
}

/// Result of draining a successful operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeOutcome {
    /// Source metadata with any duration correction applied.
    pub src: MediaInfo,
    pub dest: MediaInfo,
    pub progress: Vec<ProgressEvent>,
}

/// Handle to a running operation. Dropping it does not stop SoX.
#[derive(Debug)]
pub struct Transcode {
    events: mpsc::UnboundedReceiver<TranscodeEvent>,
    task: JoinHandle<()>,
}

impl Transcode {
    pub(crate) fn spawn<F>(run: impl FnOnce(EventSender) -> F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(EventSender { tx }));
        Self { events: rx, task }
    }

    /// Next notification, or None once the terminal one has been received.
    pub async fn next_event(&mut self) -> Option<TranscodeEvent> {
        self.events.recv().await
    }

    /// Drain all notifications and return the outcome or the terminal error.
    pub async fn wait(mut self) -> Result<TranscodeOutcome, TranscodeError> {
        let mut src = None;
        let mut dest = None;
        let mut progress = Vec::new();
        while let Some(event) = self.next_event().await {
            match event {
                TranscodeEvent::Src(info) => src = Some(info),
                TranscodeEvent::Progress(p) => progress.push(p),
                TranscodeEvent::Dest(info) => dest = Some(info),
                TranscodeEvent::Error(e) => return Err(e),
                TranscodeEvent::End => break,
            }
        }
        let _ = (&mut self.task).await;
        match (src, dest) {
            (Some(src), Some(dest)) => Ok(TranscodeOutcome {
                src,
                dest,
                progress,
            }),
            _ => Err(TranscodeError::Interrupted),
        }
    }
}

/// Sending side of an operation's event channel.
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    tx: mpsc::UnboundedSender<TranscodeEvent>,
}

impl EventSender {
    /// Sends are best effort: a dropped handle must not stop the operation.
    pub(crate) fn send(&self, event: TranscodeEvent) {
        let _ = self.tx.send(event);
    }
}

/// Lifecycle stage of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Created,
    ProbingSource,
    Running,
    ProbingDestination,
    Done,
    Failed,
}

/// State owned by a single file-to-file transcode.
struct Operation {
    sox: Sox,
    input: PathBuf,
    output: PathBuf,
    settings: TranscodeSettings,
    stage: Stage,
    events: EventSender,
}

impl Operation {
    fn advance(&mut self, next: Stage) {
        log::debug!(
            target: "sox_transcode::transcode",
            "{} -> {}: {:?} -> {:?}",
            self.input.display(),
            self.output.display(),
            self.stage,
            next
        );
        self.stage = next;
    }

    fn fail(&mut self, error: TranscodeError) {
        log::error!(
            target: "sox_transcode::transcode",
            "transcode of {} failed during {:?}: {}",
            self.input.display(),
            self.stage,
            error
        );
        self.advance(Stage::Failed);
        self.events.send(TranscodeEvent::Error(error));
    }

    async fn run(mut self) {
        if let Err(e) = self.run_stages().await {
            self.fail(e);
        }
    }

    async fn run_stages(&mut self) -> Result<(), TranscodeError> {
        self.advance(Stage::ProbingSource);
        let mut src = self.sox.identify(&self.input).await?;
        self.events.send(TranscodeEvent::Src(src.clone()));

        self.advance(Stage::Running);
        let args = build_sox_command(&self.input, &self.output, &self.settings);
        let mut parser = ProgressParser::new(src.duration);
        let events = &self.events;
        run_sox_streaming(self.sox.program(), args, |chunk| {
            for signal in parser.feed(chunk) {
                match signal {
                    ProgressSignal::DurationCorrected(total) => {
                        src.duration = total;
                        events.send(TranscodeEvent::Src(src.clone()));
                    }
                    ProgressSignal::Progress(p) => events.send(TranscodeEvent::Progress(p)),
                }
            }
        })
        .await?;

        self.advance(Stage::ProbingDestination);
        let dest = self.sox.identify(&self.output).await?;
        self.events.send(TranscodeEvent::Dest(dest));
        self.events.send(TranscodeEvent::Progress(ProgressEvent {
            elapsed_seconds: src.duration,
            total_seconds: src.duration,
        }));

        self.advance(Stage::Done);
        log::info!(
            target: "sox_transcode::transcode",
            "transcoded {} -> {}",
            self.input.display(),
            self.output.display()
        );
        self.events.send(TranscodeEvent::End);
        Ok(())
    }
}

impl Sox {
    /// Start converting `input` into `output`. Must be called inside a tokio runtime.
    pub fn transcode(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        options: &TranscodeOptions,
    ) -> Transcode {
        let sox = self.clone();
        let input = input.as_ref().to_path_buf();
        let output = output.as_ref().to_path_buf();
        let settings = options.resolve();
        Transcode::spawn(move |events| {
            let operation = Operation {
                sox,
                input,
                output,
                settings,
                stage: Stage::Created,
                events,
            };
            operation.run()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(duration: f64) -> MediaInfo {
        MediaInfo {
            format: "wav".into(),
            sample_rate: 44100,
            sample_count: 66150,
            channel_count: 1,
            duration,
            bit_rate: 722_944,
        }
    }

    #[test]
    fn event_names_and_terminal_flags() {
        assert_eq!(TranscodeEvent::Src(info(1.5)).name(), "src");
        assert_eq!(TranscodeEvent::End.name(), "end");
        assert!(TranscodeEvent::End.is_terminal());
        assert!(
            TranscodeEvent::Error(TranscodeError::SoxNotFound("x".into())).is_terminal()
        );
        assert!(!TranscodeEvent::Dest(info(1.5)).is_terminal());
    }

    #[tokio::test]
    async fn wait_collects_events_until_end() {
        let handle = Transcode::spawn(|events| async move {
            events.send(TranscodeEvent::Src(info(1.5)));
            events.send(TranscodeEvent::Progress(ProgressEvent {
                elapsed_seconds: 0.5,
                total_seconds: 1.5,
            }));
            events.send(TranscodeEvent::Dest(info(1.54)));
            events.send(TranscodeEvent::End);
        });
        let outcome = handle.wait().await.unwrap();
        assert_eq!(outcome.src, info(1.5));
        assert_eq!(outcome.dest, info(1.54));
        assert_eq!(outcome.progress.len(), 1);
    }

    #[tokio::test]
    async fn wait_returns_terminal_error() {
        let handle = Transcode::spawn(|events| async move {
            events.send(TranscodeEvent::Error(TranscodeError::SoxNotFound(
                "missing".into(),
            )));
        });
        let err = handle.wait().await.unwrap_err();
        assert_eq!(err.to_string(), "missing");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_executable_yields_single_error() {
        let sox = Sox::new("/nonexistent/sox");
        let mut handle = sox.transcode("in.wav", "out.mp3", &TranscodeOptions::default());
        let first = handle.next_event().await.unwrap();
        match first {
            TranscodeEvent::Error(e) => assert_eq!(e.exit_code(), Some(-1)),
            other => panic!("expected error, got {:?}", other),
        }
        assert!(handle.next_event().await.is_none());
    }
}
