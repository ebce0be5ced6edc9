//! Error types for probing and transcoding. Implements Display and Serialize for front ends.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::sox::parse_sox_error;

/// Why an external command did not produce a usable result.
#[derive(Debug)]
pub enum ProcessFailure {
    /// The executable could not be started (missing binary, permissions).
    Launch(io::Error),
    /// The process ran but exited unsuccessfully. `None` when killed by a signal.
    Exit { code: Option<i32> },
    /// Reading the process output failed; the process was killed.
    Read(io::Error),
}

impl fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessFailure::Launch(e) => write!(f, "failed to start: {}", e),
            ProcessFailure::Exit { code: Some(code) } => {
                write!(f, "returned nonzero exit code: {}", code)
            }
            ProcessFailure::Exit { code: None } => write!(f, "terminated by signal"),
            ProcessFailure::Read(e) => write!(f, "output could not be read: {}", e),
        }
    }
}

/// A failed external command, with everything it printed and the arguments it got.
#[derive(Debug, thiserror::Error)]
#[error("{program} {failure}")]
pub struct ProcessError {
    pub failure: ProcessFailure,
    pub program: String,
    pub args: Vec<String>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessError {
    pub fn launch(program: impl Into<String>, args: Vec<String>, source: io::Error) -> Self {
        Self {
            failure: ProcessFailure::Launch(source),
            program: program.into(),
            args,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn exit(
        program: impl Into<String>,
        args: Vec<String>,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    ) -> Self {
        Self {
            failure: ProcessFailure::Exit { code },
            program: program.into(),
            args,
            stdout,
            stderr,
        }
    }

    pub fn read(
        program: impl Into<String>,
        args: Vec<String>,
        source: io::Error,
        stderr: String,
    ) -> Self {
        Self {
            failure: ProcessFailure::Read(source),
            program: program.into(),
            args,
            stdout: String::new(),
            stderr,
        }
    }

    /// Exit code of the process, or -1 when it never started.
    pub fn exit_code(&self) -> Option<i32> {
        match self.failure {
            ProcessFailure::Launch(_) => Some(-1),
            ProcessFailure::Exit { code } => code,
            ProcessFailure::Read(_) => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeErrorKind {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("unexpected {property} value {value:?}")]
    InvalidValue {
        property: &'static str,
        value: String,
    },
}

/// Metadata query against `path` failed. Wraps the first failure seen.
#[derive(Debug, thiserror::Error)]
#[error("failed to identify {}: {kind}", .path.display())]
pub struct ProbeError {
    pub path: PathBuf,
    #[source]
    pub kind: ProbeErrorKind,
}

impl ProbeError {
    pub fn new(path: impl Into<PathBuf>, kind: impl Into<ProbeErrorKind>) -> Self {
        Self {
            path: path.into(),
            kind: kind.into(),
        }
    }

    pub fn process_error(&self) -> Option<&ProcessError> {
        match &self.kind {
            ProbeErrorKind::Process(e) => Some(e),
            ProbeErrorKind::InvalidValue { .. } => None,
        }
    }
}

/// Step of the temp-file staging that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingStage {
    AllocateInput,
    StageInput,
    ReadOutput,
    WriteOutput,
}

impl fmt::Display for StagingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StagingStage::AllocateInput => "allocate temporary input",
            StagingStage::StageInput => "copy input stream to temporary file",
            StagingStage::ReadOutput => "open converted temporary file",
            StagingStage::WriteOutput => "copy converted file to output stream",
        };
        f.write_str(text)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to {stage}: {source}")]
pub struct StreamCopyError {
    pub stage: StagingStage,
    #[source]
    pub source: io::Error,
}

impl StreamCopyError {
    pub fn new(stage: StagingStage, source: io::Error) -> Self {
        Self { stage, source }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    StreamCopy(#[from] StreamCopyError),

    #[error("{0}")]
    SoxNotFound(String),

    #[error("operation ended without a result")]
    Interrupted,
}

impl TranscodeError {
    /// The underlying process failure, if this error came from running SoX.
    pub fn process_error(&self) -> Option<&ProcessError> {
        match self {
            TranscodeError::Process(e) => Some(e),
            TranscodeError::Probe(e) => e.process_error(),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.process_error().and_then(ProcessError::exit_code)
    }
}

impl serde::Serialize for TranscodeError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self.process_error() {
            Some(e) => {
                let payload = parse_sox_error(&e.stderr, e.exit_code());
                let json =
                    serde_json::json!({ "summary": payload.summary, "detail": payload.detail });
                serializer.serialize_str(&json.to_string())
            }
            None => serializer.serialize_str(&self.to_string()),
        }
    }
}
