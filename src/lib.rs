pub mod error;
pub mod sox;
mod stream;
pub mod transcode;

use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite};

pub use error::{
    ProbeError, ProbeErrorKind, ProcessError, ProcessFailure, StagingStage, StreamCopyError,
    TranscodeError,
};
pub use sox::{
    MediaInfo, ProgressEvent, Sox, SystemTempStorage, TempStorage, TranscodeOptions,
    TranscodeSettings,
};
pub use transcode::{Stage, Transcode, TranscodeEvent, TranscodeOutcome};

/// Probe `path` with the discovered `sox` executable.
///
/// Discovery may run `which sox`, so it happens on the blocking pool.
pub async fn identify(path: impl AsRef<Path>) -> Result<MediaInfo, TranscodeError> {
    let sox = tokio::task::spawn_blocking(Sox::discover)
        .await
        .map_err(|_| TranscodeError::Interrupted)??;
    Ok(sox.identify(path).await?)
}

/// Start a file-to-file transcode with the discovered `sox` executable.
///
/// Until a lookup succeeds and is cached, discovery blocks the calling thread.
pub fn transcode(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &TranscodeOptions,
) -> Result<Transcode, TranscodeError> {
    Ok(Sox::discover()?.transcode(input, output, options))
}

/// Start a stream-to-stream transcode with the discovered `sox` executable.
///
/// Blocks on discovery like [`transcode`].
pub fn transcode_stream<R, W>(
    input: R,
    output: W,
    options: &TranscodeOptions,
) -> Result<Transcode, TranscodeError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    Ok(Sox::discover()?.transcode_stream(input, output, options))
}
