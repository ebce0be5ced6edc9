//! Stream-to-stream transcodes staged through temporary files.
//!
//! The input is copied to a fresh temp file before SoX starts. After the
//! file-to-file operation ends, the converted temp file is copied to the
//! caller's writer, both temp files are removed, and only then is `End` sent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::{StagingStage, StreamCopyError, TranscodeError};
use crate::sox::{Sox, TempStorage, TranscodeOptions, staged_output_path};
use crate::transcode::{EventSender, Transcode, TranscodeEvent};

/// Temp files for one stream operation. Removed when dropped, on every exit path.
struct StagedFiles {
    storage: Arc<dyn TempStorage>,
    paths: Vec<PathBuf>,
}

impl StagedFiles {
    fn new(storage: Arc<dyn TempStorage>) -> Self {
        Self {
            storage,
            paths: Vec::new(),
        }
    }

    fn track(&mut self, path: PathBuf) -> &Path {
        self.paths.push(path);
        &self.paths[self.paths.len() - 1]
    }
}

impl Drop for StagedFiles {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(e) = self.storage.remove(&path) {
                log::warn!(
                    target: "sox_transcode::stream",
                    "failed to remove temp file {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }
}

async fn stage_input<R>(mut input: R, path: &Path) -> Result<(), StreamCopyError>
where
    R: AsyncRead + Unpin,
{
    let stage_err = |e| StreamCopyError::new(StagingStage::StageInput, e);
    let mut file = tokio::fs::File::create(path).await.map_err(stage_err)?;
    let bytes = tokio::io::copy(&mut input, &mut file)
        .await
        .map_err(stage_err)?;
    file.flush().await.map_err(stage_err)?;
    file.sync_all().await.map_err(stage_err)?;
    log::debug!(
        target: "sox_transcode::stream",
        "staged {} bytes into {}",
        bytes,
        path.display()
    );
    Ok(())
}

async fn unstage_output<W>(path: &Path, output: &mut W) -> Result<u64, StreamCopyError>
where
    W: AsyncWrite + Unpin,
{
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| StreamCopyError::new(StagingStage::ReadOutput, e))?;
    let write_err = |e| StreamCopyError::new(StagingStage::WriteOutput, e);
    let bytes = tokio::io::copy(&mut file, output).await.map_err(write_err)?;
    output.flush().await.map_err(write_err)?;
    Ok(bytes)
}

async fn run_stream<R, W>(
    sox: Sox,
    input: R,
    mut output: W,
    options: TranscodeOptions,
    events: EventSender,
) -> Result<(), TranscodeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut staged = StagedFiles::new(Arc::clone(sox.temp_storage()));
    let input_path = sox
        .temp_storage()
        .allocate()
        .map_err(|e| StreamCopyError::new(StagingStage::AllocateInput, e))?;
    let input_path = staged.track(input_path).to_path_buf();
    stage_input(input, &input_path).await?;

    let output_path = staged_output_path(&input_path, &options.effective_format());
    staged.track(output_path.clone());

    let mut inner = sox.transcode(&input_path, &output_path, &options);
    while let Some(event) = inner.next_event().await {
        match event {
            TranscodeEvent::End => {
                let bytes = unstage_output(&output_path, &mut output).await?;
                drop(staged);
                log::info!(
                    target: "sox_transcode::stream",
                    "stream transcode complete ({} bytes written)",
                    bytes
                );
                events.send(TranscodeEvent::End);
                return Ok(());
            }
            TranscodeEvent::Error(e) => return Err(e),
            other => events.send(other),
        }
    }
    Err(TranscodeError::Interrupted)
}

impl Sox {
    /// Like [`Sox::transcode`], but reading from and writing to streams.
    ///
    /// Must be called inside a tokio runtime. The notification sequence is the
    /// same as for files; `End` is sent after the writer has been flushed.
    pub fn transcode_stream<R, W>(&self, input: R, output: W, options: &TranscodeOptions) -> Transcode
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let sox = self.clone();
        let options = options.clone();
        Transcode::spawn(move |events| async move {
            if let Err(e) = run_stream(sox, input, output, options, events.clone()).await {
                log::error!(
                    target: "sox_transcode::stream",
                    "stream transcode failed: {}",
                    e
                );
                events.send(TranscodeEvent::Error(e));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sox::SystemTempStorage;

    #[test]
    fn staged_files_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn TempStorage> = Arc::new(SystemTempStorage::in_dir(dir.path()));
        let a = storage.allocate().unwrap();
        let b = staged_output_path(&a, "mp3");
        std::fs::write(&b, b"converted").unwrap();
        {
            let mut staged = StagedFiles::new(Arc::clone(&storage));
            staged.track(a.clone());
            staged.track(b.clone());
        }
        assert!(!a.exists());
        assert!(!b.exists());
    }

    #[tokio::test]
    async fn stage_input_copies_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staged");
        let data = vec![7u8; 100_000];
        stage_input(&data[..], &path).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[tokio::test]
    async fn unstage_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = Vec::new();
        let err = unstage_output(&dir.path().join("missing.mp3"), &mut sink)
            .await
            .unwrap_err();
        assert_eq!(err.stage, StagingStage::ReadOutput);
    }

    #[tokio::test]
    async fn allocation_failure_is_reported_once() {
        let storage = SystemTempStorage::in_dir("/nonexistent/dir/for/staging");
        let sox = Sox::new("/nonexistent/sox").with_temp_storage(Arc::new(storage));
        let mut handle = sox.transcode_stream(&b"RIFF"[..], Vec::new(), &TranscodeOptions::default());
        match handle.next_event().await {
            Some(TranscodeEvent::Error(TranscodeError::StreamCopy(e))) => {
                assert_eq!(e.stage, StagingStage::AllocateInput)
            }
            other => panic!("expected staging error, got {:?}", other),
        }
        assert!(handle.next_event().await.is_none());
    }
}
