//! Streaming upload into the file store.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use crate::store::{FileStore, StoreError};

const PIPE_BUFFER_BYTES: usize = 64 * 1024;

/// Write side of an in-flight store upload.
///
/// Bytes written to the handle flow through an in-memory pipe to a background
/// task that stores them under the target key. The object must not be trusted
/// to exist until [`finish`](Self::finish) has returned successfully; writes
/// after a drain failure surface as broken-pipe errors.
pub struct AsyncUploadHandle {
    writer: DuplexStream,
    drain: JoinHandle<Result<(), StoreError>>,
}

impl AsyncUploadHandle {
    /// Starts an upload to `key`, spawning the drain task.
    pub fn new(store: Arc<dyn FileStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let (writer, mut reader) = tokio::io::duplex(PIPE_BUFFER_BYTES);
        let drain = tokio::spawn(async move {
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes).await?;
            store.put(&key, bytes).await
        });
        AsyncUploadHandle { writer, drain }
    }

    /// The writer feeding the upload.
    pub fn writer(&mut self) -> &mut DuplexStream {
        &mut self.writer
    }

    /// Closes the writer and waits for the drain task to store the object.
    pub async fn finish(mut self) -> Result<(), StoreError> {
        self.writer.shutdown().await?;
        drop(self.writer);
        self.drain
            .await
            .map_err(|e| StoreError::Upload(e.to_string()))?
    }

    /// Aborts the upload and waits for the drain task to stop.
    ///
    /// The drain task may already have stored a partial object under the
    /// target key; callers abandoning a failed transformation must delete
    /// the key afterwards.
    pub async fn abandon(self) {
        drop(self.writer);
        self.drain.abort();
        let _ = self.drain.await;
    }
}
