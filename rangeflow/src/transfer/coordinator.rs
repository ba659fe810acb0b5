//! Transfer coordinator: parallel range downloads and chunked uploads.
//!
//! A download plans the requested range, runs the chunks through a
//! [`WorkerPool`] and reorders the results through a [`ReassemblySink`]
//! into the caller's [`RangeStream`]:
//!
//! ```text
//!   store ◄─ get_range ─ WorkerPool ─► results ─► ReassemblySink ─► RangeStream
//!                           ▲                          │
//!                           └──── ReorderWindow ◄──────┘ (permit per emitted chunk)
//! ```
//!
//! Each transfer runs under a child of the caller's token. Cancelling the
//! caller's token, dropping the stream, or the first chunk failure all
//! cancel that child, and with it every attempt and retry wait.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::chunk::{ChunkDescriptor, ChunkResult};
use super::job::{TransferJob, TransferSettings};
use super::pool::WorkerPool;
use super::progress::ProgressTracker;
use super::range::ByteRange;
use super::sink::ReassemblySink;
use super::stream::RangeStream;
use super::upload::{sha256_hex, RandomAccessSource, UploadManifest, UploadedChunk};
use super::window::ReorderWindow;
use crate::config::format_size;
use crate::error::{TransferError, TransferResult};
use crate::store::StoreClient;

/// Runs downloads and uploads against one store.
#[derive(Debug, Clone)]
pub struct TransferCoordinator {
    client: StoreClient,
    settings: TransferSettings,
}

impl TransferCoordinator {
    /// Create a coordinator. Fails if `settings` are unusable.
    pub fn new(client: StoreClient, settings: TransferSettings) -> TransferResult<Self> {
        settings.validate()?;
        Ok(Self { client, settings })
    }

    /// The store client transfers go through.
    pub fn client(&self) -> &StoreClient {
        &self.client
    }

    /// Settings applied to every transfer.
    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Stream bytes `start..=end` of an object of `total_size` bytes.
    ///
    /// Must be called from within a Tokio runtime. The transfer starts
    /// immediately and proceeds as the stream is read.
    pub fn open_range_stream(
        &self,
        key: &str,
        total_size: u64,
        start: u64,
        end: u64,
        cancel: &CancellationToken,
    ) -> TransferResult<RangeStream> {
        let range = ByteRange::new(start, end, total_size)?;
        self.download(key, total_size, Some(range), cancel, None)
    }

    /// Stream `range` of an object, or all of it when `range` is `None`.
    ///
    /// An empty object yields an empty stream without touching the store.
    pub fn download(
        &self,
        key: &str,
        total_size: u64,
        range: Option<ByteRange>,
        cancel: &CancellationToken,
        progress: Option<ProgressTracker>,
    ) -> TransferResult<RangeStream> {
        check_key(key)?;
        let mut job = TransferJob::download(total_size, range, &self.settings)?;

        if let Some(progress) = &progress {
            progress.begin(job.len(), job.chunk_count());
        }
        if job.is_empty() {
            if let Some(progress) = &progress {
                progress.finish(true);
            }
            return Ok(RangeStream::empty());
        }

        let runtime = Handle::try_current().map_err(|e| {
            TransferError::InvalidArgument(format!("download needs a Tokio runtime: {}", e))
        })?;

        let token = cancel.child_token();
        let window = ReorderWindow::new(self.settings.reorder_window);
        let (body_tx, body_rx) = mpsc::channel(window.size());
        let stream = RangeStream::new(body_rx, job.len(), Some(token.clone().drop_guard()));

        debug!(
            key,
            range = ?job.range,
            chunks = job.chunk_count(),
            chunk_size = %format_size(job.chunk_size),
            "Starting download"
        );

        let chunks = std::mem::take(&mut job.chunks);
        let transfer = Download {
            client: self.client.clone(),
            key: Arc::from(key),
            pool: WorkerPool::for_job(&job).with_window(window.clone()),
            window,
            sink: match job.range {
                Some(range) => ReassemblySink::for_range(range),
                None => ReassemblySink::for_object(0),
            },
            bytes: job.len(),
            progress,
        };
        runtime.spawn(transfer.run(chunks, token, body_tx));

        Ok(stream)
    }

    /// Upload `total_size` bytes of `source` in parallel chunks.
    ///
    /// Chunk `i` is stored under `key_for(i)`. On failure or cancellation
    /// every chunk that may have been written is deleted (best effort) and
    /// the first error is returned.
    pub async fn upload_parallel<S, K>(
        &self,
        source: Arc<S>,
        total_size: u64,
        key_for: K,
        cancel: &CancellationToken,
        progress: Option<ProgressTracker>,
    ) -> TransferResult<UploadManifest>
    where
        S: RandomAccessSource + ?Sized + 'static,
        K: Fn(usize) -> String + Send + Sync + 'static,
    {
        if total_size > source.size() {
            return Err(TransferError::InvalidArgument(format!(
                "upload of {} bytes from a source of {} bytes",
                total_size,
                source.size()
            )));
        }

        let job = TransferJob::upload(total_size, &self.settings)?;
        let chunk_count = job.chunk_count();
        if let Some(progress) = &progress {
            progress.begin(total_size, chunk_count);
        }
        if job.is_empty() {
            if let Some(progress) = &progress {
                progress.finish(true);
            }
            return Ok(UploadManifest::default());
        }

        let started = Instant::now();
        let token = cancel.child_token();
        let pool = WorkerPool::for_job(&job);
        let key_for = Arc::new(key_for);

        let work = {
            let client = self.client.clone();
            let key_for = Arc::clone(&key_for);
            move |d: ChunkDescriptor, cancel: CancellationToken| {
                let client = client.clone();
                let source = Arc::clone(&source);
                let key = (*key_for)(d.index);
                async move {
                    let len = usize::try_from(d.size()).map_err(|_| {
                        TransferError::InvalidArgument(format!("chunk {} too large", d.index))
                    })?;
                    let data = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                        read = source.read_at(d.start, len) => {
                            read.map_err(|e| TransferError::Source(e.to_string()))?
                        }
                    };
                    let sha256 = sha256_hex(&data);
                    client.put_object(&key, data, &cancel).await?;
                    Ok::<_, TransferError>(UploadedChunk {
                        index: d.index,
                        key,
                        offset: d.start,
                        size: d.size(),
                        sha256,
                    })
                }
            }
        };

        let (results_tx, mut results_rx) =
            mpsc::channel::<ChunkResult<UploadedChunk>>(pool.concurrency());
        let collect = {
            let progress = progress.clone();
            async move {
                let mut results: Vec<ChunkResult<UploadedChunk>> = Vec::new();
                while let Some(result) = results_rx.recv().await {
                    if let Some(progress) = &progress {
                        progress.add_retries(u64::from(result.attempts.saturating_sub(1)));
                        if let Ok(chunk) = &result.outcome {
                            progress.complete_chunk(chunk.size);
                        }
                    }
                    results.push(result);
                }
                results
            }
        };

        let (report, results) =
            tokio::join!(pool.run(job.chunks, work, results_tx, &token), collect);

        if report.is_success() {
            let mut chunks: Vec<UploadedChunk> =
                results.into_iter().filter_map(|r| r.outcome.ok()).collect();
            chunks.sort_by_key(|c| c.index);

            if let Some(progress) = &progress {
                progress.finish(true);
            }
            info!(
                size = %format_size(total_size),
                chunks = chunk_count,
                retries = report.retries,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Upload complete"
            );
            return Ok(UploadManifest { total_size, chunks });
        }

        let error = report.first_error.unwrap_or(TransferError::Cancelled);
        if error.is_cancelled() {
            info!(chunks = chunk_count, "Upload cancelled, removing stored chunks");
        } else {
            warn!(error = %error, "Upload failed, removing stored chunks");
        }

        // Anything dispatched may have reached the store.
        let written: Vec<String> = results
            .iter()
            .filter(|r| r.attempts > 0)
            .map(|r| match &r.outcome {
                Ok(chunk) => chunk.key.clone(),
                Err(_) => (*key_for)(r.index()),
            })
            .collect();
        self.remove_chunks(written).await;

        if let Some(progress) = &progress {
            progress.finish(false);
        }
        Err(error)
    }

    /// Best-effort delete of `keys`; failures are logged, not returned.
    async fn remove_chunks(&self, keys: Vec<String>) {
        // The transfer token is already cancelled; cleanup gets its own.
        let cancel = CancellationToken::new();
        let cancel = &cancel;
        let client = &self.client;
        let timeout = self.settings.chunk_timeout;

        stream::iter(keys)
            .for_each_concurrent(self.settings.concurrency, |key| async move {
                match tokio::time::timeout(timeout, client.delete_object(&key, cancel)).await {
                    Ok(Ok(())) => debug!(key = %key, "Removed chunk of failed upload"),
                    Ok(Err(e)) => warn!(key = %key, error = %e, "Failed to remove chunk"),
                    Err(_) => warn!(key = %key, "Timed out removing chunk"),
                }
            })
            .await;
    }
}

fn check_key(key: &str) -> TransferResult<()> {
    if key.is_empty() {
        return Err(TransferError::InvalidArgument(
            "object key must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// One running download, owned by its background task.
struct Download {
    client: StoreClient,
    key: Arc<str>,
    pool: WorkerPool,
    window: ReorderWindow,
    sink: ReassemblySink,
    bytes: u64,
    progress: Option<ProgressTracker>,
}

impl Download {
    async fn run(
        self,
        chunks: Vec<ChunkDescriptor>,
        token: CancellationToken,
        body: mpsc::Sender<TransferResult<Bytes>>,
    ) {
        let Self {
            client,
            key,
            pool,
            window,
            sink,
            bytes,
            progress,
        } = self;

        let started = Instant::now();
        let chunk_count = chunks.len();
        let work = {
            let key = Arc::clone(&key);
            move |d: ChunkDescriptor, cancel: CancellationToken| {
                let client = client.clone();
                let key = Arc::clone(&key);
                async move { client.get_range(&key, d.start, d.end, &cancel).await }
            }
        };

        let (results_tx, results_rx) = mpsc::channel(pool.concurrency());
        let (report, outcome) = tokio::join!(
            pool.run(chunks, work, results_tx, &token),
            reassemble(results_rx, sink, &body, &window, progress.as_ref(), &token),
        );

        let error = match outcome {
            Ok(()) => {
                if let Some(progress) = &progress {
                    progress.finish(true);
                }
                info!(
                    key = %key,
                    size = %format_size(bytes),
                    chunks = chunk_count,
                    retries = report.retries,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Download complete"
                );
                return;
            }
            // The failure that started cancellation beats its fallout.
            Err(error) => report.first_error.unwrap_or(error),
        };

        if let Some(progress) = &progress {
            progress.finish(false);
        }
        if error.is_cancelled() {
            info!(key = %key, "Download cancelled");
        } else {
            warn!(key = %key, error = %error, "Download failed");
        }
        // The reader may be gone already.
        let _ = body.send(Err(error)).await;
    }
}

/// Feed pool results through the sink into the body channel.
async fn reassemble(
    mut results: mpsc::Receiver<ChunkResult>,
    mut sink: ReassemblySink,
    body: &mpsc::Sender<TransferResult<Bytes>>,
    window: &ReorderWindow,
    progress: Option<&ProgressTracker>,
    token: &CancellationToken,
) -> TransferResult<()> {
    while let Some(result) = results.recv().await {
        if let Some(progress) = progress {
            progress.add_retries(u64::from(result.attempts.saturating_sub(1)));
        }
        if let Err(error) = sink.accept(result) {
            token.cancel();
            return Err(error);
        }

        for payload in sink.drain() {
            let len = payload.len() as u64;
            if body.send(Ok(payload)).await.is_err() {
                debug!("Download reader dropped the stream");
                token.cancel();
                return Err(TransferError::Cancelled);
            }
            window.release(1);
            if let Some(progress) = progress {
                progress.complete_chunk(len);
            }
        }

        if sink.is_complete() {
            return Ok(());
        }
    }

    if sink.is_complete() {
        Ok(())
    } else if token.is_cancelled() {
        Err(TransferError::Cancelled)
    } else {
        Err(TransferError::TerminalStore(format!(
            "chunk results ended at offset {}",
            sink.next_offset()
        )))
    }
}
