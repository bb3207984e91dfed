//! Album archive pipeline
//!
//! Two ways to deliver the same archive, selected by [`ArchivePolicy::mode`]:
//!
//! - **Streaming**: a producer task fetches tracks (ordered, bounded
//!   concurrency) and pushes them onto a bounded queue. The consumer side is
//!   the HTTP body stream: it feeds entries into the assembler and forwards
//!   sealed chunks as soon as they exist.
//! - **Buffered**: fetch everything, assemble in memory, return the bytes.
//!
//! Build phases: `Init -> Fetching -> Assembling -> Finalizing -> Streaming -> Done`,
//! with `Failed` reachable from any phase before `Done`.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use msa_common::RetryPolicy;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::archive::{concat_chunks, ArchiveAssembler, ArchiveChunks, ArchiveError, ArchivePolicy, BuildMode};
use super::fetch_orchestrator::{fetch_all, fetch_stream};
use super::fetcher::{AudioFetcher, FetchError};
use crate::models::{FetchedEntry, TrackDescriptor};

/// Archive build phase, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Init,
    Fetching,
    Assembling,
    Finalizing,
    Streaming,
    Done,
    Failed,
}

/// Request-scoped archive build
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    pub album_id: String,
    pub descriptors: Vec<TrackDescriptor>,
}

/// Archive bytes as an HTTP-ready stream
pub type ArchiveByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ArchiveError>> + Send>>;

/// Items flowing from producer to consumer
#[derive(Debug)]
enum QueueItem {
    Entry(FetchedEntry),
    /// Every descriptor has been handled and at least one entry was sent
    Finished { fetched: usize, failed: usize },
    /// Nothing could be fetched
    Failed(ArchiveError),
}

fn log_phase(album_id: &str, phase: BuildPhase) {
    tracing::debug!(album_id, phase = ?phase, "Archive build phase");
}

/// Open the archive for `job` in the mode chosen by `policy`
///
/// Errors returned here happen before any byte is produced, so the caller can
/// still answer with a proper error status.
pub async fn open_archive(
    fetcher: Arc<dyn AudioFetcher>,
    job: ArchiveJob,
    policy: &ArchivePolicy,
    retry: &RetryPolicy,
) -> Result<ArchiveByteStream, ArchiveError> {
    match policy.mode {
        BuildMode::Streaming => {
            let stream = start_archive_stream(fetcher, job, policy, retry).await?;
            Ok(Box::pin(stream))
        }
        BuildMode::Buffered => {
            let built = build_archive(fetcher, job, policy, retry).await?;
            let chunks = ArchiveChunks::new(built.bytes, policy.effective_chunk_size());
            Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
        }
    }
}

/// Start the producer and return the consumer stream
///
/// Waits for the first queue item so that an album where every fetch fails
/// comes back as `Err(AllFetchesFailed)` instead of an empty body. Dropping the
/// returned stream cancels the producer and its in-flight fetches.
pub async fn start_archive_stream(
    fetcher: Arc<dyn AudioFetcher>,
    job: ArchiveJob,
    policy: &ArchivePolicy,
    retry: &RetryPolicy,
) -> Result<impl Stream<Item = Result<Bytes, ArchiveError>> + Send + 'static, ArchiveError> {
    let ArchiveJob { album_id, descriptors } = job;
    log_phase(&album_id, BuildPhase::Init);

    if descriptors.is_empty() {
        log_phase(&album_id, BuildPhase::Failed);
        return Err(ArchiveError::NoTracksAvailable);
    }

    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(policy.queue_depth.max(1));

    tokio::spawn(produce(
        fetcher,
        descriptors,
        policy.max_concurrency,
        retry.clone(),
        tx,
        cancel.clone(),
        album_id.clone(),
    ));

    // Dropping the guard (early return or stream drop) stops the producer
    let guard = cancel.drop_guard();

    let first = match rx.recv().await {
        Some(QueueItem::Failed(e)) => {
            log_phase(&album_id, BuildPhase::Failed);
            return Err(e);
        }
        Some(item) => item,
        None => return Err(ArchiveError::Cancelled),
    };

    let policy = policy.clone();
    let stream = async_stream::try_stream! {
        let _guard = guard;
        let mut assembler = ArchiveAssembler::begin(&policy);
        let mut pending = Some(first);
        let mut bytes_sent = 0usize;
        log_phase(&album_id, BuildPhase::Assembling);

        loop {
            let item = match pending.take() {
                Some(item) => item,
                None => match rx.recv().await {
                    Some(item) => item,
                    None => {
                        log_phase(&album_id, BuildPhase::Failed);
                        Err::<(), _>(ArchiveError::Cancelled)?;
                        break;
                    }
                },
            };

            match item {
                QueueItem::Entry(entry) => {
                    assembler.add_entry(&entry.archive_filename, &entry.payload)?;
                    for chunk in assembler.drain_chunks() {
                        bytes_sent += chunk.len();
                        yield chunk;
                    }
                }
                QueueItem::Finished { fetched, failed } => {
                    log_phase(&album_id, BuildPhase::Finalizing);
                    let tail = assembler.finalize()?;
                    log_phase(&album_id, BuildPhase::Streaming);
                    for chunk in tail {
                        bytes_sent += chunk.len();
                        yield chunk;
                    }
                    log_phase(&album_id, BuildPhase::Done);
                    tracing::info!(
                        album_id = %album_id,
                        fetched,
                        failed,
                        bytes = bytes_sent,
                        "Album archive streamed"
                    );
                    break;
                }
                QueueItem::Failed(e) => {
                    log_phase(&album_id, BuildPhase::Failed);
                    Err::<(), _>(e)?;
                    break;
                }
            }
        }
    };

    Ok(stream)
}

/// Producer half of the streaming bridge
async fn produce(
    fetcher: Arc<dyn AudioFetcher>,
    descriptors: Vec<TrackDescriptor>,
    max_concurrency: usize,
    retry: RetryPolicy,
    tx: mpsc::Sender<QueueItem>,
    cancel: CancellationToken,
    album_id: String,
) {
    log_phase(&album_id, BuildPhase::Fetching);
    let attempted = descriptors.len();
    let outcomes = fetch_stream(fetcher, descriptors, max_concurrency, retry);
    tokio::pin!(outcomes);

    let mut fetched = 0usize;
    let mut failed = 0usize;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(album_id = %album_id, fetched, "Archive producer cancelled (client gone)");
                return;
            }
            next = outcomes.next() => next,
        };

        let Some((_, result)) = next else { break };
        match result {
            Ok(entry) => {
                fetched += 1;
                let sent = tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(QueueItem::Entry(entry)) => sent,
                };
                if sent.is_err() {
                    // Consumer dropped the receiver
                    return;
                }
            }
            Err(_) => failed += 1,
        }
    }

    let last = if fetched == 0 {
        tracing::error!(album_id = %album_id, attempted, "No songs could be fetched for album");
        QueueItem::Failed(ArchiveError::AllFetchesFailed { attempted })
    } else {
        QueueItem::Finished { fetched, failed }
    };
    let _ = tx.send(last).await;
}

/// Fully assembled archive
#[derive(Debug, Clone)]
pub struct BuiltArchive {
    pub bytes: Bytes,
    /// Entry names in archive order
    pub entries: Vec<String>,
    /// Tracks left out, with the reason
    pub skipped: Vec<(TrackDescriptor, FetchError)>,
}

/// Fetch every track, then assemble the whole archive in memory
pub async fn build_archive(
    fetcher: Arc<dyn AudioFetcher>,
    job: ArchiveJob,
    policy: &ArchivePolicy,
    retry: &RetryPolicy,
) -> Result<BuiltArchive, ArchiveError> {
    let ArchiveJob { album_id, descriptors } = job;
    log_phase(&album_id, BuildPhase::Init);

    if descriptors.is_empty() {
        log_phase(&album_id, BuildPhase::Failed);
        return Err(ArchiveError::NoTracksAvailable);
    }

    let attempted = descriptors.len();
    log_phase(&album_id, BuildPhase::Fetching);
    let outcomes = fetch_all(fetcher, descriptors, policy.max_concurrency, retry).await;

    log_phase(&album_id, BuildPhase::Assembling);
    let mut assembler = ArchiveAssembler::begin(policy);
    let mut released = Vec::new();
    let mut entries = Vec::new();
    let mut skipped = Vec::new();

    for (descriptor, result) in outcomes {
        match result {
            Ok(entry) => {
                assembler.add_entry(&entry.archive_filename, &entry.payload)?;
                released.extend(assembler.drain_chunks());
                entries.push(entry.archive_filename);
            }
            Err(e) => skipped.push((descriptor, e)),
        }
    }

    if entries.is_empty() {
        log_phase(&album_id, BuildPhase::Failed);
        tracing::error!(album_id = %album_id, attempted, "No songs could be fetched for album");
        return Err(ArchiveError::AllFetchesFailed { attempted });
    }

    log_phase(&album_id, BuildPhase::Finalizing);
    let tail = assembler.finalize()?;
    let bytes = concat_chunks(released, tail);
    log_phase(&album_id, BuildPhase::Done);

    tracing::info!(
        album_id = %album_id,
        entries = entries.len(),
        skipped = skipped.len(),
        bytes = bytes.len(),
        "Album archive built"
    );

    Ok(BuiltArchive {
        bytes,
        entries,
        skipped,
    })
}
