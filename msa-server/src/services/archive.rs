//! Album archive assembler
//!
//! Writes a standard ZIP container with the `zip` crate and releases its bytes
//! incrementally. `ZipWriter` needs `Write + Seek` because it patches each
//! local header (CRC and sizes) once the entry's data is written. The patch
//! only ever touches the entry currently being written, so everything before
//! the start of that entry is final and can be handed out.
//!
//! ```text
//!   released          sealed, not yet released      open entry
//! [..........][=========================|+++++++++++++++++++++]
//!            base                   sealed_upto               end
//! ```

use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use std::collections::HashSet;
use std::io::{self, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::fetcher::FetchSettings;
use super::fetch_orchestrator::DEFAULT_MAX_CONCURRENCY;

/// Default chunk size for released archive bytes
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;
pub const MIN_CHUNK_SIZE: usize = 64 * 1024;
pub const MAX_CHUNK_SIZE: usize = 256 * 1024;

/// Default depth of the producer/consumer queue
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// Archive build errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive already finalized")]
    AlreadyFinalized,

    #[error("Duplicate archive entry: {0}")]
    DuplicateEntry(String),

    #[error("Album has no tracks with audio")]
    NoTracksAvailable,

    #[error("No songs could be fetched ({attempted} attempted)")]
    AllFetchesFailed { attempted: usize },

    #[error("Archive build cancelled")]
    Cancelled,

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Entry compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression; audio is already compressed
    #[default]
    Stored,
    Deflated,
}

/// How the download pipeline delivers an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Producer task plus bounded queue, bytes flow while fetching
    #[default]
    Streaming,
    /// Fetch everything, zip in memory, then send
    Buffered,
}

/// Archive pipeline policy (`[archive]` section)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ArchivePolicy {
    pub mode: BuildMode,
    pub max_concurrency: usize,
    pub compression: Compression,
    /// Size of released chunks, clamped to 64-256 KiB
    pub chunk_size: usize,
    pub queue_depth: usize,
    /// Redirect downloads to a pre-generated archive when one exists
    pub prefer_pregenerated: bool,
    pub fetch: FetchSettings,
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self {
            mode: BuildMode::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            compression: Compression::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            prefer_pregenerated: false,
            fetch: FetchSettings::default(),
        }
    }
}

impl ArchivePolicy {
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
    }

    fn file_options(&self) -> SimpleFileOptions {
        let method = match self.compression {
            Compression::Stored => CompressionMethod::Stored,
            Compression::Deflated => CompressionMethod::Deflated,
        };
        SimpleFileOptions::default().compression_method(method)
    }
}

#[derive(Debug, Default)]
struct SinkState {
    /// Absolute offset of `data[0]`
    base: u64,
    data: Vec<u8>,
    /// Absolute write cursor
    pos: u64,
}

/// In-memory `Write + Seek` target whose front can be released
#[derive(Debug, Clone, Default)]
struct ReleasingSink {
    state: Arc<Mutex<SinkState>>,
}

impl ReleasingSink {
    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn position(&self) -> u64 {
        self.lock().pos
    }

    /// Release whole chunks lying entirely below `limit`
    fn release_chunks(&self, limit: u64, chunk_size: usize) -> Vec<Bytes> {
        let mut state = self.lock();
        let available = limit.saturating_sub(state.base) as usize;
        let count = available / chunk_size;
        if count == 0 {
            return Vec::new();
        }

        let take = count * chunk_size;
        let rest = state.data.split_off(take);
        let mut released = Bytes::from(std::mem::replace(&mut state.data, rest));
        state.base += take as u64;

        (0..count).map(|_| released.split_to(chunk_size)).collect()
    }

    /// Release everything that is left
    fn release_all(&self) -> Bytes {
        let mut state = self.lock();
        let data = std::mem::take(&mut state.data);
        state.base += data.len() as u64;
        Bytes::from(data)
    }
}

impl Write for ReleasingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.pos < state.base {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "write into released archive region",
            ));
        }

        let offset = (state.pos - state.base) as usize;
        let end = offset + buf.len();
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[offset..end].copy_from_slice(buf);
        state.pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for ReleasingSink {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let mut state = self.lock();
        let end = state.base as i128 + state.data.len() as i128;
        let next = match target {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::End(delta) => end + delta as i128,
            SeekFrom::Current(delta) => state.pos as i128 + delta as i128,
        };

        if next < state.base as i128 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek to {} before released offset {}", next, state.base),
            ));
        }

        state.pos = next as u64;
        Ok(state.pos)
    }
}

/// Incremental ZIP writer for one archive build
pub struct ArchiveAssembler {
    writer: Option<ZipWriter<ReleasingSink>>,
    sink: ReleasingSink,
    options: SimpleFileOptions,
    chunk_size: usize,
    names: HashSet<String>,
    sealed_upto: u64,
}

impl ArchiveAssembler {
    /// Start an empty archive
    pub fn begin(policy: &ArchivePolicy) -> Self {
        let sink = ReleasingSink::default();
        Self {
            writer: Some(ZipWriter::new(sink.clone())),
            sink,
            options: policy.file_options(),
            chunk_size: policy.effective_chunk_size(),
            names: HashSet::new(),
            sealed_upto: 0,
        }
    }

    /// Number of entries written so far
    pub fn entry_count(&self) -> usize {
        self.names.len()
    }

    pub fn is_finalized(&self) -> bool {
        self.writer.is_none()
    }

    /// Append one file
    ///
    /// Adding an entry seals every entry before it.
    pub fn add_entry(&mut self, filename: &str, payload: &[u8]) -> Result<(), ArchiveError> {
        let writer = self.writer.as_mut().ok_or(ArchiveError::AlreadyFinalized)?;
        if self.names.contains(filename) {
            return Err(ArchiveError::DuplicateEntry(filename.to_string()));
        }

        let entry_start = self.sink.position();
        writer.start_file(filename, self.options)?;
        self.sealed_upto = entry_start;
        writer.write_all(payload)?;
        self.names.insert(filename.to_string());

        Ok(())
    }

    /// Take the full chunks of sealed bytes produced so far
    pub fn drain_chunks(&mut self) -> Vec<Bytes> {
        self.sink.release_chunks(self.sealed_upto, self.chunk_size)
    }

    /// Write the central directory and hand out the remaining bytes
    pub fn finalize(&mut self) -> Result<ArchiveChunks, ArchiveError> {
        let writer = self.writer.take().ok_or(ArchiveError::AlreadyFinalized)?;
        writer.finish()?;

        Ok(ArchiveChunks::new(self.sink.release_all(), self.chunk_size))
    }
}

/// Immutable finalized archive bytes, iterable in fixed-size chunks
#[derive(Debug, Clone)]
pub struct ArchiveChunks {
    bytes: Bytes,
    chunk_size: usize,
}

impl ArchiveChunks {
    pub(crate) fn new(bytes: Bytes, chunk_size: usize) -> Self {
        Self {
            bytes,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Chunk iterator; every chunk but the last is exactly `chunk_size` long
    pub fn iter(&self) -> ChunkIter {
        ChunkIter {
            rest: self.bytes.clone(),
            chunk_size: self.chunk_size,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl IntoIterator for ArchiveChunks {
    type Item = Bytes;
    type IntoIter = ChunkIter;

    fn into_iter(self) -> ChunkIter {
        ChunkIter {
            rest: self.bytes,
            chunk_size: self.chunk_size,
        }
    }
}

pub struct ChunkIter {
    rest: Bytes,
    chunk_size: usize,
}

impl Iterator for ChunkIter {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.rest.is_empty() {
            return None;
        }
        let take = self.chunk_size.min(self.rest.len());
        Some(self.rest.split_to(take))
    }
}

/// Join released chunks and finalized tail into one buffer
pub fn concat_chunks(released: Vec<Bytes>, tail: ArchiveChunks) -> Bytes {
    let total = released.iter().map(Bytes::len).sum::<usize>() + tail.len();
    let mut out = BytesMut::with_capacity(total);
    for chunk in released.into_iter().chain(tail) {
        out.extend_from_slice(&chunk);
    }
    out.freeze()
}
