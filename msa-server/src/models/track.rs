//! Track descriptors and archive entries
//!
//! A `TrackDescriptor` is the read-only snapshot of one song taken when an
//! archive build starts. A `FetchedEntry` is what ends up inside the ZIP.

use bytes::Bytes;
use serde::Serialize;

/// Fallback title when sanitisation leaves nothing
const UNTITLED: &str = "track";

/// One song of an album, as needed to fetch and name it in an archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackDescriptor {
    pub id: String,
    pub title: String,
    /// 1-based position within the album, unique per album
    pub sequence_number: u32,
    pub remote_audio_uri: String,
}

impl TrackDescriptor {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        sequence_number: u32,
        remote_audio_uri: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            sequence_number,
            remote_audio_uri: remote_audio_uri.into(),
        }
    }

    /// Deterministic file name inside the album archive
    ///
    /// `{sequence_number:02} - {sanitized_title}.mp3`
    pub fn archive_filename(&self) -> String {
        format!(
            "{:02} - {}.mp3",
            self.sequence_number,
            sanitize_title(&self.title)
        )
    }
}

/// Fetched audio ready to be written into an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedEntry {
    pub archive_filename: String,
    pub payload: Bytes,
}

impl FetchedEntry {
    pub fn from_descriptor(descriptor: &TrackDescriptor, payload: Bytes) -> Self {
        Self {
            archive_filename: descriptor.archive_filename(),
            payload,
        }
    }
}

/// Strip every character outside alphanumerics, space, `-` and `_`
///
/// The result never contains path separators or `..`, so a reader extracting
/// the archive cannot be walked out of its target directory.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect();
    let trimmed = cleaned.trim();

    if trimmed.is_empty() {
        UNTITLED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Song row fields needed to build descriptors
#[derive(Debug, Clone)]
pub struct TrackSource {
    pub id: String,
    pub title: Option<String>,
    pub track_number: Option<i64>,
    pub audio_url: Option<String>,
}

/// Build descriptors from song rows already ordered by track number
///
/// Rows without an audio URL are skipped. A missing or non-positive track
/// number defaults to the ordinal position. If the resulting numbers still
/// collide, the whole list is renumbered by position so archive filenames stay
/// unique.
pub fn descriptors_from_sources(sources: Vec<TrackSource>) -> Vec<TrackDescriptor> {
    let mut descriptors: Vec<TrackDescriptor> = sources
        .into_iter()
        .enumerate()
        .filter_map(|(index, source)| {
            let uri = source.audio_url.filter(|u| !u.trim().is_empty())?;
            let ordinal = (index + 1) as u32;
            let sequence_number = source
                .track_number
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(ordinal);
            Some(TrackDescriptor {
                id: source.id,
                title: source.title.unwrap_or_else(|| UNTITLED.to_string()),
                sequence_number,
                remote_audio_uri: uri,
            })
        })
        .collect();

    let mut seen = std::collections::HashSet::new();
    let unique = descriptors.iter().all(|d| seen.insert(d.sequence_number));
    if !unique {
        tracing::warn!(
            track_count = descriptors.len(),
            "Duplicate track numbers, renumbering album by position"
        );
        for (index, descriptor) in descriptors.iter_mut().enumerate() {
            descriptor.sequence_number = (index + 1) as u32;
        }
    }

    descriptors
}
