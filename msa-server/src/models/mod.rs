//! Domain models shared by services and API handlers

pub mod album;
pub mod progress;
pub mod track;

pub use album::{parse_schedule, AlbumMetadata, PublishSchedule, Visibility};
pub use progress::{Checkpoint, OperationStatus};
pub use track::{descriptors_from_sources, sanitize_title, FetchedEntry, TrackDescriptor, TrackSource};
