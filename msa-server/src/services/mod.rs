//! Business services
//!
//! Download side: fetcher -> fetch orchestrator -> archive assembler ->
//! streaming bridge. Upload side: album upload pipeline reporting to the
//! progress store. Plus housekeeping and archive pre-generation.

pub mod album_upload;
pub mod archive;
pub mod archive_pregen;
pub mod archive_stream;
pub mod fetch_orchestrator;
pub mod fetcher;
pub mod housekeeping;
pub mod progress;

pub use album_upload::{AlbumUpload, AlbumUploader, CoverImage, UploadError, UploadOutcome, UploadSettings};
pub use archive::{ArchiveAssembler, ArchiveChunks, ArchiveError, ArchivePolicy, BuildMode, Compression};
pub use archive_pregen::{ArchivePregenerator, PregenJobStatus, PregenReport, PregenRunState};
pub use archive_stream::{build_archive, open_archive, start_archive_stream, ArchiveJob, BuildPhase, BuiltArchive};
pub use fetch_orchestrator::{fetch_all, fetch_stream, FetchOutcome};
pub use fetcher::{AudioFetcher, FetchError, FetchSettings, HttpFetcher};
pub use housekeeping::{Housekeeper, HousekeepingSettings};
pub use progress::{ProgressError, ProgressSettings, ProgressStore};
