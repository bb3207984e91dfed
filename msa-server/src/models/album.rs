//! Album upload metadata and publishing rules

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Maximum length of the title part of a generated slug
const SLUG_TITLE_MAX: usize = 50;

/// How an uploaded album becomes visible
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishSchedule {
    /// Visible as soon as the upload finishes (subject to `is_public`)
    Immediate,
    /// Kept private until the given instant
    At(DateTime<Utc>),
}

/// Metadata submitted alongside an album archive
#[derive(Debug, Clone)]
pub struct AlbumMetadata {
    pub title: String,
    pub description: String,
    pub genre: String,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub schedule: PublishSchedule,
    pub release_date: Option<String>,
    pub custom_slug: Option<String>,
    pub artist_id: String,
    pub artist_name: String,
}

/// Visibility columns derived from the metadata at upload time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Visibility {
    pub is_private: bool,
    pub is_scheduled: bool,
    pub scheduled_publish_at: Option<DateTime<Utc>>,
}

impl AlbumMetadata {
    /// Decide visibility columns
    ///
    /// A schedule that is already in the past publishes immediately.
    pub fn visibility(&self, now: DateTime<Utc>) -> Visibility {
        match self.schedule {
            PublishSchedule::At(when) if when > now => Visibility {
                is_private: true,
                is_scheduled: true,
                scheduled_publish_at: Some(when),
            },
            PublishSchedule::At(_) => Visibility {
                is_private: false,
                is_scheduled: false,
                scheduled_publish_at: None,
            },
            PublishSchedule::Immediate => Visibility {
                is_private: !self.is_public,
                is_scheduled: false,
                scheduled_publish_at: None,
            },
        }
    }

    /// URL slug: the custom one if given, otherwise title plus a short unique suffix
    pub fn slug(&self) -> String {
        if let Some(custom) = self.custom_slug.as_deref().filter(|s| !s.trim().is_empty()) {
            return custom.trim().to_lowercase().replace(' ', "-");
        }

        let base: String = self
            .title
            .to_lowercase()
            .replace(' ', "-")
            .chars()
            .filter(|c| *c != '.' && *c != ',')
            .take(SLUG_TITLE_MAX)
            .collect();
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}-{}", base, &suffix[..8])
    }

    /// Release year derived from the release date (`YYYY-...`)
    pub fn release_year(&self) -> Option<String> {
        self.release_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .map(str::to_string)
    }
}

/// Parse a client-supplied schedule timestamp
///
/// Accepts RFC 3339 (`2025-12-18T05:00:00.000Z`) and the legacy split
/// `date` + `time` form (`2025-12-18`, `05:00`).
pub fn parse_schedule(
    iso: Option<&str>,
    legacy_date: Option<&str>,
    legacy_time: Option<&str>,
) -> Option<DateTime<Utc>> {
    if let Some(iso) = iso.filter(|s| !s.trim().is_empty()) {
        return DateTime::parse_from_rfc3339(iso.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }

    match (legacy_date, legacy_time) {
        (Some(date), Some(time)) if !date.is_empty() && !time.is_empty() => {
            DateTime::parse_from_rfc3339(&format!("{}T{}:00Z", date, time))
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }
        _ => None,
    }
}
