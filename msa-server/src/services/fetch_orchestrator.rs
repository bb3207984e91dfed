//! Parallel fetch orchestrator
//!
//! Fetches the audio for a list of track descriptors with bounded
//! concurrency. Results come back in descriptor order no matter which fetch
//! finishes first, and a failed track is a typed result rather than an abort.

use futures::stream::{self, Stream, StreamExt};
use msa_common::RetryPolicy;
use std::sync::Arc;

use super::fetcher::{AudioFetcher, FetchError};
use crate::models::{FetchedEntry, TrackDescriptor};

/// Default number of concurrent fetches per archive build
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Outcome of fetching one track
pub type FetchOutcome = (TrackDescriptor, Result<FetchedEntry, FetchError>);

/// Ordered stream of fetch outcomes
///
/// At most `max_concurrency` fetches are in flight. Each fetch goes through
/// `retry`, so only transient failures are attempted again. Dropping the
/// stream drops the in-flight fetches.
pub fn fetch_stream(
    fetcher: Arc<dyn AudioFetcher>,
    descriptors: Vec<TrackDescriptor>,
    max_concurrency: usize,
    retry: RetryPolicy,
) -> impl Stream<Item = FetchOutcome> + Send + 'static {
    stream::iter(descriptors)
        .map(move |descriptor| {
            let fetcher = fetcher.clone();
            let retry = retry.clone();
            async move {
                let result = {
                    let fetcher = &fetcher;
                    let uri = descriptor.remote_audio_uri.as_str();
                    retry.run("audio fetch", move || fetcher.fetch(uri)).await
                };

                match result {
                    Ok(payload) => {
                        let entry = FetchedEntry::from_descriptor(&descriptor, payload);
                        (descriptor, Ok(entry))
                    }
                    Err(e) => {
                        tracing::warn!(
                            track_id = %descriptor.id,
                            uri = %descriptor.remote_audio_uri,
                            error = %e,
                            "Track fetch failed, omitting from archive"
                        );
                        (descriptor, Err(e))
                    }
                }
            }
        })
        .buffered(max_concurrency.max(1))
}

/// Fetch every descriptor and collect the outcomes in input order
///
/// Empty input returns immediately without touching the fetcher.
pub async fn fetch_all(
    fetcher: Arc<dyn AudioFetcher>,
    descriptors: Vec<TrackDescriptor>,
    max_concurrency: usize,
    retry: &RetryPolicy,
) -> Vec<FetchOutcome> {
    if descriptors.is_empty() {
        return Vec::new();
    }

    let total = descriptors.len();
    let outcomes: Vec<FetchOutcome> = fetch_stream(fetcher, descriptors, max_concurrency, retry.clone())
        .collect()
        .await;

    let fetched = outcomes.iter().filter(|(_, r)| r.is_ok()).count();
    tracing::info!(total, fetched, failed = total - fetched, "Parallel fetch finished");

    outcomes
}
