//! Provider adapter and retry policy. The orchestrator sees one
//! `VideoSearcher` attempt; transient-failure retry lives here. Quota
//! errors pass straight through — they halt the run and are never retried.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use studyreel_common::{Candidate, ProviderError};
use youtube_client::{YoutubeClient, YoutubeError};

use crate::traits::{ProviderResult, VideoSearcher};

// ---------------------------------------------------------------------------
// VideoSearcher impl for YoutubeClient
// ---------------------------------------------------------------------------

#[async_trait]
impl VideoSearcher for YoutubeClient {
    async fn search(&self, query: &str, max_results: u32) -> ProviderResult<Vec<Candidate>> {
        let hits = self
            .search_videos(query, max_results)
            .await
            .map_err(map_provider_error)?;
        Ok(hits
            .into_iter()
            .map(|hit| Candidate {
                external_id: hit.video_id,
                title: hit.snippet.title,
                description: hit.snippet.description,
                source_channel: hit.snippet.channel_title,
                published_at: hit.snippet.published_at,
                duration_seconds: None,
            })
            .collect())
    }

    async fn fetch_durations(&self, ids: &[String]) -> ProviderResult<HashMap<String, u32>> {
        self.video_durations(ids).await.map_err(map_provider_error)
    }

    fn search_cost(&self) -> u32 {
        youtube_client::SEARCH_LIST_COST
    }

    fn details_cost(&self) -> u32 {
        youtube_client::VIDEOS_LIST_COST
    }
}

fn map_provider_error(err: YoutubeError) -> ProviderError {
    match err {
        YoutubeError::QuotaExceeded => ProviderError::QuotaExceeded,
        YoutubeError::Network(m) => ProviderError::Transient(m),
        YoutubeError::Api { status, message } => {
            ProviderError::Transient(format!("status {status}: {message}"))
        }
        YoutubeError::Parse(m) => ProviderError::Parse(m),
    }
}

// ---------------------------------------------------------------------------
// RetryingSearcher
// ---------------------------------------------------------------------------

/// Max attempts per provider call, counting the first.
const MAX_ATTEMPTS: u32 = 3;
/// Base backoff; actual delay is base * 3^attempt + jitter (0-250ms).
const RETRY_BASE: Duration = Duration::from_millis(500);

pub struct RetryingSearcher<S> {
    inner: S,
    max_attempts: u32,
}

impl<S: VideoSearcher> RetryingSearcher<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    async fn retry<T, F, Fut>(&self, what: &str, mut call: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ProviderResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(ProviderError::Transient(detail)) if attempt + 1 < self.max_attempts => {
                    let backoff = RETRY_BASE * 3u32.pow(attempt);
                    let jitter = Duration::from_millis(rand::rng().random_range(0..250));
                    warn!(
                        what,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        detail = detail.as_str(),
                        "Transient provider error, retrying after backoff"
                    );
                    tokio::time::sleep(backoff + jitter).await;
                    attempt += 1;
                }
                // Quota and parse errors are not retried; exhausted
                // transient errors surface to the caller's tally.
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<S: VideoSearcher> VideoSearcher for RetryingSearcher<S> {
    async fn search(&self, query: &str, max_results: u32) -> ProviderResult<Vec<Candidate>> {
        self.retry("search", || self.inner.search(query, max_results))
            .await
    }

    async fn fetch_durations(&self, ids: &[String]) -> ProviderResult<HashMap<String, u32>> {
        self.retry("fetch_durations", || self.inner.fetch_durations(ids))
            .await
    }

    fn search_cost(&self) -> u32 {
        self.inner.search_cost()
    }

    fn details_cost(&self) -> u32 {
        self.inner.details_cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{candidate, MockSearcher};

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let mock = MockSearcher::new()
            .with_page(Err(ProviderError::Transient("503".into())))
            .with_page(Ok(vec![candidate("vid1", "Armbar", 300)]));
        let searcher = RetryingSearcher::new(mock);

        let results = searcher.search("armbar instructional", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(searcher.inner.search_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_exhaust_after_max_attempts() {
        let mock = MockSearcher::new()
            .with_page(Err(ProviderError::Transient("503".into())))
            .with_page(Err(ProviderError::Transient("503".into())));
        let searcher = RetryingSearcher::new(mock).with_max_attempts(2);

        let err = searcher.search("armbar", 10).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transient(_)));
        assert_eq!(searcher.inner.search_calls(), 2);
    }

    #[tokio::test]
    async fn quota_errors_are_never_retried() {
        let mock = MockSearcher::new().with_page(Err(ProviderError::QuotaExceeded));
        let searcher = RetryingSearcher::new(mock);

        let err = searcher.search("armbar", 10).await.unwrap_err();
        assert!(matches!(err, ProviderError::QuotaExceeded));
        assert_eq!(searcher.inner.search_calls(), 1);
    }
}
