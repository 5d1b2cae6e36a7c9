pub mod error;
pub mod types;

pub use error::{Result, YoutubeError};
pub use types::{parse_iso8601_duration, SearchHit, Snippet};

use std::collections::HashMap;

use tracing::{info, warn};
use types::{ErrorBody, SearchResponse, VideosResponse};

const BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Approximate quota units charged per `search.list` call.
pub const SEARCH_LIST_COST: u32 = 100;

/// Approximate quota units charged per `videos.list` call (any id batch).
pub const VIDEOS_LIST_COST: u32 = 1;

/// Max video ids accepted by a single `videos.list` call.
const VIDEOS_LIST_BATCH: usize = 50;

pub struct YoutubeClient {
    client: reqwest::Client,
    api_key: String,
}

impl YoutubeClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// Run a `search.list` query restricted to videos. Result ordering and
    /// content are not stable across identical calls.
    pub async fn search_videos(&self, query: &str, max_results: u32) -> Result<Vec<SearchHit>> {
        let url = format!("{BASE_URL}/search");
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("q", query),
                ("maxResults", &max_results.to_string()),
                ("key", &self.api_key),
            ])
            .send()
            .await?;

        let data: SearchResponse = Self::check(resp).await?;

        let hits: Vec<SearchHit> = data
            .items
            .into_iter()
            .filter_map(|item| {
                let video_id = item.id.video_id?;
                Some(SearchHit {
                    video_id,
                    snippet: item.snippet,
                })
            })
            .collect();

        info!(query, count = hits.len(), "YouTube search complete");
        Ok(hits)
    }

    /// Fetch durations for up to 50 video ids in one `videos.list` call.
    /// Ids the API does not return (deleted/private videos) are absent from
    /// the map.
    pub async fn video_durations(&self, ids: &[String]) -> Result<HashMap<String, u32>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        if ids.len() > VIDEOS_LIST_BATCH {
            return Err(YoutubeError::Parse(format!(
                "videos.list accepts at most {VIDEOS_LIST_BATCH} ids, got {}",
                ids.len()
            )));
        }

        let url = format!("{BASE_URL}/videos");
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("part", "contentDetails"),
                ("id", &ids.join(",")),
                ("key", &self.api_key),
            ])
            .send()
            .await?;

        let data: VideosResponse = Self::check(resp).await?;

        let mut durations = HashMap::with_capacity(data.items.len());
        for item in data.items {
            match parse_iso8601_duration(&item.content_details.duration) {
                Ok(secs) => {
                    durations.insert(item.id, secs);
                }
                Err(e) => {
                    warn!(video_id = item.id.as_str(), error = %e, "Unparseable video duration");
                }
            }
        }
        Ok(durations)
    }

    /// Map a non-success response into the error taxonomy. A 403 whose body
    /// carries a quota reason becomes `QuotaExceeded`; everything else keeps
    /// its status and message.
    async fn check<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }

        let body = resp.text().await.unwrap_or_default();
        if status.as_u16() == 403 {
            if let Ok(parsed) = serde_json::from_str::<ErrorBody>(&body) {
                let quota = parsed.error.errors.iter().any(|e| {
                    matches!(
                        e.reason.as_str(),
                        "quotaExceeded" | "dailyLimitExceeded" | "rateLimitExceeded"
                    )
                });
                if quota {
                    return Err(YoutubeError::QuotaExceeded);
                }
                return Err(YoutubeError::Api {
                    status: status.as_u16(),
                    message: parsed.error.message,
                });
            }
        }

        Err(YoutubeError::Api {
            status: status.as_u16(),
            message: body,
        })
    }
}
