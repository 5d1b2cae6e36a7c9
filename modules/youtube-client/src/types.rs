use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Result, YoutubeError};

// --- search.list ---

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchItem {
    pub id: SearchItemId,
    pub snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchItemId {
    /// Absent for channel/playlist results even with `type=video` requested.
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub channel_title: String,
    pub published_at: DateTime<Utc>,
}

/// One video hit from `search.list`.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub video_id: String,
    pub snippet: Snippet,
}

// --- videos.list ---

#[derive(Debug, Deserialize)]
pub(crate) struct VideosResponse {
    #[serde(default)]
    pub items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideoItem {
    pub id: String,
    pub content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentDetails {
    pub duration: String,
}

// --- error body ---

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorItem {
    #[serde(default)]
    pub reason: String,
}

// --- ISO 8601 duration ---

/// Parse a YouTube `contentDetails.duration` value (`PT4M13S`, `PT1H2M`,
/// `P1DT2H`) into whole seconds.
pub fn parse_iso8601_duration(raw: &str) -> Result<u32> {
    let rest = raw
        .strip_prefix('P')
        .ok_or_else(|| YoutubeError::Parse(format!("invalid duration: {raw}")))?;

    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, t),
        None => (rest, ""),
    };

    let mut seconds: u64 = 0;
    let mut number = String::new();

    for ch in date_part.chars() {
        if ch.is_ascii_digit() {
            number.push(ch);
        } else {
            let value: u64 = number
                .parse()
                .map_err(|_| YoutubeError::Parse(format!("invalid duration: {raw}")))?;
            number.clear();
            match ch {
                'D' => seconds += value * 86_400,
                'W' => seconds += value * 7 * 86_400,
                _ => return Err(YoutubeError::Parse(format!("invalid duration: {raw}"))),
            }
        }
    }

    for ch in time_part.chars() {
        if ch.is_ascii_digit() {
            number.push(ch);
        } else {
            let value: u64 = number
                .parse()
                .map_err(|_| YoutubeError::Parse(format!("invalid duration: {raw}")))?;
            number.clear();
            match ch {
                'H' => seconds += value * 3_600,
                'M' => seconds += value * 60,
                'S' => seconds += value,
                _ => return Err(YoutubeError::Parse(format!("invalid duration: {raw}"))),
            }
        }
    }

    if !number.is_empty() {
        return Err(YoutubeError::Parse(format!("invalid duration: {raw}")));
    }

    Ok(seconds.min(u32::MAX as u64) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minute_second_durations() {
        assert_eq!(parse_iso8601_duration("PT4M13S").unwrap(), 253);
        assert_eq!(parse_iso8601_duration("PT65S").unwrap(), 65);
        assert_eq!(parse_iso8601_duration("PT1M10S").unwrap(), 70);
    }

    #[test]
    fn parses_hour_and_day_durations() {
        assert_eq!(parse_iso8601_duration("PT1H2M3S").unwrap(), 3_723);
        assert_eq!(parse_iso8601_duration("P1DT2H").unwrap(), 93_600);
        assert_eq!(parse_iso8601_duration("PT0S").unwrap(), 0);
    }

    #[test]
    fn rejects_malformed_durations() {
        assert!(parse_iso8601_duration("4M13S").is_err());
        assert!(parse_iso8601_duration("PT4X").is_err());
        assert!(parse_iso8601_duration("PT13").is_err());
    }
}
