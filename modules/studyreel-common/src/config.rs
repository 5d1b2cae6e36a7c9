use std::env;

use tracing::info;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Providers
    pub youtube_api_key: String,
    pub anthropic_api_key: String,
    pub classifier_model: String,

    // Quota
    pub daily_quota_limit: u32,

    // Eligibility
    pub min_duration_seconds: u32,
    pub allowed_languages: Vec<String>,

    // Admission
    pub quality_threshold: f32,
    pub manual_review_enabled: bool,

    // Orchestration
    pub curation_enabled: bool,
    pub qc_stage_enabled: bool,
    pub max_consecutive_provider_errors: u32,
    pub inter_query_delay_ms: u64,
    pub max_results_per_query: u32,
    pub classifier_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            youtube_api_key: required_env("YOUTUBE_API_KEY"),
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
            classifier_model: env::var("CLASSIFIER_MODEL")
                .unwrap_or_else(|_| "claude-haiku-4-5-20251001".to_string()),
            daily_quota_limit: parsed_env("DAILY_QUOTA_LIMIT", 10_000),
            min_duration_seconds: parsed_env("MIN_DURATION_SECONDS", 70),
            allowed_languages: env::var("ALLOWED_LANGUAGES")
                .unwrap_or_else(|_| "en".to_string())
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            quality_threshold: parsed_env("QUALITY_THRESHOLD", 7.5),
            manual_review_enabled: parsed_env("MANUAL_REVIEW_ENABLED", false),
            curation_enabled: parsed_env("CURATION_ENABLED", true),
            qc_stage_enabled: parsed_env("QC_STAGE_ENABLED", true),
            max_consecutive_provider_errors: parsed_env("MAX_CONSECUTIVE_PROVIDER_ERRORS", 3),
            inter_query_delay_ms: parsed_env("INTER_QUERY_DELAY_MS", 2_000),
            max_results_per_query: parsed_env("MAX_RESULTS_PER_QUERY", 10),
            classifier_timeout_secs: parsed_env("CLASSIFIER_TIMEOUT_SECS", 45),
        }
    }

    /// Log the loaded configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            youtube_api_key = mask(&self.youtube_api_key),
            anthropic_api_key = mask(&self.anthropic_api_key),
            classifier_model = self.classifier_model.as_str(),
            daily_quota_limit = self.daily_quota_limit,
            min_duration_seconds = self.min_duration_seconds,
            allowed_languages = ?self.allowed_languages,
            quality_threshold = self.quality_threshold,
            manual_review_enabled = self.manual_review_enabled,
            curation_enabled = self.curation_enabled,
            qc_stage_enabled = self.qc_stage_enabled,
            "Config loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{key} has an invalid value: {v}")),
        Err(_) => default,
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        "unset"
    } else {
        "set"
    }
}
