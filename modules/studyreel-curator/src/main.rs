use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::Claude;
use studyreel_common::Config;
use studyreel_curator::admission::AdmissionPolicy;
use studyreel_curator::classifier::Classifier;
use studyreel_curator::filter::EligibilityFilter;
use studyreel_curator::orchestrator::{Curator, RunSettings};
use studyreel_curator::plan::{PlanBuilder, PlanStrategy};
use studyreel_curator::quota::QuotaTracker;
use studyreel_curator::registry::InstructorRegistry;
use studyreel_curator::run_log::data_dir;
use studyreel_curator::search::RetryingSearcher;
use studyreel_curator::store::{JsonLibrary, JsonQuotaStore, JsonRegistryStore};
use studyreel_curator::traits::{LibraryStore, VideoSearcher};
use youtube_client::YoutubeClient;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Instructor,
    Technique,
    GapAnalysis,
}

impl From<StrategyArg> for PlanStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Instructor => PlanStrategy::ByInstructor,
            StrategyArg::Technique => PlanStrategy::ByTechnique,
            StrategyArg::GapAnalysis => PlanStrategy::ByGapAnalysis,
        }
    }
}

#[derive(Parser)]
#[command(name = "studyreel-curator", about = "One batch curation run against the video search provider")]
struct Cli {
    /// How to build the search plan.
    #[arg(long, value_enum, default_value_t = StrategyArg::Technique)]
    strategy: StrategyArg,

    /// Override the run-scoped quality threshold.
    #[arg(long)]
    threshold: Option<f32>,

    /// Cap the number of queries in the plan.
    #[arg(long, default_value_t = 25)]
    max_queries: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("studyreel=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_redacted();

    let data = data_dir();
    let quota = QuotaTracker::open(
        Box::new(JsonQuotaStore::new(data.join("quota.json"))),
        config.daily_quota_limit,
        Utc::now(),
    )?;
    let library: Arc<dyn LibraryStore> = Arc::new(JsonLibrary::open(data.join("library.json"))?);
    let registry_store = Arc::new(JsonRegistryStore::open(data.join("instructors.json"))?);

    let plan = PlanBuilder::new(cli.max_queries)
        .build(
            cli.strategy.into(),
            &InstructorRegistry::new(registry_store.clone()),
            library.as_ref(),
        )
        .await?;
    info!(strategy = plan.strategy, queries = plan.queries.len(), "Search plan built");

    let searcher: Arc<dyn VideoSearcher> = Arc::new(RetryingSearcher::new(YoutubeClient::new(
        config.youtube_api_key.clone(),
    )));
    let classifier = Arc::new(Classifier::new(
        Claude::new(&config.anthropic_api_key, &config.classifier_model),
        config.qc_stage_enabled,
        Duration::from_secs(config.classifier_timeout_secs),
    ));
    let filter = EligibilityFilter::new(
        config.min_duration_seconds,
        config.allowed_languages.clone(),
    );
    let policy = AdmissionPolicy {
        quality_threshold: cli.threshold.unwrap_or(config.quality_threshold),
        manual_review_enabled: config.manual_review_enabled,
    };

    let curator = Curator::new(
        searcher,
        classifier,
        library,
        InstructorRegistry::new(registry_store),
        quota,
        filter,
        policy,
        RunSettings::from(&config),
    );

    let outcome = curator.run(plan).await?;
    info!(
        state = ?outcome.state,
        admitted = outcome.record.admitted,
        log = %outcome.log_path.display(),
        "Curation run finished"
    );

    Ok(())
}
