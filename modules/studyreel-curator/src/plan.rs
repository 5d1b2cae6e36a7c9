//! Search-plan construction. One orchestrator, three strategies — the run
//! variants differ only in how the ordered query list is built.

use anyhow::Result;

use studyreel_common::{InstructorStatus, SearchQuery};

use crate::registry::InstructorRegistry;
use crate::traits::LibraryStore;

/// Technique catalog the curation sweeps cover. Order matters for
/// `ByTechnique`: fundamentals first.
pub const TECHNIQUE_CATALOG: &[&str] = &[
    "armbar from closed guard",
    "triangle choke from guard",
    "rear naked choke",
    "kimura from side control",
    "guillotine choke",
    "closed guard sweeps",
    "half guard passing",
    "knee slice pass",
    "butterfly guard sweeps",
    "back control retention",
    "mount escapes",
    "side control escapes",
    "heel hook from ashi garami",
    "straight ankle lock",
    "de la riva guard",
    "single leg takedown",
    "double leg takedown",
    "arm drag to back take",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStrategy {
    /// Target each approved registry instructor by name.
    ByInstructor,
    /// Sweep the technique catalog in order.
    ByTechnique,
    /// Target the techniques with the thinnest library coverage first.
    ByGapAnalysis,
}

impl PlanStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            PlanStrategy::ByInstructor => "by_instructor",
            PlanStrategy::ByTechnique => "by_technique",
            PlanStrategy::ByGapAnalysis => "by_gap_analysis",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchPlan {
    pub strategy: &'static str,
    pub queries: Vec<SearchQuery>,
}

pub struct PlanBuilder {
    max_queries: usize,
}

impl PlanBuilder {
    pub fn new(max_queries: usize) -> Self {
        Self { max_queries }
    }

    pub async fn build(
        &self,
        strategy: PlanStrategy,
        registry: &InstructorRegistry,
        library: &dyn LibraryStore,
    ) -> Result<SearchPlan> {
        let mut queries = match strategy {
            PlanStrategy::ByInstructor => self.instructor_queries(registry).await?,
            PlanStrategy::ByTechnique => technique_queries(TECHNIQUE_CATALOG.iter().copied()),
            PlanStrategy::ByGapAnalysis => {
                let counts = library.technique_counts().await?;
                let mut ranked: Vec<(&str, u32)> = TECHNIQUE_CATALOG
                    .iter()
                    .map(|t| (*t, counts.get(*t).copied().unwrap_or(0)))
                    .collect();
                // Thinnest coverage first; catalog order breaks ties.
                ranked.sort_by_key(|(_, count)| *count);
                technique_queries(ranked.into_iter().map(|(t, _)| t))
            }
        };

        queries.truncate(self.max_queries);
        Ok(SearchPlan {
            strategy: strategy.label(),
            queries,
        })
    }

    async fn instructor_queries(&self, registry: &InstructorRegistry) -> Result<Vec<SearchQuery>> {
        let mut instructors: Vec<_> = registry
            .list()
            .await?
            .into_iter()
            .filter(|i| i.active && i.status == InstructorStatus::Approved)
            .collect();
        // Best-credentialed first; name breaks ties for a stable plan.
        instructors.sort_by(|a, b| {
            a.tier
                .rank()
                .cmp(&b.tier.rank())
                .then_with(|| a.name.cmp(&b.name))
        });

        Ok(instructors
            .into_iter()
            .map(|i| SearchQuery {
                text: format!("{} instructional technique", i.name),
                technique: None,
                instructor: Some(i.name),
            })
            .collect())
    }
}

fn technique_queries<'a>(techniques: impl Iterator<Item = &'a str>) -> Vec<SearchQuery> {
    techniques
        .map(|t| SearchQuery {
            text: format!("{t} instructional"),
            technique: Some(t.to_string()),
            instructor: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use studyreel_common::InstructorTier;

    use crate::store::{MemoryLibrary, MemoryRegistryStore};
    use crate::testing::{entry_with_technique, instructor};
    use crate::traits::LibraryStore as _;

    fn registry_with(instructors: Vec<studyreel_common::Instructor>) -> InstructorRegistry {
        InstructorRegistry::new(Arc::new(MemoryRegistryStore::seeded(instructors)))
    }

    #[tokio::test]
    async fn technique_plan_follows_catalog_order() {
        let builder = PlanBuilder::new(5);
        let plan = builder
            .build(
                PlanStrategy::ByTechnique,
                &registry_with(vec![]),
                &MemoryLibrary::new(),
            )
            .await
            .unwrap();

        assert_eq!(plan.queries.len(), 5);
        assert_eq!(plan.queries[0].text, "armbar from closed guard instructional");
        assert_eq!(
            plan.queries[0].technique.as_deref(),
            Some("armbar from closed guard")
        );
    }

    #[tokio::test]
    async fn gap_analysis_targets_thinnest_coverage_first() {
        let library = MemoryLibrary::new();
        // Give the first two catalog techniques some coverage.
        for (i, technique) in TECHNIQUE_CATALOG.iter().take(2).enumerate() {
            for n in 0..=i {
                library
                    .insert(&entry_with_technique(&format!("vid-{technique}-{n}"), technique))
                    .await
                    .unwrap();
            }
        }

        let plan = PlanBuilder::new(usize::MAX)
            .build(
                PlanStrategy::ByGapAnalysis,
                &registry_with(vec![]),
                &library,
            )
            .await
            .unwrap();

        // Uncovered techniques come first; the covered two are last, in
        // ascending count order.
        let last = &plan.queries[plan.queries.len() - 1];
        let second_last = &plan.queries[plan.queries.len() - 2];
        assert_eq!(last.technique.as_deref(), Some(TECHNIQUE_CATALOG[1]));
        assert_eq!(second_last.technique.as_deref(), Some(TECHNIQUE_CATALOG[0]));
    }

    #[tokio::test]
    async fn instructor_plan_skips_unapproved_and_inactive_entries() {
        let mut pending = instructor("Pending Person");
        pending.status = InstructorStatus::PendingReview;
        let mut inactive = instructor("Inactive Person");
        inactive.active = false;
        let mut tier1 = instructor("Apex Coach");
        tier1.tier = InstructorTier::Tier1;
        let tier2 = instructor("Solid Coach");

        let registry = registry_with(vec![pending, inactive, tier2, tier1]);
        let plan = PlanBuilder::new(10)
            .build(PlanStrategy::ByInstructor, &registry, &MemoryLibrary::new())
            .await
            .unwrap();

        let targets: Vec<_> = plan
            .queries
            .iter()
            .map(|q| q.instructor.as_deref().unwrap())
            .collect();
        assert_eq!(targets, vec!["Apex Coach", "Solid Coach"]);
    }

    #[tokio::test]
    async fn plans_are_bounded_by_max_queries() {
        let plan = PlanBuilder::new(3)
            .build(
                PlanStrategy::ByGapAnalysis,
                &registry_with(vec![]),
                &MemoryLibrary::new(),
            )
            .await
            .unwrap();
        assert_eq!(plan.queries.len(), 3);
    }
}
