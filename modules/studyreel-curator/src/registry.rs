//! Tiered credibility catalog of known instructors.
//!
//! Matching is exact, case-insensitive, over canonical names and aliases —
//! no fuzzy resolution. Near-duplicate spellings become separate
//! pending-review entries; operators reconcile them with `add_alias` and
//! `merge`. Tier affects downstream ranking only and never gates admission.

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use studyreel_common::{
    DiscoveryMethod, Instructor, InstructorStatus, InstructorTier,
};

use crate::traits::RegistryStore;

/// Minimum first-sighting quality for auto-discovery.
pub const AUTO_DISCOVERY_MIN_QUALITY: f32 = 7.5;

/// Outcome of resolving a provisional instructor name from the classifier.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Matched an existing registry entry.
    Linked(Instructor),
    /// No match; the quality/evidence bar was met, a tier-2 entry was created.
    Discovered(Instructor),
    /// No match and no discovery; the name stays free text on the entry.
    Unlinked,
}

pub struct InstructorRegistry {
    store: Arc<dyn RegistryStore>,
}

impl InstructorRegistry {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// Exact, case-insensitive lookup over names and aliases.
    pub async fn lookup(&self, name: &str) -> Result<Option<Instructor>> {
        self.store.find_by_name(name).await
    }

    /// Create a tier-2 pending-review instructor, if the quality bar is met
    /// and non-empty evidence is supplied. Returns `None` when the bar is
    /// not met — the caller keeps the name as free text.
    pub async fn auto_discover(
        &self,
        name: &str,
        evidence: &str,
        quality_score: f32,
        now: DateTime<Utc>,
    ) -> Result<Option<Instructor>> {
        let name = name.trim();
        if name.is_empty()
            || evidence.trim().is_empty()
            || quality_score < AUTO_DISCOVERY_MIN_QUALITY
        {
            return Ok(None);
        }

        let instructor = Instructor {
            id: Uuid::new_v4(),
            name: name.to_string(),
            tier: InstructorTier::Tier2,
            credibility_evidence: evidence.trim().to_string(),
            discovery: DiscoveryMethod::AutoDiscovered,
            status: InstructorStatus::PendingReview,
            active: true,
            aliases: Vec::new(),
            created_at: now,
        };
        self.store.insert(&instructor).await?;
        info!(
            name = instructor.name.as_str(),
            quality_score, "Auto-discovered instructor, pending review"
        );
        Ok(Some(instructor))
    }

    /// Lookup-or-discover for one classified candidate.
    pub async fn resolve(
        &self,
        name: &str,
        evidence: &str,
        quality_score: f32,
        now: DateTime<Utc>,
    ) -> Result<Resolution> {
        if let Some(existing) = self.lookup(name).await? {
            return Ok(Resolution::Linked(existing));
        }
        match self
            .auto_discover(name, evidence, quality_score, now)
            .await?
        {
            Some(created) => Ok(Resolution::Discovered(created)),
            None => Ok(Resolution::Unlinked),
        }
    }

    /// Map an alternate spelling onto an existing entry. Fails if the alias
    /// already resolves to some instructor.
    pub async fn add_alias(&self, canonical: &str, alias: &str) -> Result<Instructor> {
        if let Some(holder) = self.lookup(alias).await? {
            bail!(
                "alias '{alias}' already resolves to '{}' — merge instead",
                holder.name
            );
        }
        let mut instructor = self
            .lookup(canonical)
            .await?
            .ok_or_else(|| anyhow::anyhow!("unknown instructor '{canonical}'"))?;
        instructor.aliases.push(alias.trim().to_string());
        self.store.update(&instructor).await?;
        Ok(instructor)
    }

    /// Fold `loser` into `winner`: the loser's name and aliases become
    /// aliases of the winner, and the loser is deactivated. Explicit admin
    /// operation — nothing merges automatically.
    pub async fn merge(&self, winner: &str, loser: &str) -> Result<Instructor> {
        let mut winner = self
            .lookup(winner)
            .await?
            .ok_or_else(|| anyhow::anyhow!("unknown instructor '{winner}'"))?;
        let mut loser = self
            .lookup(loser)
            .await?
            .ok_or_else(|| anyhow::anyhow!("unknown instructor '{loser}'"))?;
        if winner.id == loser.id {
            bail!("cannot merge '{}' into itself", winner.name);
        }

        winner.aliases.push(loser.name.clone());
        winner.aliases.append(&mut loser.aliases);
        loser.active = false;

        self.store.update(&winner).await?;
        self.store.update(&loser).await?;
        info!(
            winner = winner.name.as_str(),
            loser = loser.name.as_str(),
            "Merged instructor entries"
        );
        Ok(winner)
    }

    /// Move an instructor to a better tier. Demotions are refused here;
    /// `revoke_tier` is the explicit admin override.
    pub async fn promote_tier(&self, name: &str, to: InstructorTier) -> Result<Instructor> {
        let mut instructor = self
            .lookup(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("unknown instructor '{name}'"))?;
        if to.rank() > instructor.tier.rank() {
            bail!(
                "tier transition {} -> {} is a demotion; use revoke_tier",
                instructor.tier,
                to
            );
        }
        instructor.tier = to;
        self.store.update(&instructor).await?;
        Ok(instructor)
    }

    /// Explicit admin revocation — the only path that lowers a tier.
    pub async fn revoke_tier(&self, name: &str, to: InstructorTier) -> Result<Instructor> {
        let mut instructor = self
            .lookup(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("unknown instructor '{name}'"))?;
        info!(
            name = instructor.name.as_str(),
            from = %instructor.tier,
            to = %to,
            "Tier revoked by admin"
        );
        instructor.tier = to;
        self.store.update(&instructor).await?;
        Ok(instructor)
    }

    /// Review-queue transitions: pending-review entries get approved or
    /// rejected by an operator.
    pub async fn set_status(&self, name: &str, status: InstructorStatus) -> Result<Instructor> {
        let mut instructor = self
            .lookup(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("unknown instructor '{name}'"))?;
        instructor.status = status;
        self.store.update(&instructor).await?;
        Ok(instructor)
    }

    pub async fn list(&self) -> Result<Vec<Instructor>> {
        self.store.list().await
    }
}
