//! Store implementations: in-memory (tests, dry runs) and JSON-file-backed
//! (single-node deployment). The library store proper is a collaborator;
//! both implementations here honor its contract — `external_id` uniqueness
//! across the library and the review queue, duplicate inserts swallowed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;

use studyreel_common::{Instructor, LibraryEntry, QuotaState};

use crate::traits::{InsertOutcome, LibraryStore, QuotaStore, RegistryStore};

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Some(serde_json::from_str(&raw).with_context(|| {
        format!("corrupt JSON in {}", path.display())
    })?))
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LibraryInner {
    entries: HashMap<String, LibraryEntry>,
    extraction_queue: Vec<String>,
}

/// In-memory library. Keeps admitted entries and the review queue in one
/// map keyed by `external_id`, which is what makes insertion idempotent.
#[derive(Default)]
pub struct MemoryLibrary {
    inner: Mutex<LibraryInner>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, external_id: &str) -> Option<LibraryEntry> {
        self.inner
            .lock()
            .expect("library lock poisoned")
            .entries
            .get(external_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("library lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn extraction_queue(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("library lock poisoned")
            .extraction_queue
            .clone()
    }

    fn insert_unique(&self, entry: &LibraryEntry) -> InsertOutcome {
        let mut inner = self.inner.lock().expect("library lock poisoned");
        if inner.entries.contains_key(&entry.external_id) {
            return InsertOutcome::DuplicateIgnored;
        }
        inner.entries.insert(entry.external_id.clone(), entry.clone());
        InsertOutcome::Inserted
    }
}

#[async_trait]
impl LibraryStore for MemoryLibrary {
    async fn exists(&self, external_id: &str) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .expect("library lock poisoned")
            .entries
            .contains_key(external_id))
    }

    async fn insert(&self, entry: &LibraryEntry) -> Result<InsertOutcome> {
        Ok(self.insert_unique(entry))
    }

    async fn insert_to_review_queue(&self, entry: &LibraryEntry) -> Result<InsertOutcome> {
        Ok(self.insert_unique(entry))
    }

    async fn enqueue_knowledge_extraction(&self, external_id: &str) -> Result<()> {
        self.inner
            .lock()
            .expect("library lock poisoned")
            .extraction_queue
            .push(external_id.to_string());
        Ok(())
    }

    async fn technique_counts(&self) -> Result<HashMap<String, u32>> {
        let inner = self.inner.lock().expect("library lock poisoned");
        let mut counts = HashMap::new();
        for entry in inner.entries.values() {
            if let Some(technique) = &entry.technique {
                *counts.entry(technique.to_lowercase()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}

/// File-backed library for single-node deployments: the in-memory map plus
/// a JSON snapshot rewritten on every mutation.
pub struct JsonLibrary {
    memory: MemoryLibrary,
    path: PathBuf,
}

#[derive(serde::Serialize, serde::Deserialize, Default)]
struct LibrarySnapshot {
    entries: Vec<LibraryEntry>,
    extraction_queue: Vec<String>,
}

impl JsonLibrary {
    pub fn open(path: PathBuf) -> Result<Self> {
        let memory = MemoryLibrary::new();
        if let Some(snapshot) = read_json::<LibrarySnapshot>(&path)? {
            let mut inner = memory.inner.lock().expect("library lock poisoned");
            for entry in snapshot.entries {
                inner.entries.insert(entry.external_id.clone(), entry);
            }
            inner.extraction_queue = snapshot.extraction_queue;
        }
        Ok(Self { memory, path })
    }

    fn persist(&self) -> Result<()> {
        let inner = self.memory.inner.lock().expect("library lock poisoned");
        let snapshot = LibrarySnapshot {
            entries: inner.entries.values().cloned().collect(),
            extraction_queue: inner.extraction_queue.clone(),
        };
        write_json(&self.path, &snapshot)
    }
}

#[async_trait]
impl LibraryStore for JsonLibrary {
    async fn exists(&self, external_id: &str) -> Result<bool> {
        self.memory.exists(external_id).await
    }

    async fn insert(&self, entry: &LibraryEntry) -> Result<InsertOutcome> {
        let outcome = self.memory.insert(entry).await?;
        if outcome == InsertOutcome::Inserted {
            self.persist()?;
        }
        Ok(outcome)
    }

    async fn insert_to_review_queue(&self, entry: &LibraryEntry) -> Result<InsertOutcome> {
        let outcome = self.memory.insert_to_review_queue(entry).await?;
        if outcome == InsertOutcome::Inserted {
            self.persist()?;
        }
        Ok(outcome)
    }

    async fn enqueue_knowledge_extraction(&self, external_id: &str) -> Result<()> {
        self.memory.enqueue_knowledge_extraction(external_id).await?;
        self.persist()
    }

    async fn technique_counts(&self) -> Result<HashMap<String, u32>> {
        self.memory.technique_counts().await
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

fn name_matches(instructor: &Instructor, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    instructor.name.trim().to_lowercase() == needle
        || instructor
            .aliases
            .iter()
            .any(|a| a.trim().to_lowercase() == needle)
}

#[derive(Default)]
pub struct MemoryRegistryStore {
    instructors: Mutex<Vec<Instructor>>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(instructors: Vec<Instructor>) -> Self {
        Self {
            instructors: Mutex::new(instructors),
        }
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistryStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Instructor>> {
        Ok(self
            .instructors
            .lock()
            .expect("registry lock poisoned")
            .iter()
            .find(|i| name_matches(i, name))
            .cloned())
    }

    async fn insert(&self, instructor: &Instructor) -> Result<()> {
        self.instructors
            .lock()
            .expect("registry lock poisoned")
            .push(instructor.clone());
        Ok(())
    }

    async fn update(&self, instructor: &Instructor) -> Result<()> {
        let mut instructors = self.instructors.lock().expect("registry lock poisoned");
        match instructors.iter_mut().find(|i| i.id == instructor.id) {
            Some(slot) => {
                *slot = instructor.clone();
                Ok(())
            }
            None => anyhow::bail!("unknown instructor id {}", instructor.id),
        }
    }

    async fn list(&self) -> Result<Vec<Instructor>> {
        Ok(self
            .instructors
            .lock()
            .expect("registry lock poisoned")
            .clone())
    }
}

/// File-backed registry store, rewritten on every mutation.
pub struct JsonRegistryStore {
    memory: MemoryRegistryStore,
    path: PathBuf,
}

impl JsonRegistryStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let instructors: Vec<Instructor> = read_json(&path)?.unwrap_or_default();
        Ok(Self {
            memory: MemoryRegistryStore::seeded(instructors),
            path,
        })
    }

    fn persist(&self) -> Result<()> {
        let instructors = self
            .memory
            .instructors
            .lock()
            .expect("registry lock poisoned");
        write_json(&self.path, &*instructors)
    }
}

#[async_trait]
impl RegistryStore for JsonRegistryStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Instructor>> {
        self.memory.find_by_name(name).await
    }

    async fn insert(&self, instructor: &Instructor) -> Result<()> {
        self.memory.insert(instructor).await?;
        self.persist()
    }

    async fn update(&self, instructor: &Instructor) -> Result<()> {
        self.memory.update(instructor).await?;
        self.persist()
    }

    async fn list(&self) -> Result<Vec<Instructor>> {
        self.memory.list().await
    }
}

// ---------------------------------------------------------------------------
// Quota
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryQuotaStore {
    state: Mutex<Option<QuotaState>>,
}

impl QuotaStore for MemoryQuotaStore {
    fn load(&self) -> Result<Option<QuotaState>> {
        Ok(self.state.lock().expect("quota store lock poisoned").clone())
    }

    fn save(&self, state: &QuotaState) -> Result<()> {
        *self.state.lock().expect("quota store lock poisoned") = Some(state.clone());
        Ok(())
    }
}

pub struct JsonQuotaStore {
    path: PathBuf,
}

impl JsonQuotaStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl QuotaStore for JsonQuotaStore {
    fn load(&self) -> Result<Option<QuotaState>> {
        read_json(&self.path)
    }

    fn save(&self, state: &QuotaState) -> Result<()> {
        write_json(&self.path, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use studyreel_common::EntryStatus;

    fn entry(id: &str) -> LibraryEntry {
        LibraryEntry {
            external_id: id.to_string(),
            title: format!("video {id}"),
            instructor_ref: None,
            instructor_name: None,
            technique: Some("armbar".to_string()),
            quality_score: 8.0,
            status: EntryStatus::Active,
            admitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_insert_is_ignored() {
        let library = MemoryLibrary::new();
        assert_eq!(library.insert(&entry("a")).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            library.insert(&entry("a")).await.unwrap(),
            InsertOutcome::DuplicateIgnored
        );
        assert_eq!(library.len(), 1);
    }

    #[tokio::test]
    async fn review_queue_shares_the_uniqueness_domain() {
        let library = MemoryLibrary::new();
        library.insert_to_review_queue(&entry("a")).await.unwrap();
        assert!(library.exists("a").await.unwrap());
        assert_eq!(
            library.insert(&entry("a")).await.unwrap(),
            InsertOutcome::DuplicateIgnored
        );
    }

    #[tokio::test]
    async fn json_library_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");

        {
            let library = JsonLibrary::open(path.clone()).unwrap();
            library.insert(&entry("a")).await.unwrap();
            library.enqueue_knowledge_extraction("a").await.unwrap();
        }

        let library = JsonLibrary::open(path).unwrap();
        assert!(library.exists("a").await.unwrap());
        assert_eq!(library.memory.extraction_queue(), vec!["a"]);
    }

    #[tokio::test]
    async fn registry_matches_names_and_aliases_case_insensitively() {
        let store = MemoryRegistryStore::new();
        let mut instructor = crate::testing::instructor("John Danaher");
        instructor.aliases.push("J. Danaher".to_string());
        store.insert(&instructor).await.unwrap();

        assert!(store.find_by_name("john danaher").await.unwrap().is_some());
        assert!(store.find_by_name("  J. DANAHER ").await.unwrap().is_some());
        assert!(store.find_by_name("John Danahar").await.unwrap().is_none());
    }
}
