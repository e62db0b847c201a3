//! Shared, soft-delete bookkeeping for individual call records.
//!
//! Every mutation is written as one batch through an [`ExclusionRepository`],
//! after which the complete list of active entries is re-read and published
//! to all subscribers. Consumers never get diffs; they rebuild an
//! [`ExclusionIndex`] from whatever snapshot they hold.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{DashboardError, Result};
use crate::models::{ExclusionEntry, TableType};

pub type Snapshot = Arc<Vec<ExclusionEntry>>;

#[async_trait]
pub trait ExclusionRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<ExclusionEntry>>;

    /// Persists all entries or none of them.
    async fn insert_batch(&self, entries: &[ExclusionEntry]) -> Result<()>;

    /// Deletes by storage id, returning how many rows went away.
    async fn delete_batch(&self, ids: &[Uuid]) -> Result<u64>;
}

#[async_trait]
impl<T: ExclusionRepository + ?Sized> ExclusionRepository for Box<T> {
    async fn list(&self) -> Result<Vec<ExclusionEntry>> {
        (**self).list().await
    }

    async fn insert_batch(&self, entries: &[ExclusionEntry]) -> Result<()> {
        (**self).insert_batch(entries).await
    }

    async fn delete_batch(&self, ids: &[Uuid]) -> Result<u64> {
        (**self).delete_batch(ids).await
    }
}

/// Process-local repository, used by tests and offline runs.
#[derive(Debug, Default)]
pub struct MemoryExclusionRepository {
    entries: Mutex<Vec<ExclusionEntry>>,
    offline: AtomicBool,
}

impl MemoryExclusionRepository {
    #[cfg(test)]
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, Vec<ExclusionEntry>>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DashboardError::StoreUnavailable(
                "in-memory store is offline".to_string(),
            ));
        }
        self.entries
            .lock()
            .map_err(|_| DashboardError::StoreUnavailable("in-memory store poisoned".to_string()))
    }
}

#[async_trait]
impl ExclusionRepository for MemoryExclusionRepository {
    async fn list(&self) -> Result<Vec<ExclusionEntry>> {
        Ok(self.guard()?.clone())
    }

    async fn insert_batch(&self, entries: &[ExclusionEntry]) -> Result<()> {
        let mut stored = self.guard()?;
        for entry in entries {
            let duplicate = stored.iter().any(|existing| {
                existing.table_type == entry.table_type && existing.record_id == entry.record_id
            });
            if !duplicate {
                stored.push(entry.clone());
            }
        }
        Ok(())
    }

    async fn delete_batch(&self, ids: &[Uuid]) -> Result<u64> {
        let mut stored = self.guard()?;
        let before = stored.len();
        stored.retain(|entry| !ids.contains(&entry.id));
        Ok((before - stored.len()) as u64)
    }
}

/// Per-table lookup built from one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionIndex {
    sets: BTreeMap<TableType, BTreeSet<String>>,
}

static NO_EXCLUSIONS: BTreeSet<String> = BTreeSet::new();

impl ExclusionIndex {
    pub fn from_entries(entries: &[ExclusionEntry]) -> Self {
        let mut sets: BTreeMap<TableType, BTreeSet<String>> = BTreeMap::new();
        for entry in entries.iter().filter(|entry| !entry.record_id.is_empty()) {
            sets.entry(entry.table_type)
                .or_default()
                .insert(entry.record_id.clone());
        }
        Self { sets }
    }

    pub fn ids(&self, table: TableType) -> &BTreeSet<String> {
        self.sets.get(&table).unwrap_or(&NO_EXCLUSIONS)
    }

    pub fn contains(&self, table: TableType, record_id: &str) -> bool {
        self.ids(table).contains(record_id)
    }

    pub fn len(&self) -> usize {
        self.sets.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ExclusionStore<R> {
    repository: R,
    snapshot: watch::Sender<Snapshot>,
    writer: tokio::sync::Mutex<()>,
}

impl<R: ExclusionRepository> ExclusionStore<R> {
    /// Loads the current entries and starts publishing snapshots.
    pub async fn open(repository: R) -> Result<Self> {
        let entries = repository.list().await?;
        let (snapshot, _) = watch::channel(Arc::new(ordered(entries)));
        Ok(Self {
            repository,
            snapshot,
            writer: tokio::sync::Mutex::new(()),
        })
    }

    #[cfg(test)]
    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn index(&self) -> ExclusionIndex {
        ExclusionIndex::from_entries(&self.snapshot.borrow())
    }

    pub fn is_excluded(&self, table: TableType, record_id: &str) -> bool {
        self.index().contains(table, record_id.trim())
    }

    /// Re-reads the repository and republishes, for changes made elsewhere.
    pub async fn reload(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.publish().await
    }

    /// Excludes every id not already excluded for `table`. Returns the number
    /// of new entries.
    pub async fn exclude_records(
        &self,
        actor: Option<&str>,
        table: TableType,
        record_ids: &[String],
    ) -> Result<usize> {
        let actor = require_actor(actor, "exclude records")?;
        let _writer = self.writer.lock().await;

        let current = self.repository.list().await?;
        let mut already: BTreeSet<&str> = current
            .iter()
            .filter(|entry| entry.table_type == table)
            .map(|entry| entry.record_id.as_str())
            .collect();

        let now = Utc::now();
        let mut batch = Vec::new();
        for record_id in record_ids.iter().map(|id| id.trim()) {
            if record_id.is_empty() || !already.insert(record_id) {
                continue;
            }
            batch.push(ExclusionEntry {
                id: Uuid::new_v4(),
                table_type: table,
                record_id: record_id.to_string(),
                excluded_at: now,
                excluded_by: actor.to_string(),
            });
        }

        if batch.is_empty() {
            tracing::debug!(%table, "nothing new to exclude");
            return Ok(0);
        }

        self.repository.insert_batch(&batch).await?;
        tracing::info!(%table, count = batch.len(), actor, "records excluded");
        self.publish().await?;
        Ok(batch.len())
    }

    /// Removes the entries for `record_ids` under `table`. Ids that were never
    /// excluded are ignored.
    pub async fn restore_records(
        &self,
        actor: Option<&str>,
        table: TableType,
        record_ids: &[String],
    ) -> Result<usize> {
        let actor = require_actor(actor, "restore records")?;
        let _writer = self.writer.lock().await;

        let wanted: BTreeSet<&str> = record_ids.iter().map(|id| id.trim()).collect();
        let doomed: Vec<Uuid> = self
            .repository
            .list()
            .await?
            .into_iter()
            .filter(|entry| entry.table_type == table && wanted.contains(entry.record_id.as_str()))
            .map(|entry| entry.id)
            .collect();

        self.delete(actor, doomed).await
    }

    pub async fn restore_by_doc_id(&self, actor: Option<&str>, id: Uuid) -> Result<usize> {
        self.restore_by_doc_ids(actor, &[id]).await
    }

    pub async fn restore_by_doc_ids(&self, actor: Option<&str>, ids: &[Uuid]) -> Result<usize> {
        let actor = require_actor(actor, "restore records")?;
        let _writer = self.writer.lock().await;
        self.delete(actor, ids.to_vec()).await
    }

    async fn delete(&self, actor: &str, ids: Vec<Uuid>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = self.repository.delete_batch(&ids).await?;
        tracing::info!(count = removed, actor, "exclusions restored");
        if removed > 0 {
            self.publish().await?;
        }
        Ok(removed as usize)
    }

    async fn publish(&self) -> Result<()> {
        let entries = self.repository.list().await?;
        tracing::debug!(entries = entries.len(), "publishing exclusion snapshot");
        let next = ordered(entries);
        self.snapshot.send_if_modified(|current| {
            if **current == next {
                return false;
            }
            *current = Arc::new(next);
            true
        });
        Ok(())
    }
}

fn require_actor<'a>(actor: Option<&'a str>, action: &'static str) -> Result<&'a str> {
    actor
        .map(str::trim)
        .filter(|actor| !actor.is_empty())
        .ok_or(DashboardError::Unauthenticated(action))
}

fn ordered(mut entries: Vec<ExclusionEntry>) -> Vec<ExclusionEntry> {
    entries.sort_by(|a, b| {
        b.excluded_at
            .cmp(&a.excluded_at)
            .then_with(|| a.table_type.cmp(&b.table_type))
            .then_with(|| a.record_id.cmp(&b.record_id))
    });
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: Option<&str> = Some("admin@example.com");

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    async fn store() -> ExclusionStore<MemoryExclusionRepository> {
        ExclusionStore::open(MemoryExclusionRepository::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn exclude_then_restore_returns_to_empty() {
        let store = store().await;

        store
            .exclude_records(ADMIN, TableType::Conversion, &ids(&["42"]))
            .await
            .unwrap();
        assert!(store.is_excluded(TableType::Conversion, "42"));

        store
            .restore_records(ADMIN, TableType::Conversion, &ids(&["42"]))
            .await
            .unwrap();
        assert!(store.snapshot().is_empty());
        assert!(store.index().is_empty());
    }

    #[tokio::test]
    async fn duplicate_excludes_are_skipped() {
        let store = store().await;

        let first = store
            .exclude_records(ADMIN, TableType::Pitch, &ids(&["1", "2", "2"]))
            .await
            .unwrap();
        let second = store
            .exclude_records(ADMIN, TableType::Pitch, &ids(&["2", "3"]))
            .await
            .unwrap();

        assert_eq!(first, 2);
        assert_eq!(second, 1);
        assert_eq!(store.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn same_record_can_be_excluded_per_table() {
        let store = store().await;
        store
            .exclude_records(ADMIN, TableType::Pitch, &ids(&["7"]))
            .await
            .unwrap();
        store
            .exclude_records(ADMIN, TableType::Connection, &ids(&["7"]))
            .await
            .unwrap();

        let index = store.index();
        assert!(index.contains(TableType::Pitch, "7"));
        assert!(index.contains(TableType::Connection, "7"));
        assert!(!index.contains(TableType::Stl, "7"));
    }

    #[tokio::test]
    async fn mutations_need_an_actor() {
        let store = store().await;

        let err = store
            .exclude_records(None, TableType::Stl, &ids(&["1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::Unauthenticated(_)));

        let err = store
            .restore_by_doc_id(Some("  "), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn empty_ids_are_not_excludable() {
        let store = store().await;
        let added = store
            .exclude_records(ADMIN, TableType::GrossIssue, &ids(&["", "  "]))
            .await
            .unwrap();
        assert_eq!(added, 0);
    }

    #[tokio::test]
    async fn restoring_unknown_ids_is_a_no_op() {
        let store = store().await;
        let removed = store
            .restore_records(ADMIN, TableType::Conversion, &ids(&["missing"]))
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn restore_by_doc_ids_uses_storage_identity() {
        let store = store().await;
        store
            .exclude_records(ADMIN, TableType::Stl, &ids(&["L1", "L2"]))
            .await
            .unwrap();
        let doc_ids: Vec<Uuid> = store.snapshot().iter().map(|entry| entry.id).collect();

        let removed = store.restore_by_doc_ids(ADMIN, &doc_ids).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn subscribers_receive_full_snapshots() {
        let store = store().await;
        let mut receiver = store.subscribe();

        store
            .exclude_records(ADMIN, TableType::DialsPerHour, &ids(&["1", "2"]))
            .await
            .unwrap();
        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow_and_update().len(), 2);

        store
            .restore_records(ADMIN, TableType::DialsPerHour, &ids(&["1"]))
            .await
            .unwrap();
        receiver.changed().await.unwrap();
        let snapshot = receiver.borrow_and_update().clone();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].record_id, "2");
    }

    #[tokio::test]
    async fn restore_reinstates_the_prior_aggregate() {
        use crate::metrics::{aggregate_scoped, EmployeeFilter, MetricsInput};
        use crate::models::{CallRecord, HoursRecord};

        let calls: Vec<CallRecord> = (1..=10)
            .map(|n| CallRecord {
                id: Some(n.to_string()),
                employee: "Dana".to_string(),
                connected: 1,
                pitched: u8::from(n % 2 == 0),
                positive: u8::from(n == 10),
                ..CallRecord::default()
            })
            .collect();
        let hours = vec![HoursRecord {
            employee: "Dana".to_string(),
            hours: 2.0,
        }];
        let input = MetricsInput {
            calls: &calls,
            hours: &hours,
            scorecards: &[],
            latency: &[],
        };
        let store = store().await;
        let before = aggregate_scoped(&input, &EmployeeFilter::All, &store.index());

        for table in TableType::ALL {
            store.exclude_records(ADMIN, table, &ids(&["10"])).await.unwrap();
        }
        let excluded = aggregate_scoped(&input, &EmployeeFilter::All, &store.index());
        assert_eq!(excluded.team.dials, 9);
        assert_eq!(excluded.team.positive, 0);
        assert_eq!(excluded.team.conversion_rate, 0);

        for table in TableType::ALL {
            store.restore_records(ADMIN, table, &ids(&["10"])).await.unwrap();
        }
        let after = aggregate_scoped(&input, &EmployeeFilter::All, &store.index());
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn store_outages_surface_as_errors() {
        let store = store().await;
        store.repository().set_offline(true);

        let err = store
            .exclude_records(ADMIN, TableType::Pitch, &ids(&["1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::StoreUnavailable(_)));
    }
}
