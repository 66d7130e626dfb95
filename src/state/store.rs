//! Entity state store
//!
//! Holds one record per entity key. Every mutation goes through
//! [`EntityStore::merge`], which serializes merges per key while letting
//! different keys proceed in parallel. The transform may suspend (read from
//! the surface, wait for a harvest); the key's turn is held for its whole
//! duration.

use crate::state::entity::{EntityRecord, SCHEMA_VERSION};
use crate::state::merge::Patch;
use crate::storage::{SharedStorage, StorageResult, STATE_KEY};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

pub struct EntityStore {
    storage: SharedStorage,
    turns: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    records: Mutex<BTreeMap<String, EntityRecord>>,
}

/// A claim on one key's turn, dropped from the map once nobody waits on it
struct Turn<'a> {
    store: &'a EntityStore,
    key: &'a str,
    slot: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        let mut turns = lock(&self.store.turns);
        // only the map and this claim hold the slot
        if Arc::strong_count(&self.slot) == 2 {
            turns.remove(self.key);
        }
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl EntityStore {
    /// Creates an empty store backed by `storage`, ignoring any checkpoint
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            turns: Mutex::new(HashMap::new()),
            records: Mutex::new(BTreeMap::new()),
        }
    }

    /// Opens the store, resuming from the checkpointed entity map if present
    pub fn open(storage: SharedStorage) -> StorageResult<Self> {
        let saved = lock(&*storage).load(STATE_KEY)?;

        let records: BTreeMap<String, EntityRecord> = match saved {
            Some(value) => serde_json::from_value(value)?,
            None => BTreeMap::new(),
        };

        if !records.is_empty() {
            info!("Resumed {} entities from checkpoint", records.len());
        }

        Ok(Self {
            storage,
            turns: Mutex::new(HashMap::new()),
            records: Mutex::new(records),
        })
    }

    fn turn<'a>(&'a self, key: &'a str) -> Turn<'a> {
        let slot = lock(&self.turns)
            .entry(key.to_string())
            .or_default()
            .clone();

        Turn {
            store: self,
            key,
            slot,
        }
    }

    /// Reads, transforms and writes back the record for `key`
    ///
    /// Merges for the same key run one at a time, each seeing the result of
    /// the previous one. If the transform fails, the stored record is left
    /// untouched.
    ///
    /// # Arguments
    ///
    /// * `key` - Entity key
    /// * `transform` - Receives the current record (or a default) and returns the new one
    pub async fn merge<F, Fut, E>(&self, key: &str, transform: F) -> Result<EntityRecord, E>
    where
        F: FnOnce(EntityRecord) -> Fut,
        Fut: Future<Output = Result<EntityRecord, E>>,
    {
        let turn = self.turn(key);
        let _held = turn.slot.lock().await;

        let current = self.get(key).unwrap_or_default();
        let next = transform(current).await?;

        lock(&self.records).insert(key.to_string(), next.clone());
        debug!(entity = key, "Merged entity");

        Ok(next)
    }

    /// Merges a ready patch into `key`
    pub async fn apply(&self, key: &str, patch: Patch) -> EntityRecord {
        let merged = self
            .merge(key, |record| async move { Ok::<_, Infallible>(patch.apply(record)) })
            .await;

        match merged {
            Ok(record) => record,
            Err(never) => match never {},
        }
    }

    /// Returns a copy of the committed record for `key`
    pub fn get(&self, key: &str) -> Option<EntityRecord> {
        lock(&self.records).get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.records).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }

    /// Copies every committed record
    pub fn snapshot(&self) -> BTreeMap<String, EntityRecord> {
        lock(&self.records).clone()
    }

    /// Writes the committed records to the checkpoint
    ///
    /// Merges still in flight are not waited for; their result lands in the
    /// next persist.
    pub fn persist(&self) -> StorageResult<()> {
        let value = serde_json::to_value(self.snapshot())?;
        lock(&*self.storage).save(STATE_KEY, &value)?;
        debug!("Persisted {} entities", self.len());
        Ok(())
    }

    /// Export sweep: eligible records in key order, stamped with version and completion time
    pub fn export(&self, finished_at: DateTime<Utc>) -> Vec<EntityRecord> {
        self.snapshot()
            .into_values()
            .filter(EntityRecord::is_export_eligible)
            .map(|mut record| {
                record.version = Some(SCHEMA_VERSION);
                record.finished_at = Some(finished_at);
                record
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::entity::{ReviewRecord, ReviewsRecord, ServiceRecord};
    use crate::state::merge::FieldsPatch;
    use crate::storage::{share, MemoryStorage};
    use std::time::Duration;

    fn store() -> EntityStore {
        EntityStore::new(share(MemoryStorage::new()))
    }

    fn categories(values: &[&str]) -> Patch {
        Patch::About(FieldsPatch {
            categories: values.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_merge_creates_default_record() {
        let store = store();
        let record = store.apply("acme", categories(&["Bar"])).await;

        assert_eq!(record.categories, vec!["Bar"]);
        assert_eq!(store.len(), 1);
        assert!(store.contains("acme"));
    }

    #[tokio::test]
    async fn test_failed_transform_leaves_record() {
        let store = store();
        store.apply("acme", categories(&["Bar"])).await;

        let result = store
            .merge("acme", |_| async { Err::<EntityRecord, _>("boom") })
            .await;

        assert_eq!(result, Err("boom"));
        assert_eq!(store.get("acme").unwrap().categories, vec!["Bar"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_merges_are_serialized() {
        let store = Arc::new(store());

        let slow = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .merge("acme", |mut record| async move {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        record.services.push(ServiceRecord {
                            title: Some("Catering".to_string()),
                            text: Some("Events".to_string()),
                        });
                        Ok::<_, Infallible>(record)
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;

        let fast = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .apply(
                        "acme",
                        Patch::Reviews(ReviewsRecord {
                            average: Some(4.0),
                            count: Some(2),
                            reviews: vec![ReviewRecord {
                                url: Some("https://www.facebook.com/r/1".to_string()),
                                ..Default::default()
                            }],
                        }),
                    )
                    .await
            })
        };

        slow.await.unwrap().unwrap();
        fast.await.unwrap();

        let record = store.get("acme").unwrap();
        assert_eq!(record.services.len(), 1);
        assert_eq!(record.reviews.reviews.len(), 1);
        assert!(lock(&store.turns).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_turns_are_released() {
        let store = Arc::new(store());

        let held = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .merge("acme", |record| async move {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok::<_, Infallible>(record)
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(lock(&store.turns).len(), 1);

        held.await.unwrap().unwrap();
        let _ = store.merge("gone", |_| async { Err::<EntityRecord, _>("boom") }).await;

        assert!(lock(&store.turns).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_keys_do_not_wait() {
        let store = Arc::new(store());

        let blocked = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .merge("slow", |record| async move {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok::<_, Infallible>(record)
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let started = tokio::time::Instant::now();
        store.apply("fast", categories(&["Pub"])).await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!store.contains("slow"));

        blocked.await.unwrap().unwrap();
        assert!(store.contains("slow"));
    }

    #[tokio::test]
    async fn test_persist_and_resume() {
        let storage = share(MemoryStorage::new());

        let store = EntityStore::new(storage.clone());
        store.apply("acme", categories(&["Bar"])).await;
        store.persist().unwrap();

        let resumed = EntityStore::open(storage).unwrap();
        assert_eq!(resumed.get("acme").unwrap().categories, vec!["Bar"]);
    }

    #[tokio::test]
    async fn test_export_filters_and_stamps() {
        let store = store();
        store.apply("zeta", categories(&["Cafe"])).await;
        store.apply("empty", categories(&[])).await;
        store.apply("acme", categories(&["Bar"])).await;

        let finished = Utc::now();
        let exported = store.export(finished);

        assert_eq!(exported.len(), 2);
        assert_eq!(exported[0].categories, vec!["Bar"]);
        assert_eq!(exported[1].categories, vec!["Cafe"]);
        assert!(exported
            .iter()
            .all(|r| r.version == Some(SCHEMA_VERSION) && r.finished_at == Some(finished)));
    }
}
