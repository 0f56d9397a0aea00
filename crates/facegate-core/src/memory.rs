//! In-process registry backed by a `BTreeMap`.
//!
//! Intended for tests and small embedded deployments; nothing survives the
//! process. Iteration order is the map's key order, which gives `list_all`
//! its ascending `identity_id` ordering for free.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::store::{validate_write, EmbeddingStore, StoreError, Upsert, Veto};
use crate::types::{next_update_time, Embedding, IdentityRecord, StoredEmbedding};

#[derive(Debug, Default)]
struct Registry {
    /// Width pinned by construction or by the first write.
    dimension: Option<usize>,
    records: BTreeMap<String, IdentityRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Registry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that only accepts embeddings of `dimension` values.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            inner: RwLock::new(Registry {
                dimension: Some(dimension),
                records: BTreeMap::new(),
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Registry>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Registry>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

impl Registry {
    fn put(&mut self, identity_id: &str, embedding: &Embedding) -> Result<bool, StoreError> {
        validate_write(embedding, self.dimension)?;
        self.dimension = Some(embedding.dim());

        let now = Utc::now();
        match self.records.get_mut(identity_id) {
            Some(existing) => {
                existing.embedding = embedding.clone();
                existing.updated_at = next_update_time(existing.updated_at, now);
                Ok(false)
            }
            None => {
                self.records.insert(
                    identity_id.to_string(),
                    IdentityRecord {
                        identity_id: identity_id.to_string(),
                        record_id: uuid::Uuid::new_v4().to_string(),
                        embedding: embedding.clone(),
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(true)
            }
        }
    }

    fn snapshot(&self) -> Vec<StoredEmbedding> {
        self.records
            .values()
            .map(|r| StoredEmbedding {
                identity_id: r.identity_id.clone(),
                embedding: r.embedding.clone(),
            })
            .collect()
    }
}

impl EmbeddingStore for MemoryStore {
    fn upsert(&self, identity_id: &str, embedding: &Embedding) -> Result<bool, StoreError> {
        self.write()?.put(identity_id, embedding)
    }

    fn upsert_unless(
        &self,
        identity_id: &str,
        embedding: &Embedding,
        veto: Veto<'_>,
    ) -> Result<Upsert, StoreError> {
        // Write lock held across scan and write.
        let mut registry = self.write()?;
        if let Some(conflicting_id) = veto(&registry.snapshot())? {
            return Ok(Upsert::Vetoed { conflicting_id });
        }
        let created = registry.put(identity_id, embedding)?;
        Ok(Upsert::Written { created })
    }

    fn list_all(&self) -> Result<Vec<StoredEmbedding>, StoreError> {
        let registry = self.read()?;
        Ok(registry.snapshot())
    }

    fn get(&self, identity_id: &str) -> Result<Option<Embedding>, StoreError> {
        Ok(self.read()?.records.get(identity_id).map(|r| r.embedding.clone()))
    }

    fn record(&self, identity_id: &str) -> Result<Option<IdentityRecord>, StoreError> {
        Ok(self.read()?.records.get(identity_id).cloned())
    }

    fn delete(&self, identity_id: &str) -> Result<bool, StoreError> {
        Ok(self.write()?.records.remove(identity_id).is_some())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.records.len())
    }
}
