//! Durable identity → embedding registry contract.
//!
//! Implementations acquire whatever connection they need per call and
//! release it before returning; no state carries over between calls.
//! A genuine storage failure is always an `Err(StoreError)`, never an
//! empty list, `None`, or `false`.

use crate::types::{Embedding, IdentityRecord, StoredEmbedding};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backing store could not be reached in time (locked, busy, cannot open).
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The store engine failed mid-operation.
    #[error("store db error: {0}")]
    Db(String),
    /// Stored data could not be decoded.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Write of an embedding whose width differs from the registry's.
    #[error("embedding dimension mismatch: registry holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Write of an embedding containing NaN or infinite values.
    #[error("embedding contains non-finite values")]
    NonFinite,
}

impl StoreError {
    /// Rejections caused by the caller's input rather than the backing store.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. } | Self::NonFinite)
    }
}

/// Check an embedding against the registry width `pinned` (if any) before
/// it is written. Shared by every store implementation.
pub fn validate_write(embedding: &Embedding, pinned: Option<usize>) -> Result<(), StoreError> {
    if let Some(expected) = pinned {
        if embedding.dim() != expected {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: embedding.dim(),
            });
        }
    }
    if !embedding.is_finite() {
        return Err(StoreError::NonFinite);
    }
    Ok(())
}

/// Outcome of [`EmbeddingStore::upsert_unless`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    /// The embedding was written. `created` is false for an overwrite.
    Written { created: bool },
    /// The veto rejected the write; nothing was changed.
    Vetoed { conflicting_id: String },
}

/// Inspects every stored embedding and names a conflicting identity, if any.
/// An `Err` aborts the write and is returned to the caller unchanged.
pub type Veto<'a> = &'a dyn Fn(&[StoredEmbedding]) -> Result<Option<String>, StoreError>;

pub trait EmbeddingStore: Send + Sync {
    /// Insert or replace the embedding for `identity_id` in one transaction.
    ///
    /// Returns `true` when a new record was created. The first write pins the
    /// registry width; later writes of another width, or with non-finite
    /// values, are refused before anything is stored.
    fn upsert(&self, identity_id: &str, embedding: &Embedding) -> Result<bool, StoreError>;

    /// Scan the registry and write only if `veto` finds no conflict.
    ///
    /// The scan and the write happen inside one exclusive write section, so
    /// no other writer can commit between the check and the upsert.
    fn upsert_unless(
        &self,
        identity_id: &str,
        embedding: &Embedding,
        veto: Veto<'_>,
    ) -> Result<Upsert, StoreError>;

    /// Every record, ordered by ascending `identity_id`.
    fn list_all(&self) -> Result<Vec<StoredEmbedding>, StoreError>;

    fn get(&self, identity_id: &str) -> Result<Option<Embedding>, StoreError>;

    /// Full record including timestamps.
    fn record(&self, identity_id: &str) -> Result<Option<IdentityRecord>, StoreError>;

    /// `true` iff a record existed and was removed.
    fn delete(&self, identity_id: &str) -> Result<bool, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;
}

impl<S: EmbeddingStore + ?Sized> EmbeddingStore for std::sync::Arc<S> {
    fn upsert(&self, identity_id: &str, embedding: &Embedding) -> Result<bool, StoreError> {
        (**self).upsert(identity_id, embedding)
    }

    fn upsert_unless(
        &self,
        identity_id: &str,
        embedding: &Embedding,
        veto: Veto<'_>,
    ) -> Result<Upsert, StoreError> {
        (**self).upsert_unless(identity_id, embedding, veto)
    }

    fn list_all(&self) -> Result<Vec<StoredEmbedding>, StoreError> {
        (**self).list_all()
    }

    fn get(&self, identity_id: &str) -> Result<Option<Embedding>, StoreError> {
        (**self).get(identity_id)
    }

    fn record(&self, identity_id: &str) -> Result<Option<IdentityRecord>, StoreError> {
        (**self).record(identity_id)
    }

    fn delete(&self, identity_id: &str) -> Result<bool, StoreError> {
        (**self).delete(identity_id)
    }

    fn count(&self) -> Result<usize, StoreError> {
        (**self).count()
    }
}
