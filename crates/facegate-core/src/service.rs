//! Registration and recognition policy over an [`EmbeddingStore`].
//!
//! Every operation is a linear scan of the whole registry: O(N·D) per call.
//! That is the intended ceiling for small-to-medium registries; there is no
//! approximate nearest-neighbour index.

use std::sync::Arc;

use crate::error::FaceError;
use crate::extractor::FaceExtractor;
use crate::matcher::{CosineMatcher, SimilarityMatcher};
use crate::store::{EmbeddingStore, StoreError, Upsert};
use crate::types::{Embedding, IdentityRecord, StoredEmbedding};

/// Successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registered {
    /// False when an existing record for the same identity was overwritten.
    pub created: bool,
}

/// Result of a recognition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    Match {
        identity_id: String,
        confidence: f32,
    },
    /// The registry holds no identities; no score was computed.
    EmptyRegistry,
    /// Best score did not clear the threshold. Never negative.
    NoMatch { confidence: f32 },
}

/// Orchestrates the registry and the matcher. Holds no per-call state and is
/// safe to share across threads; each call runs against its own store
/// transaction.
pub struct IdentityService<S, M = CosineMatcher> {
    store: S,
    matcher: M,
    dimension: usize,
    extractor: Option<Arc<dyn FaceExtractor>>,
}

impl<S: EmbeddingStore, M: SimilarityMatcher> IdentityService<S, M> {
    /// `dimension` is the embedding width every call must use.
    pub fn new(store: S, matcher: M, dimension: usize) -> Self {
        Self {
            store,
            matcher,
            dimension,
            extractor: None,
        }
    }

    /// Attach the feature extractor used by the image-level operations.
    pub fn with_extractor(mut self, extractor: Arc<dyn FaceExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn threshold(&self) -> f32 {
        self.matcher.threshold()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Bind `embedding` to `identity_id`.
    ///
    /// Rejected with [`FaceError::DuplicateFace`] if the face already matches
    /// a different identity. Re-registering the same identity overwrites it.
    /// The duplicate scan and the upsert run inside one store write section.
    pub fn register(&self, identity_id: &str, embedding: &Embedding) -> Result<Registered, FaceError> {
        self.check_embedding(embedding)?;

        let veto = |rows: &[StoredEmbedding]| self.conflicting_identity(identity_id, embedding, rows);
        match self.store.upsert_unless(identity_id, embedding, &veto) {
            Ok(Upsert::Written { created }) => {
                tracing::info!(identity_id, created, "identity registered");
                Ok(Registered { created })
            }
            Ok(Upsert::Vetoed { conflicting_id }) => {
                tracing::warn!(
                    identity_id,
                    existing = %conflicting_id,
                    "registration rejected: face already bound to another identity"
                );
                Err(FaceError::DuplicateFace {
                    existing: conflicting_id,
                })
            }
            Err(err) => {
                tracing::warn!(identity_id, error = %err, "registration failed in store");
                Err(err.into())
            }
        }
    }

    /// Resolve `embedding` to the best-scoring registered identity.
    ///
    /// Ties on the best score go to the lowest `identity_id`.
    pub fn recognize(&self, embedding: &Embedding) -> Result<Recognition, FaceError> {
        self.check_embedding(embedding)?;

        let rows = self.store.list_all().map_err(|err| {
            tracing::warn!(error = %err, "recognition failed in store");
            err
        })?;

        let Some((best_id, best_sim)) = self.best_match(embedding, &rows)? else {
            tracing::debug!("recognize: registry empty");
            return Ok(Recognition::EmptyRegistry);
        };

        tracing::debug!(candidates = rows.len(), best = best_sim, "recognize: scan complete");

        if self.matcher.is_match(best_sim) {
            Ok(Recognition::Match {
                identity_id: best_id.to_string(),
                confidence: best_sim,
            })
        } else {
            Ok(Recognition::NoMatch {
                confidence: best_sim.max(0.0),
            })
        }
    }

    /// Remove `identity_id`. `Ok(false)` when there was nothing to remove.
    pub fn delete(&self, identity_id: &str) -> Result<bool, FaceError> {
        let removed = self.store.delete(identity_id).map_err(|err| {
            tracing::warn!(identity_id, error = %err, "delete failed in store");
            err
        })?;
        if removed {
            tracing::info!(identity_id, "identity deleted");
        } else {
            tracing::debug!(identity_id, "delete: no such identity");
        }
        Ok(removed)
    }

    pub fn lookup(&self, identity_id: &str) -> Result<IdentityRecord, FaceError> {
        self.store
            .record(identity_id)?
            .ok_or_else(|| FaceError::NotFound(identity_id.to_string()))
    }

    /// Registered identities in ascending order.
    pub fn identities(&self) -> Result<Vec<String>, FaceError> {
        Ok(self
            .store
            .list_all()?
            .into_iter()
            .map(|row| row.identity_id)
            .collect())
    }

    pub fn count(&self) -> Result<usize, FaceError> {
        Ok(self.store.count()?)
    }

    /// Extract an embedding from `image`, then [`register`](Self::register) it.
    pub fn register_image(&self, identity_id: &str, image: &[u8]) -> Result<Registered, FaceError> {
        let embedding = self.extract(image)?;
        self.register(identity_id, &embedding)
    }

    /// Extract an embedding from `image`, then [`recognize`](Self::recognize) it.
    pub fn recognize_image(&self, image: &[u8]) -> Result<Recognition, FaceError> {
        let embedding = self.extract(image)?;
        self.recognize(&embedding)
    }

    fn extract(&self, image: &[u8]) -> Result<Embedding, FaceError> {
        let extractor = self.extractor.as_ref().ok_or(FaceError::ExtractorUnavailable)?;
        extractor.extract(image).map_err(|err| {
            tracing::debug!(error = %err, "extraction failed");
            FaceError::from(err)
        })
    }

    fn check_embedding(&self, embedding: &Embedding) -> Result<(), FaceError> {
        if embedding.dim() != self.dimension {
            return Err(FaceError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.dim(),
            });
        }
        if !embedding.is_finite() {
            return Err(FaceError::NonFinite);
        }
        Ok(())
    }

    /// First other identity (in ascending id order) whose stored face matches.
    fn conflicting_identity(
        &self,
        identity_id: &str,
        embedding: &Embedding,
        rows: &[StoredEmbedding],
    ) -> Result<Option<String>, StoreError> {
        for row in rows {
            self.check_stored(row)?;
            if row.identity_id != identity_id
                && self.matcher.is_match(self.matcher.similarity(embedding, &row.embedding))
            {
                return Ok(Some(row.identity_id.clone()));
            }
        }
        Ok(None)
    }

    /// Highest-scoring row; equal scores resolve to the smaller identity_id
    /// regardless of the order the store returned them in. `None` only when
    /// `rows` is empty.
    fn best_match<'a>(
        &self,
        query: &Embedding,
        rows: &'a [StoredEmbedding],
    ) -> Result<Option<(&'a str, f32)>, FaceError> {
        let mut best: Option<(&'a str, f32)> = None;

        for row in rows {
            self.check_stored(row)?;
            let sim = self.matcher.similarity(query, &row.embedding);
            let better = match best {
                None => true,
                Some((id, score)) => sim > score || (sim == score && row.identity_id.as_str() < id),
            };
            if better {
                best = Some((row.identity_id.as_str(), sim));
            }
        }

        Ok(best)
    }

    /// A stored row of another width means the registry was written under a
    /// different configuration; it cannot be scored, so the scan fails.
    fn check_stored(&self, row: &StoredEmbedding) -> Result<(), StoreError> {
        if row.embedding.dim() == self.dimension {
            return Ok(());
        }
        tracing::error!(
            identity_id = %row.identity_id,
            stored = row.embedding.dim(),
            expected = self.dimension,
            "stored embedding has foreign dimension"
        );
        Err(StoreError::Corrupt(format!(
            "stored embedding for {} has {} values, registry is configured for {}",
            row.identity_id,
            row.embedding.dim(),
            self.dimension
        )))
    }
}
