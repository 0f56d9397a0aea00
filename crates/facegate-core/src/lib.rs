//! facegate-core — Face identity registry and matching policy.
//!
//! Binds face embeddings to caller-chosen identities, keeps one face per
//! identity, and resolves unknown embeddings to the closest enrolled one by
//! cosine similarity. Feature extraction and persistence are pluggable.

pub mod error;
pub mod extractor;
pub mod matcher;
pub mod memory;
pub mod response;
pub mod service;
pub mod store;
pub mod types;

pub use error::FaceError;
pub use extractor::{ExtractError, FaceExtractor};
pub use matcher::{CosineMatcher, SimilarityMatcher, DEFAULT_THRESHOLD};
pub use memory::MemoryStore;
pub use response::{DeleteResponse, RecognizeResponse, RegisterResponse};
pub use service::{IdentityService, Recognition, Registered};
pub use store::{EmbeddingStore, StoreError, Upsert};
pub use types::{Embedding, IdentityRecord, StoredEmbedding};
