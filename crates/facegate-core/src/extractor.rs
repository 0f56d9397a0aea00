//! Feature extraction collaborator.
//!
//! Turning a raw image into an embedding (decoding, detection, alignment,
//! inference) happens outside this crate. The service only consumes the
//! extractor's output or its failure signal.

use crate::types::Embedding;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("no face detected")]
    NoFaceDetected,
}

/// Produces a fixed-dimension embedding from raw image bytes.
pub trait FaceExtractor: Send + Sync {
    fn extract(&self, image: &[u8]) -> Result<Embedding, ExtractError>;
}

impl<F> FaceExtractor for F
where
    F: Fn(&[u8]) -> Result<Embedding, ExtractError> + Send + Sync,
{
    fn extract(&self, image: &[u8]) -> Result<Embedding, ExtractError> {
        self(image)
    }
}
