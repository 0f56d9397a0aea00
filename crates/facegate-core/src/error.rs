use crate::extractor::ExtractError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FaceError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("no face detected in the image")]
    NoFaceDetected,
    /// The face is already registered to a different identity.
    #[error("face already registered to identity {existing}")]
    DuplicateFace { existing: String },
    #[error("identity not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Storage(StoreError),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding contains non-finite values")]
    NonFinite,
    #[error("no feature extractor configured")]
    ExtractorUnavailable,
}

impl FaceError {
    /// Caller contract violations. These are not folded into a structured
    /// response; the boundary rejects the call outright.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. } | Self::NonFinite)
    }
}

impl From<StoreError> for FaceError {
    /// Store-side contract rejections keep their contract classification;
    /// everything else is a storage failure.
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DimensionMismatch { expected, actual } => Self::DimensionMismatch { expected, actual },
            StoreError::NonFinite => Self::NonFinite,
            other => Self::Storage(other),
        }
    }
}

impl From<ExtractError> for FaceError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::InvalidImage(msg) => Self::InvalidImage(msg),
            ExtractError::NoFaceDetected => Self::NoFaceDetected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_contract_errors_stay_contract_violations() {
        let err = FaceError::from(StoreError::DimensionMismatch { expected: 2, actual: 4 });
        assert_eq!(err, FaceError::DimensionMismatch { expected: 2, actual: 4 });
        assert!(err.is_contract_violation());

        assert_eq!(FaceError::from(StoreError::NonFinite), FaceError::NonFinite);

        let err = FaceError::from(StoreError::Corrupt("row 3".into()));
        assert_eq!(err, FaceError::Storage(StoreError::Corrupt("row 3".into())));
        assert!(!err.is_contract_violation());
    }
}
