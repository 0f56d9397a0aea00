use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Face embedding vector (typically 512-dimensional for ArcFace / buffalo_l).
///
/// Serialized transparently as a JSON array of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Number of components.
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// True when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// One row of the registry as returned by a full scan.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmbedding {
    pub identity_id: String,
    pub embedding: Embedding,
}

/// A registered identity with its bookkeeping timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub identity_id: String,
    /// Surrogate key assigned on first insert; survives overwrites.
    pub record_id: String,
    pub embedding: Embedding,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Timestamp for an overwrite of a record last touched at `previous`.
///
/// Never returns a value at or before `previous`, so `updated_at` advances
/// even when two writes land inside one clock tick.
pub fn next_update_time(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = previous + chrono::Duration::microseconds(1);
    if now > previous {
        now
    } else {
        floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_serializes_as_plain_array() {
        let e = Embedding::new(vec![1.0, 0.5, -2.0]);
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, "[1.0,0.5,-2.0]");
        let back: Embedding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_embedding_finite_check() {
        assert!(Embedding::new(vec![0.0, 1.0]).is_finite());
        assert!(!Embedding::new(vec![f32::NAN, 1.0]).is_finite());
        assert!(!Embedding::new(vec![f32::INFINITY]).is_finite());
    }

    #[test]
    fn test_next_update_time_advances_within_same_tick() {
        let t = Utc::now();
        let next = next_update_time(t, t);
        assert!(next > t);

        let later = t + chrono::Duration::seconds(1);
        assert_eq!(next_update_time(t, later), later);
    }
}
