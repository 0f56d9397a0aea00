//! Transport-agnostic reply shapes for the Register / Recognize / Delete
//! operations. Contract violations (see [`FaceError::is_contract_violation`])
//! are handed back to the boundary instead of being folded into a reply.

use serde::{Deserialize, Serialize};

use crate::error::FaceError;
use crate::service::{Recognition, Registered};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizeResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// Message for failures shared by every operation.
fn failure_message(err: &FaceError) -> String {
    match err {
        FaceError::InvalidImage(_) => "Invalid image data".into(),
        FaceError::NoFaceDetected => "No face detected in the image".into(),
        FaceError::DuplicateFace { .. } => "This face is already registered to another identity".into(),
        FaceError::NotFound(_) => "No face registered for this identity".into(),
        FaceError::Storage(e) => format!("Storage unavailable: {e}"),
        other => other.to_string(),
    }
}

impl RegisterResponse {
    pub fn from_result(result: Result<Registered, FaceError>) -> Result<Self, FaceError> {
        match result {
            Ok(_) => Ok(Self {
                success: true,
                message: "Face registered successfully".into(),
            }),
            Err(err) if err.is_contract_violation() => Err(err),
            Err(FaceError::Storage(e)) => Ok(Self {
                success: false,
                message: format!("Failed to save face data: {e}"),
            }),
            Err(err) => Ok(Self {
                success: false,
                message: failure_message(&err),
            }),
        }
    }
}

impl RecognizeResponse {
    pub fn from_result(result: Result<Recognition, FaceError>) -> Result<Self, FaceError> {
        match result {
            Ok(Recognition::Match {
                identity_id,
                confidence,
            }) => Ok(Self {
                success: true,
                identity_id: Some(identity_id),
                confidence: Some(confidence),
                message: "Face recognized successfully".into(),
            }),
            Ok(Recognition::EmptyRegistry) => Ok(Self {
                success: false,
                identity_id: None,
                confidence: None,
                message: "No registered identities".into(),
            }),
            Ok(Recognition::NoMatch { confidence }) => Ok(Self {
                success: false,
                identity_id: None,
                confidence: Some(confidence),
                message: "Face not recognized".into(),
            }),
            Err(err) if err.is_contract_violation() => Err(err),
            Err(err) => Ok(Self {
                success: false,
                identity_id: None,
                confidence: None,
                message: failure_message(&err),
            }),
        }
    }
}

impl DeleteResponse {
    pub fn from_result(result: Result<bool, FaceError>) -> Result<Self, FaceError> {
        match result {
            Ok(true) => Ok(Self {
                success: true,
                message: "Face deleted successfully".into(),
            }),
            Ok(false) => Ok(Self {
                success: false,
                message: failure_message(&FaceError::NotFound(String::new())),
            }),
            Err(err) if err.is_contract_violation() => Err(err),
            Err(err) => Ok(Self {
                success: false,
                message: failure_message(&err),
            }),
        }
    }
}
