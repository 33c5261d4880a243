//! Annotation request/result models and validation.
//!
//! The request is what callers submit to the job queue; the queue treats it
//! as opaque JSON, but the submission path validates it up front so bad
//! requests are rejected before a job row is created.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Maximum length of the `content` field, in bytes.
const MAX_CONTENT_LEN: usize = 100_000;

/// Media types accepted on a request.
const VALID_MEDIA_TYPES: &[&str] = &["image"];

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// An inference request submitted for asynchronous annotation.
///
/// Serialized with camelCase keys to match the public API wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRequest {
    /// Persona that should produce the annotation.
    pub persona_id: String,

    /// The content to annotate.
    pub content: String,

    /// Optional item the annotation attaches to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,

    /// Optional media kind (currently only `"image"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// Optional URL of the media referenced by `media_type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

impl AnnotationRequest {
    /// Validate the request.
    ///
    /// Rules:
    /// - `persona_id` and `content` must be non-empty.
    /// - `content` must not exceed `MAX_CONTENT_LEN` bytes.
    /// - `media_url` requires a valid `media_type`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.persona_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "personaId must not be empty".to_string(),
            ));
        }
        if self.content.trim().is_empty() {
            return Err(CoreError::Validation(
                "content must not be empty".to_string(),
            ));
        }
        if self.content.len() > MAX_CONTENT_LEN {
            return Err(CoreError::Validation(format!(
                "content must not exceed {MAX_CONTENT_LEN} bytes"
            )));
        }
        if let Some(media_type) = &self.media_type {
            if !VALID_MEDIA_TYPES.contains(&media_type.as_str()) {
                return Err(CoreError::Validation(format!(
                    "Invalid mediaType '{media_type}'. Must be one of: {}",
                    VALID_MEDIA_TYPES.join(", ")
                )));
            }
        }
        if self.media_url.is_some() && self.media_type.is_none() {
            return Err(CoreError::Validation(
                "mediaUrl requires mediaType".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// An annotation produced by a completed job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Unique annotation id, assigned by the worker at completion.
    pub id: uuid::Uuid,

    /// Persona that produced the annotation.
    pub persona_id: String,

    /// Item the annotation attaches to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,

    /// The generated annotation text.
    pub annotation: String,

    /// Heuristic confidence score in `0.0..=1.0`.
    pub confidence: f64,

    /// When the annotation was produced (UTC).
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Confidence heuristic
// ---------------------------------------------------------------------------

/// Estimate a confidence score from the generated text.
///
/// Length-banded placeholder: this is NOT genuine model confidence and can
/// be replaced without affecting the rest of the pipeline.
pub fn estimate_confidence(text: &str) -> f64 {
    match text.len() {
        0..=9 => 0.1,
        10..=49 => 0.3,
        50..=199 => 0.5,
        200..=499 => 0.7,
        _ => 0.9,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
