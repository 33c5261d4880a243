//! Job execution: turning a claimed annotation request into an annotation.
//!
//! [`JobProcessor`] is the seam between the queue's state machine and the
//! model backend, so worker behavior (retries, timeouts, idempotence) can be
//! tested with a stub processor.

use std::sync::Arc;

use annolab_core::annotation::{estimate_confidence, Annotation, AnnotationRequest};
use annolab_gate::ConcurrencyGate;
use annolab_inference::{GenerationRequest, InferenceClient};
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

/// Errors from a processing attempt. All variants are treated as transient
/// by the queue and retried until attempts are exhausted.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The model backend failed to produce a result.
    #[error("{0}")]
    Inference(String),
}

/// Executes one annotation request.
#[async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    async fn process(&self, request: &AnnotationRequest) -> Result<Annotation, ProcessorError>;
}

// ---------------------------------------------------------------------------
// InferenceProcessor
// ---------------------------------------------------------------------------

/// Production processor: runs the request through the model server, with
/// every call admitted by the shared concurrency gate.
pub struct InferenceProcessor {
    gate: Arc<ConcurrencyGate>,
    client: Arc<InferenceClient>,
}

impl InferenceProcessor {
    pub fn new(gate: Arc<ConcurrencyGate>, client: Arc<InferenceClient>) -> Self {
        Self { gate, client }
    }

    fn build_prompt(request: &AnnotationRequest) -> String {
        let mut prompt = format!(
            "Please analyze the following content and provide an annotation:\n\n{}",
            request.content
        );
        if let (Some(media_type), Some(media_url)) = (&request.media_type, &request.media_url) {
            prompt.push_str(&format!("\n\nAttached {media_type}: {media_url}"));
        }
        prompt
    }

    fn build_system(request: &AnnotationRequest) -> String {
        format!(
            "You are the annotation persona '{}'. Respond with a concise annotation of the \
             provided content, in character.",
            request.persona_id
        )
    }
}

#[async_trait]
impl JobProcessor for InferenceProcessor {
    async fn process(&self, request: &AnnotationRequest) -> Result<Annotation, ProcessorError> {
        let generation = GenerationRequest {
            prompt: Self::build_prompt(request),
            system: Some(Self::build_system(request)),
            temperature: None,
            max_tokens: None,
        };

        let gated = self.gate.submit(|| self.client.generate(&generation)).await;
        debug!(
            persona_id = %request.persona_id,
            queue_ms = gated.queue_time.as_millis() as u64,
            processing_ms = gated.processing_time.as_millis() as u64,
            "Inference call finished"
        );

        let response = gated
            .result
            .map_err(|e| ProcessorError::Inference(e.to_string()))?;

        Ok(Annotation {
            id: uuid::Uuid::new_v4(),
            persona_id: request.persona_id.clone(),
            item_id: request.item_id.clone(),
            confidence: estimate_confidence(&response.text),
            annotation: response.text,
            created_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
