//! HTTP client for an Ollama-compatible model-serving endpoint.
//!
//! The rest of the platform never talks to the model server directly;
//! inference calls go through [`InferenceClient`], wrapped by the
//! concurrency gate in the queue's processor.

mod client;

pub use client::{
    GenerationRequest, GenerationResponse, InferenceClient, InferenceConfig, InferenceError,
};
