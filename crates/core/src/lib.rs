//! Shared domain types for the annotation platform.
//!
//! This crate has zero internal dependencies so that the queue, gate,
//! database, and API layers can all reference the same request/result
//! models, error enum, and realtime message envelope.

pub mod annotation;
pub mod error;
pub mod realtime;
pub mod types;

pub use error::CoreError;
