/// Domain-level error type shared across the platform.
///
/// HTTP-specific concerns (status codes, response bodies) live in the API
/// crate's `AppError`, which wraps this enum.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An entity lookup failed.
    #[error("{entity} with id {id} not found")]
    NotFound {
        /// Entity kind, e.g. `"Job"`.
        entity: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// Input failed validation, with a human-readable message.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The request conflicts with current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}
