use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// The command is not legal for the aggregate's current status.
    #[error("Invalid transition: cannot {command} an incident in status '{from}'")]
    InvalidTransition { from: String, command: &'static str },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Stale version or an already-resolved merge suggestion. The caller must
    /// re-read and retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The AI oracle timed out or returned an unusable answer. Retryable.
    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the caller may retry the same request after re-reading state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Conflict(_) | CoreError::ExternalService(_))
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CoreError::Validation(errors.to_string())
    }
}
