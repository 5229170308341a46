//! Crate-wide error taxonomy
//!
//! One enum for every fallible operation exposed by [`crate::api::Stm`] and
//! its collaborators. Mirrors the pattern used throughout the storage layer
//! this crate was generalized from: a `#[non_exhaustive]`, `thiserror`-derived
//! enum with a `Result<T>` alias.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StmError>;

/// Error taxonomy for the STM engine (spec §7).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StmError {
    /// Input violated a stated constraint (size limit, range, shape).
    #[error("invalid argument `{field}`: {message}")]
    InvalidArgument {
        /// Name of the offending field.
        field: String,
        /// Human-readable description of the violation.
        message: String,
    },

    /// An id lookup failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated (duplicate relation, already promoted).
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
        /// Id of the existing record that conflicts, if known.
        existing_id: Option<String>,
    },

    /// An optional external collaborator (embedding backend, vault) was
    /// unavailable. Callers recover locally per spec §7; this variant exists
    /// for paths that must still surface the condition (e.g. `promote_memory`
    /// with no vault configured).
    #[error("dependency unavailable: {0}")]
    Dependency(String),

    /// Unexpected internal failure. Never raised out of the activation hot
    /// path (it degrades to a fallback tier instead); used elsewhere.
    #[error("internal error: {0}")]
    Internal(String),

    /// Underlying I/O failure (storage file access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON encountered while loading or parsing storage records.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StmError {
    /// Build an [`StmError::InvalidArgument`] for `field` with a remediation `message`.
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        StmError::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Build an [`StmError::Conflict`] referencing an existing record id.
    pub fn conflict(message: impl Into<String>, existing_id: impl Into<String>) -> Self {
        StmError::Conflict {
            message: message.into(),
            existing_id: Some(existing_id.into()),
        }
    }

    /// True if this error should be surfaced to the user with a remediation hint
    /// rather than a bare message (spec §7: "no stack traces in user-facing output").
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            StmError::InvalidArgument { .. } | StmError::NotFound(_) | StmError::Conflict { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_carries_field_name() {
        let err = StmError::invalid_argument("content", "exceeds 50000 chars");
        assert!(err.to_string().contains("content"));
        assert!(err.is_user_actionable());
    }

    #[test]
    fn dependency_errors_are_not_user_actionable() {
        let err = StmError::Dependency("vault path not configured".into());
        assert!(!err.is_user_actionable());
    }
}
