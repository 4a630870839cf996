//! Error taxonomy for the processing core.
//!
//! Infrastructure (stores, HTTP collaborators) reports `anyhow::Error`; the
//! domain layer maps those into one of these variants so callers can tell a
//! missing row from a dead provider from a lifecycle mistake.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use super::PodcastId;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad input (empty item list, missing email address, no script yet).
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("podcast {0} has no items")]
    NoItems(PodcastId),

    /// The requested status change is not an edge of the state machine.
    #[error("{entity} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("persistence error: {0:#}")]
    Persistence(#[source] anyhow::Error),

    /// An AI, speech, stitching or storage collaborator failed or returned
    /// something unusable.
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("unknown speaker '{0}'")]
    UnknownSpeaker(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("worker pool is already running")]
    AlreadyRunning,

    #[error("worker pool is not running")]
    NotRunning,
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<Uuid>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        CoreError::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Wraps a collaborator failure, keeping the whole context chain.
    pub fn generation(err: anyhow::Error) -> Self {
        CoreError::Generation(format!("{:#}", err))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Persistence(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_entity() {
        let id = Uuid::nil();
        let err = CoreError::not_found("item", id);
        assert_eq!(err.to_string(), format!("item {} not found", id));
        assert!(err.is_not_found());
    }

    #[test]
    fn generation_keeps_context_chain() {
        let err = anyhow::anyhow!("HTTP 500").context("speech request failed");
        let err = CoreError::generation(err);
        assert_eq!(
            err.to_string(),
            "generation failed: speech request failed: HTTP 500"
        );
    }

    #[test]
    fn anyhow_maps_to_persistence() {
        let err: CoreError = anyhow::anyhow!("connection reset").into();
        assert!(matches!(err, CoreError::Persistence(_)));
    }
}
