//! Error types for session operations.

use retry_queue::QueueError;
use supabase_gateway::GatewayError;
use thiserror::Error;
use token_vault::StorageError;

/// Errors surfaced by the session manager.
///
/// Backend failures are classified into a small taxonomy here; callers
/// must not rely on the wording of the wrapped messages.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email is already registered")]
    EmailAlreadyRegistered,

    #[error("Invalid account type: {0}")]
    InvalidAccountType(String),

    #[error("Account could not be created: {0}")]
    Creation(String),

    #[error("Backend request failed: {0}")]
    Transient(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    /// Classify a backend failure from a credential call.
    pub(crate) fn auth(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidCredentials => SessionError::InvalidCredentials,
            GatewayError::EmailTaken => SessionError::EmailAlreadyRegistered,
            other => SessionError::Transient(other.to_string()),
        }
    }

    /// Classify a backend failure from an account or profile write.
    pub(crate) fn creation(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidCredentials => SessionError::InvalidCredentials,
            GatewayError::EmailTaken => SessionError::EmailAlreadyRegistered,
            other => SessionError::Creation(other.to_string()),
        }
    }
}

/// Map the outcome of a queued sign-in call.
pub(crate) fn queued_auth_error(err: QueueError<GatewayError>) -> SessionError {
    match err {
        QueueError::Operation(err) => SessionError::auth(err),
        QueueError::Cancelled => SessionError::Cancelled,
        QueueError::Closed => SessionError::Transient("retry queue is not running".to_string()),
    }
}

/// Map the outcome of a queued sign-up call.
pub(crate) fn queued_creation_error(err: QueueError<GatewayError>) -> SessionError {
    match err {
        QueueError::Operation(err) => SessionError::creation(err),
        QueueError::Cancelled => SessionError::Cancelled,
        QueueError::Closed => SessionError::Transient("retry queue is not running".to_string()),
    }
}
