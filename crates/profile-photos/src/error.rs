use supabase_gateway::GatewayError;
use thiserror::Error;

/// Errors surfaced by photo storage and signed-URL operations.
#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("Failed to sign URL for {file_name}: {source}")]
    SignFailed {
        file_name: String,
        source: GatewayError,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

pub type PhotoResult<T> = Result<T, PhotoError>;
