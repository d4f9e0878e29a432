use supabase_gateway::GatewayError;
use thiserror::Error;

/// Errors surfaced by chat operations.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message content is empty")]
    EmptyMessage,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

pub type ChatResult<T> = Result<T, ChatError>;
