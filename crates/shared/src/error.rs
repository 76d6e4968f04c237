//! Error types for the chat persistence gateway

use thiserror::Error;

use crate::types::ChatId;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No open chat matched the client filter, usually because the chat was
    /// finished between the read and the write.
    #[error("No open chat found for client: {0}")]
    NoOpenChat(String),

    #[error("Chat not found: {0}")]
    ChatNotFound(ChatId),

    #[error("Chat is finished: {0}")]
    ChatFinished(ChatId),

    #[error("Chat {chat_id} is already assigned to agent {agent_id}")]
    AlreadyAssigned { chat_id: ChatId, agent_id: String },

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
