//! Persistence gateway for chat records
//!
//! Every operation touches a single chat. Writes are filtered updates, except
//! message appends, which lock the open chat so timestamps stay ordered.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{AgentId, Chat, ChatId, ChatMessage, ChatSummary, ClientId};

/// Typed operations against the chat store.
///
/// Implementations must keep at most one open chat per client and must never
/// flip a finished chat back to open.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create an open, unassigned chat for `client_id`.
    ///
    /// If the client already has an open chat, that chat is returned instead.
    async fn create_chat(&self, client_id: &ClientId) -> StoreResult<Chat>;

    async fn find_by_id(&self, chat_id: ChatId) -> StoreResult<Option<Chat>>;

    async fn find_open_by_client(&self, client_id: &ClientId) -> StoreResult<Option<Chat>>;

    async fn find_open_by_agent(&self, agent_id: &AgentId) -> StoreResult<Option<Chat>>;

    /// Assign `agent_id` to an open chat.
    ///
    /// Succeeds without change when the chat is already assigned to the same
    /// agent. Fails with `ChatNotFound`, `ChatFinished` or `AlreadyAssigned`.
    async fn assign_agent(&self, chat_id: ChatId, agent_id: &AgentId) -> StoreResult<Chat>;

    /// Append to the open chat of `client_id`.
    ///
    /// Returns `StoreError::NoOpenChat` when no open chat matched.
    async fn append_message(&self, client_id: &ClientId, message: ChatMessage) -> StoreResult<()>;

    /// Mark a chat finished. Finishing twice is not an error.
    async fn mark_finished(&self, chat_id: ChatId) -> StoreResult<()>;

    /// Open chats nobody has picked up yet, oldest first
    async fn list_unassigned_open(&self) -> StoreResult<Vec<ChatSummary>>;

    /// Open chats assigned to `agent_id`, oldest first
    async fn list_open_for_agent(&self, agent_id: &AgentId) -> StoreResult<Vec<ChatSummary>>;

    /// Cheap connectivity check used by the health endpoints
    async fn ping(&self) -> StoreResult<()>;
}
