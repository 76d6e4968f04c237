//! Read-only chat lookups for the non-realtime parts of the application

use relaydesk_shared::{AgentId, ChatMessage, ChatStore, ChatSummary, ClientId, Role, StoreResult};
use std::sync::Arc;

#[derive(Clone)]
pub struct ChatQueryService {
    store: Arc<dyn ChatStore>,
}

impl ChatQueryService {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Messages of the open chat of `subject_id`.
    ///
    /// `role` says whether `subject_id` is a client or an agent identity.
    /// Returns `None` when that subject has no open chat.
    pub async fn message_history(&self, subject_id: &str, role: Role) -> StoreResult<Option<Vec<ChatMessage>>> {
        let chat = match role {
            Role::Client => match ClientId::new(subject_id) {
                Some(client_id) => self.store.find_open_by_client(&client_id).await?,
                None => None,
            },
            Role::Agent => match AgentId::new(subject_id) {
                Some(agent_id) => self.store.find_open_by_agent(&agent_id).await?,
                None => None,
            },
        };

        Ok(chat.map(|c| c.messages))
    }

    /// Open chats waiting for an agent
    pub async fn unassigned_queue(&self) -> StoreResult<Vec<ChatSummary>> {
        self.store.list_unassigned_open().await
    }

    /// Open chats assigned to `agent_id`
    pub async fn agent_queue(&self, agent_id: &AgentId) -> StoreResult<Vec<ChatSummary>> {
        self.store.list_open_for_agent(agent_id).await
    }
}
