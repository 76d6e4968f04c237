//! In-process [`ChatStore`] used by tests and single-node development runs

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::store::ChatStore;
use crate::types::{AgentId, Chat, ChatId, ChatMessage, ChatSummary, ClientId};

/// Chat store that keeps every chat in memory, in creation order.
///
/// Finished chats are kept as history, same as the PostgreSQL store.
#[derive(Default)]
pub struct MemoryChatStore {
    chats: RwLock<Vec<Chat>>,
    unavailable: AtomicBool,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a database error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database("store unavailable".to_string()));
        }
        Ok(())
    }

    /// Number of chats ever created, finished ones included
    pub async fn chat_count(&self) -> usize {
        self.chats.read().await.len()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn create_chat(&self, client_id: &ClientId) -> StoreResult<Chat> {
        self.check_available()?;
        let mut chats = self.chats.write().await;

        if let Some(existing) = chats
            .iter()
            .find(|c| c.is_open() && c.client_id == client_id.as_str())
        {
            return Ok(existing.clone());
        }

        let chat = Chat::new(client_id);
        chats.push(chat.clone());
        tracing::info!(chat_id = %chat.id, client_id = %client_id, "Chat created");
        Ok(chat)
    }

    async fn find_by_id(&self, chat_id: ChatId) -> StoreResult<Option<Chat>> {
        self.check_available()?;
        let chats = self.chats.read().await;
        Ok(chats.iter().find(|c| c.id == chat_id).cloned())
    }

    async fn find_open_by_client(&self, client_id: &ClientId) -> StoreResult<Option<Chat>> {
        self.check_available()?;
        let chats = self.chats.read().await;
        Ok(chats
            .iter()
            .find(|c| c.is_open() && c.client_id == client_id.as_str())
            .cloned())
    }

    async fn find_open_by_agent(&self, agent_id: &AgentId) -> StoreResult<Option<Chat>> {
        self.check_available()?;
        let chats = self.chats.read().await;
        Ok(chats
            .iter()
            .find(|c| c.is_open() && c.is_assigned_to(agent_id))
            .cloned())
    }

    async fn assign_agent(&self, chat_id: ChatId, agent_id: &AgentId) -> StoreResult<Chat> {
        self.check_available()?;
        let mut chats = self.chats.write().await;
        let chat = chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or(StoreError::ChatNotFound(chat_id))?;

        if chat.finished {
            return Err(StoreError::ChatFinished(chat_id));
        }
        match &chat.agent_id {
            Some(current) if current != agent_id.as_str() => {
                return Err(StoreError::AlreadyAssigned {
                    chat_id,
                    agent_id: current.clone(),
                });
            }
            Some(_) => {}
            None => chat.agent_id = Some(agent_id.as_str().to_string()),
        }

        Ok(chat.clone())
    }

    async fn append_message(&self, client_id: &ClientId, mut message: ChatMessage) -> StoreResult<()> {
        self.check_available()?;
        let mut chats = self.chats.write().await;
        let chat = chats
            .iter_mut()
            .find(|c| c.is_open() && c.client_id == client_id.as_str())
            .ok_or_else(|| StoreError::NoOpenChat(client_id.to_string()))?;

        if let Some(last) = chat.messages.last() {
            if last.timestamp > message.timestamp {
                message.timestamp = last.timestamp;
            }
        }
        chat.messages.push(message);
        Ok(())
    }

    async fn mark_finished(&self, chat_id: ChatId) -> StoreResult<()> {
        self.check_available()?;
        let mut chats = self.chats.write().await;
        let chat = chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or(StoreError::ChatNotFound(chat_id))?;
        chat.finished = true;
        Ok(())
    }

    async fn list_unassigned_open(&self) -> StoreResult<Vec<ChatSummary>> {
        self.check_available()?;
        let chats = self.chats.read().await;
        Ok(chats
            .iter()
            .filter(|c| c.is_open() && c.agent_id.is_none())
            .map(Chat::summary)
            .collect())
    }

    async fn list_open_for_agent(&self, agent_id: &AgentId) -> StoreResult<Vec<ChatSummary>> {
        self.check_available()?;
        let chats = self.chats.read().await;
        Ok(chats
            .iter()
            .filter(|c| c.is_open() && c.is_assigned_to(agent_id))
            .map(Chat::summary)
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_available()
    }
}
