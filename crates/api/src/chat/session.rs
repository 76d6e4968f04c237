//! Chat session state machine
//!
//! `OpenUnassigned -> OpenAssigned -> Finished`. Clients open chats, agents
//! claim them, and only the agent's control token finishes one.

use relaydesk_shared::{AgentId, Chat, ChatId, ChatStore, ClientId, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Agent {agent_id} is already serving open chat {chat_id}")]
    AgentBusy { agent_id: String, chat_id: ChatId },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Open chat of `client_id`, created on first contact
pub async fn open_for_client(store: &dyn ChatStore, client_id: &ClientId) -> Result<Chat, StoreError> {
    if let Some(chat) = store.find_open_by_client(client_id).await? {
        tracing::debug!(chat_id = %chat.id, client_id = %client_id, "Resuming open chat");
        return Ok(chat);
    }

    store.create_chat(client_id).await
}

/// Bind `agent_id` to the chat `chat_id`.
///
/// Reconnecting to the chat the agent already serves changes nothing. An
/// agent serving a different open chat must finish it first.
pub async fn assign_agent(
    store: &dyn ChatStore,
    chat_id: ChatId,
    agent_id: &AgentId,
) -> Result<Chat, SessionError> {
    if let Some(current) = store.find_open_by_agent(agent_id).await? {
        if current.id == chat_id {
            return Ok(current);
        }
        return Err(SessionError::AgentBusy {
            agent_id: agent_id.to_string(),
            chat_id: current.id,
        });
    }

    let chat = store.assign_agent(chat_id, agent_id).await?;
    tracing::info!(chat_id = %chat_id, agent_id = %agent_id, "Chat assigned to agent");
    Ok(chat)
}

/// Move a chat to its terminal state
pub async fn finish(store: &dyn ChatStore, chat_id: ChatId) -> Result<(), StoreError> {
    store.mark_finished(chat_id).await?;
    tracing::info!(chat_id = %chat_id, "Chat finished");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use relaydesk_shared::{ChatState, MemoryChatStore};

    fn client(id: &str) -> ClientId {
        ClientId::new(id).unwrap()
    }

    fn agent(id: &str) -> AgentId {
        AgentId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_first_contact_creates_unassigned_chat() {
        let store = MemoryChatStore::new();
        let chat = open_for_client(&store, &client("u1")).await.unwrap();

        assert_eq!(chat.client_id, "u1");
        assert_eq!(chat.state(), ChatState::OpenUnassigned);
        assert!(chat.messages.is_empty());

        let again = open_for_client(&store, &client("u1")).await.unwrap();
        assert_eq!(again.id, chat.id);
    }

    #[tokio::test]
    async fn test_assignment_and_idempotent_reconnect() {
        let store = MemoryChatStore::new();
        let chat = open_for_client(&store, &client("u1")).await.unwrap();

        let assigned = assign_agent(&store, chat.id, &agent("a1")).await.unwrap();
        assert_eq!(assigned.state(), ChatState::OpenAssigned);
        assert_eq!(assigned.agent_id.as_deref(), Some("a1"));

        let again = assign_agent(&store, chat.id, &agent("a1")).await.unwrap();
        assert_eq!(again, assigned);
    }

    #[tokio::test]
    async fn test_busy_agent_cannot_take_second_chat() {
        let store = MemoryChatStore::new();
        let first = open_for_client(&store, &client("u1")).await.unwrap();
        let second = open_for_client(&store, &client("u2")).await.unwrap();

        assign_agent(&store, first.id, &agent("a1")).await.unwrap();
        let err = assign_agent(&store, second.id, &agent("a1")).await.unwrap_err();
        assert!(matches!(err, SessionError::AgentBusy { chat_id, .. } if chat_id == first.id));

        finish(&store, first.id).await.unwrap();
        let assigned = assign_agent(&store, second.id, &agent("a1")).await.unwrap();
        assert_eq!(assigned.id, second.id);
    }

    #[tokio::test]
    async fn test_unknown_chat_is_rejected() {
        let store = MemoryChatStore::new();
        let err = assign_agent(&store, ChatId::new(), &agent("a1")).await.unwrap_err();
        assert!(matches!(err, SessionError::Store(StoreError::ChatNotFound(_))));
    }

    #[tokio::test]
    async fn test_finished_chat_is_terminal() {
        let store = MemoryChatStore::new();
        let chat = open_for_client(&store, &client("u1")).await.unwrap();
        finish(&store, chat.id).await.unwrap();

        let err = assign_agent(&store, chat.id, &agent("a1")).await.unwrap_err();
        assert!(matches!(err, SessionError::Store(StoreError::ChatFinished(_))));

        let next = open_for_client(&store, &client("u1")).await.unwrap();
        assert_ne!(next.id, chat.id);
        assert_eq!(next.state(), ChatState::OpenUnassigned);
    }
}
