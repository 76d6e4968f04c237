//! Chat data model shared between the relay and the persistence layer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Chat ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub Uuid);

impl ChatId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChatId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ChatId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ChatId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Identity of a user asking for support.
///
/// Values are produced by the upstream authentication layer; the relay never
/// parses tokens, it only refuses blank identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a support agent, verified upstream like [`ClientId`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Which side of the conversation authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Agent => "agent",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "client" | "user" => Ok(Role::Client),
            "agent" | "admin" => Ok(Role::Agent),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Lifecycle of a chat.
///
/// `OpenUnassigned -> OpenAssigned -> Finished`; nothing leaves `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    OpenUnassigned,
    OpenAssigned,
    Finished,
}

// =============================================================================
// Records
// =============================================================================

/// One relayed utterance, immutable once appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub role: Role,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ChatMessage {
    /// Message received from a client, stamped with the receipt time
    pub fn from_client(client_id: &ClientId, text: impl Into<String>) -> Self {
        Self {
            sender: client_id.as_str().to_string(),
            role: Role::Client,
            text: text.into(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Message received from an agent, stamped with the receipt time
    pub fn from_agent(agent_id: &AgentId, text: impl Into<String>) -> Self {
        Self {
            sender: agent_id.as_str().to_string(),
            role: Role::Agent,
            text: text.into(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// A single client-agent conversation with its message log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    pub client_id: String,
    pub agent_id: Option<String>,
    pub finished: bool,
    pub messages: Vec<ChatMessage>,
}

impl Chat {
    /// Fresh open, unassigned chat for a client
    pub fn new(client_id: &ClientId) -> Self {
        Self {
            id: ChatId::new(),
            client_id: client_id.as_str().to_string(),
            agent_id: None,
            finished: false,
            messages: Vec::new(),
        }
    }

    pub fn state(&self) -> ChatState {
        if self.finished {
            ChatState::Finished
        } else if self.agent_id.is_some() {
            ChatState::OpenAssigned
        } else {
            ChatState::OpenUnassigned
        }
    }

    pub fn is_open(&self) -> bool {
        !self.finished
    }

    /// Whether `agent_id` is the agent assigned to this chat
    pub fn is_assigned_to(&self, agent_id: &AgentId) -> bool {
        self.agent_id.as_deref() == Some(agent_id.as_str())
    }

    /// Client identity owning this chat
    pub fn owner(&self) -> ClientId {
        ClientId(self.client_id.clone())
    }

    pub fn summary(&self) -> ChatSummary {
        ChatSummary::new(
            self.id,
            self.client_id.clone(),
            self.agent_id.clone(),
            self.finished,
            self.messages.len(),
        )
    }
}

/// Chat without message bodies, used by the agent queues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: ChatId,
    pub client_id: String,
    pub agent_id: Option<String>,
    pub finished: bool,
    pub state: ChatState,
    pub message_count: usize,
}

impl ChatSummary {
    pub fn new(
        id: ChatId,
        client_id: String,
        agent_id: Option<String>,
        finished: bool,
        message_count: usize,
    ) -> Self {
        let state = match (finished, agent_id.is_some()) {
            (true, _) => ChatState::Finished,
            (false, true) => ChatState::OpenAssigned,
            (false, false) => ChatState::OpenUnassigned,
        };
        Self {
            id,
            client_id,
            agent_id,
            finished,
            state,
            message_count,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(id: &str) -> ClientId {
        ClientId::new(id).unwrap()
    }

    #[test]
    fn test_blank_identities_rejected() {
        assert!(ClientId::new("").is_none());
        assert!(ClientId::new("   ").is_none());
        assert!(AgentId::new("").is_none());
        assert_eq!(AgentId::new("a1").unwrap().as_str(), "a1");
    }

    #[test]
    fn test_chat_state_transitions() {
        let mut chat = Chat::new(&client("u1"));
        assert_eq!(chat.state(), ChatState::OpenUnassigned);
        assert!(chat.messages.is_empty());

        chat.agent_id = Some("a1".to_string());
        assert_eq!(chat.state(), ChatState::OpenAssigned);
        assert!(chat.is_assigned_to(&AgentId::new("a1").unwrap()));
        assert!(!chat.is_assigned_to(&AgentId::new("a2").unwrap()));

        chat.finished = true;
        assert_eq!(chat.state(), ChatState::Finished);
        assert!(!chat.is_open());
    }

    #[test]
    fn test_role_parsing_accepts_legacy_names() {
        assert_eq!("client".parse::<Role>().unwrap(), Role::Client);
        assert_eq!("user".parse::<Role>().unwrap(), Role::Client);
        assert_eq!("Agent".parse::<Role>().unwrap(), Role::Agent);
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Agent);
        assert!("support".parse::<Role>().is_err());
    }

    #[test]
    fn test_chat_serializes_with_camel_case_keys() {
        let mut chat = Chat::new(&client("u1"));
        chat.messages.push(ChatMessage::from_client(&client("u1"), "hello"));

        let json = serde_json::to_value(&chat).unwrap();
        assert_eq!(json["clientId"], "u1");
        assert!(json["agentId"].is_null());
        assert_eq!(json["finished"], false);
        assert_eq!(json["messages"][0]["role"], "client");
        assert_eq!(json["messages"][0]["text"], "hello");
        assert!(json["messages"][0]["timestamp"].is_string());
    }

    #[test]
    fn test_summary_drops_message_bodies() {
        let mut chat = Chat::new(&client("u1"));
        chat.messages.push(ChatMessage::from_client(&client("u1"), "a"));
        chat.messages.push(ChatMessage::from_client(&client("u1"), "b"));

        let summary = chat.summary();
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.state, ChatState::OpenUnassigned);

        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("messages").is_none());
        assert_eq!(json["messageCount"], 2);
    }
}
