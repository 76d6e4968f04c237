//! Connection registry
//!
//! Owns the single live agent connection and the set of client connections.
//! One lock guards both, and delivery happens while it is held, so a send
//! never races a register or unregister.

use relaydesk_shared::ChatId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::connection::Connection;

#[derive(Default)]
struct Slots {
    agent: Option<Arc<Connection>>,
    clients: HashMap<Uuid, Arc<Connection>>,
}

/// Shared registry of live relay connections
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    slots: Arc<Mutex<Slots>>,
}

/// Result of a fan-out to client connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Statistics about live connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RegistryStats {
    pub agent_connected: bool,
    pub client_connections: usize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `conn` as the agent connection, replacing any previous one.
    ///
    /// The displaced connection is cancelled, told to close and returned. Its
    /// relay loop stops before handling another frame.
    pub async fn set_agent(&self, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        let mut slots = self.slots.lock().await;
        let displaced = slots.agent.replace(Arc::clone(&conn));

        if let Some(previous) = &displaced {
            if previous.session_id != conn.session_id {
                previous.displace();
                tracing::warn!(
                    displaced_session_id = %previous.session_id,
                    session_id = %conn.session_id,
                    "Agent connection displaced"
                );
            }
        }

        tracing::info!(
            session_id = %conn.session_id,
            chat_id = %conn.chat_id(),
            "Agent connection registered"
        );

        displaced
    }

    /// Remove the agent connection if it is still `session_id`
    pub async fn clear_agent(&self, session_id: &Uuid) -> bool {
        let mut slots = self.slots.lock().await;
        let is_current = slots
            .agent
            .as_ref()
            .is_some_and(|current| current.session_id == *session_id);

        if is_current {
            slots.agent = None;
            tracing::info!(session_id = %session_id, "Agent connection removed");
        }
        is_current
    }

    pub async fn add_client(&self, conn: Arc<Connection>) {
        let mut slots = self.slots.lock().await;
        slots.clients.insert(conn.session_id, Arc::clone(&conn));

        tracing::info!(
            session_id = %conn.session_id,
            chat_id = %conn.chat_id(),
            total_clients = slots.clients.len(),
            "Client connection added"
        );
    }

    /// Remove a client connection. Removing twice is harmless.
    pub async fn remove_client(&self, session_id: &Uuid) -> bool {
        let mut slots = self.slots.lock().await;
        let removed = slots.clients.remove(session_id).is_some();
        if removed {
            tracing::info!(
                session_id = %session_id,
                remaining_clients = slots.clients.len(),
                "Client connection removed"
            );
        }
        removed
    }

    /// Send `text` to the agent connection.
    ///
    /// Returns whether an agent was connected and the write succeeded. A
    /// failed write drops the agent connection.
    pub async fn unicast_to_agent(&self, text: &str) -> bool {
        let mut slots = self.slots.lock().await;
        Self::send_to_agent(&mut slots, text)
    }

    /// Like [`unicast_to_agent`](Self::unicast_to_agent), but only when the
    /// agent is serving `chat_id`
    pub async fn unicast_to_agent_serving(&self, chat_id: ChatId, text: &str) -> bool {
        let mut slots = self.slots.lock().await;
        let serving = slots
            .agent
            .as_ref()
            .is_some_and(|agent| agent.chat_id() == chat_id);

        serving && Self::send_to_agent(&mut slots, text)
    }

    fn send_to_agent(slots: &mut Slots, text: &str) -> bool {
        let Some(agent) = &slots.agent else {
            return false;
        };

        match agent.send_text(text) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    session_id = %agent.session_id,
                    "Failed to write to agent connection, dropping it"
                );
                agent.close();
                slots.agent = None;
                false
            }
        }
    }

    /// Send `text` to every client connection
    pub async fn broadcast_to_clients(&self, text: &str) -> BroadcastReport {
        let mut slots = self.slots.lock().await;
        Self::fan_out(&mut slots, text, |_| true)
    }

    /// Send `text` to the client connections bound to `chat_id`
    pub async fn broadcast_to_chat(&self, chat_id: ChatId, text: &str) -> BroadcastReport {
        let mut slots = self.slots.lock().await;
        Self::fan_out(&mut slots, text, |conn| conn.chat_id() == chat_id)
    }

    /// Writes to each matching client; failed ones are closed and removed in
    /// the same pass, without retry.
    fn fan_out(slots: &mut Slots, text: &str, matches: impl Fn(&Connection) -> bool) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        slots.clients.retain(|session_id, conn| {
            if !matches(&**conn) {
                return true;
            }
            match conn.send_text(text) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(_) => {
                    report.dropped += 1;
                    tracing::warn!(
                        session_id = %session_id,
                        "Failed to write to client connection, dropping it"
                    );
                    conn.close();
                    false
                }
            }
        });

        tracing::debug!(
            recipients = report.delivered,
            failed = report.dropped,
            "Broadcast frame to clients"
        );

        report
    }

    /// Session ID of the current agent connection
    #[cfg(test)]
    pub async fn agent_session(&self) -> Option<Uuid> {
        let slots = self.slots.lock().await;
        slots.agent.as_ref().map(|a| a.session_id)
    }

    pub async fn stats(&self) -> RegistryStats {
        let slots = self.slots.lock().await;
        RegistryStats {
            agent_connected: slots.agent.is_some(),
            client_connections: slots.clients.len(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::websocket::frame::Outbound;
    use relaydesk_shared::{AgentId, ClientId};
    use tokio::sync::mpsc;

    fn agent(chat_id: ChatId) -> (Arc<Connection>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Connection::agent(AgentId::new("a1").unwrap(), chat_id, tx)),
            rx,
        )
    }

    fn client(id: &str, chat_id: ChatId) -> (Arc<Connection>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Connection::client(ClientId::new(id).unwrap(), chat_id, tx)),
            rx,
        )
    }

    #[tokio::test]
    async fn test_unicast_without_agent() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.unicast_to_agent("hello").await);
    }

    #[tokio::test]
    async fn test_set_agent_replaces_previous() {
        let registry = ConnectionRegistry::new();
        let (c1, mut rx1) = agent(ChatId::new());
        let (c2, mut rx2) = agent(ChatId::new());

        assert!(registry.set_agent(Arc::clone(&c1)).await.is_none());
        let displaced = registry.set_agent(Arc::clone(&c2)).await.unwrap();
        assert_eq!(displaced.session_id, c1.session_id);

        assert!(registry.unicast_to_agent("hello").await);
        assert_eq!(rx2.try_recv().unwrap(), Outbound::Text("hello".to_string()));

        // The displaced connection only got the close instruction
        assert!(c1.is_displaced());
        assert!(!c2.is_displaced());
        assert_eq!(rx1.try_recv().unwrap(), Outbound::Close);
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_clear_agent_only_clears_own_session() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx1) = agent(ChatId::new());
        let (c2, _rx2) = agent(ChatId::new());

        registry.set_agent(Arc::clone(&c1)).await;
        registry.set_agent(Arc::clone(&c2)).await;

        assert!(!registry.clear_agent(&c1.session_id).await);
        assert_eq!(registry.agent_session().await, Some(c2.session_id));

        assert!(registry.clear_agent(&c2.session_id).await);
        assert_eq!(registry.agent_session().await, None);
    }

    #[tokio::test]
    async fn test_failed_agent_write_drops_agent() {
        let registry = ConnectionRegistry::new();
        let (c1, rx1) = agent(ChatId::new());
        registry.set_agent(c1).await;
        drop(rx1);

        assert!(!registry.unicast_to_agent("hello").await);
        assert!(!registry.stats().await.agent_connected);
    }

    #[tokio::test]
    async fn test_unicast_to_agent_serving_checks_chat() {
        let registry = ConnectionRegistry::new();
        let chat_id = ChatId::new();
        let (c1, mut rx1) = agent(chat_id);
        registry.set_agent(c1).await;

        assert!(!registry.unicast_to_agent_serving(ChatId::new(), "other").await);
        assert!(registry.unicast_to_agent_serving(chat_id, "mine").await);
        assert_eq!(rx1.try_recv().unwrap(), Outbound::Text("mine".to_string()));
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_drops_failed_clients() {
        let registry = ConnectionRegistry::new();
        let (u1, mut rx1) = client("u1", ChatId::new());
        let (u2, rx2) = client("u2", ChatId::new());
        registry.add_client(u1).await;
        registry.add_client(u2).await;
        drop(rx2);

        let report = registry.broadcast_to_clients("hi").await;
        assert_eq!(report, BroadcastReport { delivered: 1, dropped: 1 });
        assert_eq!(rx1.try_recv().unwrap(), Outbound::Text("hi".to_string()));
        assert_eq!(registry.stats().await.client_connections, 1);
    }

    #[tokio::test]
    async fn test_broadcast_to_chat_is_scoped() {
        let registry = ConnectionRegistry::new();
        let chat_a = ChatId::new();
        let (u1, mut rx1) = client("u1", chat_a);
        let (u2, mut rx2) = client("u2", ChatId::new());
        registry.add_client(u1).await;
        registry.add_client(u2).await;

        let report = registry.broadcast_to_chat(chat_a, "hi").await;
        assert_eq!(report.delivered, 1);
        assert_eq!(rx1.try_recv().unwrap(), Outbound::Text("hi".to_string()));
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_client_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (u1, _rx1) = client("u1", ChatId::new());
        let session_id = u1.session_id;
        registry.add_client(u1).await;

        assert!(registry.remove_client(&session_id).await);
        assert!(!registry.remove_client(&session_id).await);
        assert_eq!(registry.stats().await.client_connections, 0);
    }
}
