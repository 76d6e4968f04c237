//! Relay connection handle
//!
//! Represents one live agent or client socket. Frames are queued on an
//! unbounded channel drained by the socket's writer task.

use relaydesk_shared::{AgentId, ChatId, ClientId};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

use super::frame::Outbound;

/// Who is on the other end of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    Agent { agent_id: AgentId, chat_id: ChatId },
    Client { client_id: ClientId, chat_id: ChatId },
}

/// Represents an active relay connection
#[derive(Debug)]
pub struct Connection {
    /// Unique session ID for this connection
    pub session_id: Uuid,

    pub peer: Peer,

    /// Channel to this connection's writer task
    sender: mpsc::UnboundedSender<Outbound>,

    /// Fired when a newer agent connection takes over
    displaced: CancellationToken,
}

impl Connection {
    pub fn agent(agent_id: AgentId, chat_id: ChatId, sender: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            peer: Peer::Agent { agent_id, chat_id },
            sender,
            displaced: CancellationToken::new(),
        }
    }

    pub fn client(client_id: ClientId, chat_id: ChatId, sender: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            peer: Peer::Client { client_id, chat_id },
            sender,
            displaced: CancellationToken::new(),
        }
    }

    /// Chat this connection was bound to when it was opened
    pub fn chat_id(&self) -> ChatId {
        match &self.peer {
            Peer::Agent { chat_id, .. } | Peer::Client { chat_id, .. } => *chat_id,
        }
    }

    /// Queue a text frame
    ///
    /// Returns Err if the writer task is gone, i.e. the socket write failed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed frame
    pub fn send_text(&self, text: &str) -> Result<(), mpsc::error::SendError<Outbound>> {
        self.sender.send(Outbound::Text(text.to_string()))
    }

    /// Ask the writer task to close the socket. Best effort.
    pub fn close(&self) {
        if self.sender.send(Outbound::Close).is_err() {
            tracing::debug!(session_id = %self.session_id, "Connection already closed");
        }
    }

    /// Stop this connection's relay loop and close its socket
    pub fn displace(&self) {
        self.displaced.cancel();
        self.close();
    }

    pub fn is_displaced(&self) -> bool {
        self.displaced.is_cancelled()
    }

    /// Resolves once [`displace`](Self::displace) has been called
    pub fn displaced(&self) -> WaitForCancellationFuture<'_> {
        self.displaced.cancelled()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client_conn() -> (Connection, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection::client(ClientId::new("u1").unwrap(), ChatId::new(), tx);
        (conn, rx)
    }

    #[tokio::test]
    async fn test_send_and_close() {
        let (conn, mut rx) = client_conn();

        conn.send_text("hello").unwrap();
        conn.close();

        assert_eq!(rx.recv().await, Some(Outbound::Text("hello".to_string())));
        assert_eq!(rx.recv().await, Some(Outbound::Close));
    }

    #[tokio::test]
    async fn test_send_fails_once_writer_is_gone() {
        let (conn, rx) = client_conn();
        drop(rx);

        assert!(conn.send_text("hello").is_err());
        conn.close();
    }

    #[tokio::test]
    async fn test_displace_wakes_waiters_and_closes() {
        let (conn, mut rx) = client_conn();
        assert!(!conn.is_displaced());

        conn.displace();

        assert!(conn.is_displaced());
        conn.displaced().await;
        assert_eq!(rx.recv().await, Some(Outbound::Close));
    }

    #[test]
    fn test_chat_id_for_both_peers() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let chat_id = ChatId::new();
        let agent = Connection::agent(AgentId::new("a1").unwrap(), chat_id, tx);
        assert_eq!(agent.chat_id(), chat_id);
        assert_ne!(agent.session_id, Uuid::nil());
    }
}
