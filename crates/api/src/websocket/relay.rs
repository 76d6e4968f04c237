//! Agent and client relay loops
//!
//! Each live socket runs exactly one of these loops. A loop reads one frame
//! at a time, persists it, then forwards it through the
//! [`ConnectionRegistry`]. Persisting first means a frame that could not be
//! stored is never delivered.
//!
//! The loops only see a stream of text payloads, so the socket handling in
//! `handler.rs` stays thin and the loops can be driven from tests.

use futures::{pin_mut, Stream, StreamExt};
use relaydesk_shared::{AgentId, Chat, ChatId, ChatMessage, ChatStore, ClientId};
use std::fmt::Display;
use std::sync::Arc;

use crate::chat::session;
use crate::config::DeliveryScope;

use super::{
    connection::Connection,
    frame::{Frame, CONTROL_TOKEN},
    registry::{BroadcastReport, ConnectionRegistry},
};

/// Everything a relay loop needs besides its socket
#[derive(Clone)]
pub struct RelayContext {
    pub store: Arc<dyn ChatStore>,
    pub registry: ConnectionRegistry,
    pub delivery: DeliveryScope,
}

/// Why a relay loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The peer closed the socket
    PeerClosed,
    /// Reading from the socket failed
    TransportError,
    /// The control token was received
    ControlToken,
    /// A frame could not be persisted, or the chat could not be finished
    PersistenceFailed,
    /// A newer agent connection took over
    Displaced,
}

/// The agent side of an assigned chat
#[derive(Debug, Clone)]
pub struct AgentSession {
    pub agent_id: AgentId,
    pub chat_id: ChatId,
    /// Owner of the chat; agent messages are appended to this client's open chat
    pub client_id: ClientId,
}

impl AgentSession {
    pub fn new(agent_id: AgentId, chat: &Chat) -> Self {
        Self {
            agent_id,
            chat_id: chat.id,
            client_id: chat.owner(),
        }
    }
}

/// The client side of an open chat
#[derive(Debug, Clone)]
pub struct ClientSession {
    pub client_id: ClientId,
    pub chat_id: ChatId,
}

impl RelayContext {
    async fn deliver_to_clients(&self, chat_id: ChatId, text: &str) -> BroadcastReport {
        match self.delivery {
            DeliveryScope::AllClients => self.registry.broadcast_to_clients(text).await,
            DeliveryScope::OwningChat => self.registry.broadcast_to_chat(chat_id, text).await,
        }
    }

    async fn deliver_to_agent(&self, chat_id: ChatId, text: &str) -> bool {
        match self.delivery {
            DeliveryScope::AllClients => self.registry.unicast_to_agent(text).await,
            DeliveryScope::OwningChat => self.registry.unicast_to_agent_serving(chat_id, text).await,
        }
    }
}

/// Run the relay for an agent connection until it ends.
///
/// `conn` is installed as the agent connection for the duration of the loop.
/// If another agent connection replaces it, the loop stops with
/// [`RelayOutcome::Displaced`] without storing or relaying anything further.
pub async fn run_agent_relay<S, E>(
    ctx: &RelayContext,
    session: &AgentSession,
    conn: Arc<Connection>,
    inbound: S,
) -> RelayOutcome
where
    S: Stream<Item = Result<String, E>>,
    E: Display,
{
    pin_mut!(inbound);
    ctx.registry.set_agent(Arc::clone(&conn)).await;

    let outcome = loop {
        let next = tokio::select! {
            biased;
            _ = conn.displaced() => break RelayOutcome::Displaced,
            next = inbound.next() => next,
        };

        let raw = match next {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => {
                tracing::warn!(
                    error = %e,
                    session_id = %conn.session_id,
                    agent_id = %session.agent_id,
                    "Agent socket read failed"
                );
                break RelayOutcome::TransportError;
            }
            None => break RelayOutcome::PeerClosed,
        };

        // Nothing read by a replaced connection is stored or relayed
        if conn.is_displaced() {
            break RelayOutcome::Displaced;
        }

        match Frame::parse(&raw) {
            Frame::Control => {
                let report = ctx.deliver_to_clients(session.chat_id, CONTROL_TOKEN).await;
                tracing::info!(
                    chat_id = %session.chat_id,
                    agent_id = %session.agent_id,
                    notified_clients = report.delivered,
                    "Agent ended chat"
                );

                if let Err(e) = session::finish(ctx.store.as_ref(), session.chat_id).await {
                    tracing::error!(error = %e, chat_id = %session.chat_id, "Failed to finish chat");
                    break RelayOutcome::PersistenceFailed;
                }
                break RelayOutcome::ControlToken;
            }
            Frame::Content(text) => {
                let message = ChatMessage::from_agent(&session.agent_id, text);
                if let Err(e) = ctx.store.append_message(&session.client_id, message).await {
                    tracing::error!(
                        error = %e,
                        chat_id = %session.chat_id,
                        agent_id = %session.agent_id,
                        "Failed to persist agent message"
                    );
                    break RelayOutcome::PersistenceFailed;
                }

                if conn.is_displaced() {
                    break RelayOutcome::Displaced;
                }
                ctx.deliver_to_clients(session.chat_id, &raw).await;
            }
        }
    };

    ctx.registry.clear_agent(&conn.session_id).await;
    // Displacement already queued the close frame
    if outcome != RelayOutcome::Displaced {
        conn.close();
    }

    tracing::info!(
        session_id = %conn.session_id,
        agent_id = %session.agent_id,
        outcome = ?outcome,
        "Agent relay stopped"
    );

    outcome
}

/// Run the relay for a client connection until it ends.
///
/// Clients cannot finish a chat; their control token only disconnects them.
pub async fn run_client_relay<S, E>(
    ctx: &RelayContext,
    session: &ClientSession,
    conn: Arc<Connection>,
    inbound: S,
) -> RelayOutcome
where
    S: Stream<Item = Result<String, E>>,
    E: Display,
{
    pin_mut!(inbound);
    ctx.registry.add_client(Arc::clone(&conn)).await;

    let outcome = loop {
        let raw = match inbound.next().await {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => {
                tracing::warn!(
                    error = %e,
                    session_id = %conn.session_id,
                    client_id = %session.client_id,
                    "Client socket read failed"
                );
                break RelayOutcome::TransportError;
            }
            None => break RelayOutcome::PeerClosed,
        };

        match Frame::parse(&raw) {
            Frame::Control => break RelayOutcome::ControlToken,
            Frame::Content(text) => {
                let message = ChatMessage::from_client(&session.client_id, text);
                if let Err(e) = ctx.store.append_message(&session.client_id, message).await {
                    tracing::error!(
                        error = %e,
                        chat_id = %session.chat_id,
                        client_id = %session.client_id,
                        "Failed to persist client message"
                    );
                    break RelayOutcome::PersistenceFailed;
                }

                // Stored either way; the agent can catch up from history
                if !ctx.deliver_to_agent(session.chat_id, &raw).await {
                    tracing::debug!(
                        chat_id = %session.chat_id,
                        client_id = %session.client_id,
                        "No agent connection for client message"
                    );
                }
            }
        }
    };

    ctx.registry.remove_client(&conn.session_id).await;
    conn.close();

    tracing::info!(
        session_id = %conn.session_id,
        client_id = %session.client_id,
        outcome = ?outcome,
        "Client relay stopped"
    );

    outcome
}
