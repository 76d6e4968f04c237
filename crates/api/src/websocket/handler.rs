//! WebSocket handlers for Axum
//!
//! Everything that can be rejected with an HTTP status (bad identities,
//! unknown or unavailable chats) is resolved before the upgrade. Once the
//! socket is live the relay loops take over.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{future, stream::StreamExt, SinkExt};
use relaydesk_shared::{AgentId, ChatId, ClientId};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::{
    chat::session,
    error::{ApiError, ApiResult},
    extract::ApiQuery,
    state::AppState,
};

use super::{
    connection::Connection,
    frame::Outbound,
    relay::{run_agent_relay, run_client_relay, AgentSession, ClientSession},
};

/// How long the writer gets to flush a close frame after the relay stops
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
pub struct AgentWsQuery {
    pub id: String,
    #[serde(rename = "chatId", alias = "chat_id")]
    pub chat_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ClientWsQuery {
    pub id: String,
}

/// Validate an agent connection request and claim the chat for the agent
pub async fn prepare_agent_session(state: &AppState, params: AgentWsQuery) -> ApiResult<AgentSession> {
    let agent_id =
        AgentId::new(params.id).ok_or_else(|| ApiError::BadRequest("Agent id must not be empty".to_string()))?;
    let chat_id: ChatId = params
        .chat_id
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid chat id: {}", params.chat_id)))?;

    let chat = session::assign_agent(state.store.as_ref(), chat_id, &agent_id).await?;
    Ok(AgentSession::new(agent_id, &chat))
}

/// Validate a client connection request and find or open its chat
pub async fn prepare_client_session(state: &AppState, params: ClientWsQuery) -> ApiResult<ClientSession> {
    let client_id =
        ClientId::new(params.id).ok_or_else(|| ApiError::BadRequest("Client id must not be empty".to_string()))?;

    let chat = session::open_for_client(state.store.as_ref(), &client_id).await?;
    Ok(ClientSession {
        client_id,
        chat_id: chat.id,
    })
}

/// Agent WebSocket handler - claims the chat, then upgrades
pub async fn agent_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<AgentWsQuery>,
) -> ApiResult<Response> {
    let session = prepare_agent_session(&state, params).await?;

    tracing::info!(
        agent_id = %session.agent_id,
        chat_id = %session.chat_id,
        "Agent WebSocket upgrade requested"
    );

    let (agent_id, chat_id) = (session.agent_id.clone(), session.chat_id);
    Ok(ws
        .on_failed_upgrade(move |e| {
            tracing::warn!(error = %e, agent_id = %agent_id, chat_id = %chat_id, "Agent WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| handle_agent_socket(socket, session, state)))
}

/// Client WebSocket handler - opens or resumes the chat, then upgrades
pub async fn client_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ClientWsQuery>,
) -> ApiResult<Response> {
    let session = prepare_client_session(&state, params).await?;

    tracing::info!(
        client_id = %session.client_id,
        chat_id = %session.chat_id,
        "Client WebSocket upgrade requested"
    );

    let (client_id, chat_id) = (session.client_id.clone(), session.chat_id);
    Ok(ws
        .on_failed_upgrade(move |e| {
            tracing::warn!(error = %e, client_id = %client_id, chat_id = %chat_id, "Client WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| handle_client_socket(socket, session, state)))
}

async fn handle_agent_socket(socket: WebSocket, session: AgentSession, state: AppState) {
    let (tx, rx) = mpsc::unbounded_channel();
    let conn = Arc::new(Connection::agent(session.agent_id.clone(), session.chat_id, tx));
    let ctx = state.relay_context();

    let (sender, receiver) = socket.split();
    let send_task = tokio::spawn(write_frames(sender, rx));

    run_agent_relay(&ctx, &session, conn, text_frames(receiver)).await;
    drain_writer(send_task).await;
}

async fn handle_client_socket(socket: WebSocket, session: ClientSession, state: AppState) {
    let (tx, rx) = mpsc::unbounded_channel();
    let conn = Arc::new(Connection::client(session.client_id.clone(), session.chat_id, tx));
    let ctx = state.relay_context();

    let (sender, receiver) = socket.split();
    let send_task = tokio::spawn(write_frames(sender, rx));

    run_client_relay(&ctx, &session, conn, text_frames(receiver)).await;
    drain_writer(send_task).await;
}

/// Text payloads of a socket, ending at the peer's close frame.
///
/// Binary frames are ignored; ping and pong are answered by axum.
fn text_frames<S>(receiver: S) -> impl futures::Stream<Item = Result<String, axum::Error>>
where
    S: futures::Stream<Item = Result<Message, axum::Error>>,
{
    receiver
        .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        })
}

/// Forward outbound frames to the socket.
///
/// Returning drops `rx`, so later sends on the connection fail and the
/// registry treats the connection as gone.
async fn write_frames<S>(mut sender: S, mut rx: mpsc::UnboundedReceiver<Outbound>)
where
    S: futures::Sink<Message> + Unpin,
{
    while let Some(frame) = rx.recv().await {
        match frame {
            Outbound::Text(text) => {
                if sender.send(Message::Text(text)).await.is_err() {
                    break; // Connection closed
                }
            }
            Outbound::Close => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

async fn drain_writer(send_task: tokio::task::JoinHandle<()>) {
    let abort = send_task.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, send_task).await.is_err() {
        tracing::debug!("WebSocket writer did not finish in time");
        abort.abort();
    }
}
