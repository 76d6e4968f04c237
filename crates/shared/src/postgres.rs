//! PostgreSQL implementation of [`ChatStore`]

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::store::ChatStore;
use crate::types::{AgentId, Chat, ChatId, ChatMessage, ChatSummary, ClientId, Role};

#[derive(FromRow)]
struct ChatRow {
    id: Uuid,
    client_id: String,
    agent_id: Option<String>,
    finished: bool,
}

#[derive(FromRow)]
struct MessageRow {
    sender: String,
    role: Role,
    text: String,
    created_at: OffsetDateTime,
}

#[derive(FromRow)]
struct SummaryRow {
    id: Uuid,
    client_id: String,
    agent_id: Option<String>,
    finished: bool,
    message_count: i64,
}

impl From<SummaryRow> for ChatSummary {
    fn from(row: SummaryRow) -> Self {
        ChatSummary::new(
            ChatId(row.id),
            row.client_id,
            row.agent_id,
            row.finished,
            usize::try_from(row.message_count).unwrap_or(0),
        )
    }
}

/// Chat store backed by the `chats` and `chat_messages` tables
#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, row: ChatRow) -> StoreResult<Chat> {
        let messages = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT sender, role, text, created_at
            FROM chat_messages
            WHERE chat_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Chat {
            id: ChatId(row.id),
            client_id: row.client_id,
            agent_id: row.agent_id,
            finished: row.finished,
            messages: messages
                .into_iter()
                .map(|m| ChatMessage {
                    sender: m.sender,
                    role: m.role,
                    text: m.text,
                    timestamp: m.created_at,
                })
                .collect(),
        })
    }

    async fn hydrate_optional(&self, row: Option<ChatRow>) -> StoreResult<Option<Chat>> {
        match row {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn create_chat(&self, client_id: &ClientId) -> StoreResult<Chat> {
        // A conflicting insert means another connection of the same client won
        // the race; the partial unique index keeps a single open chat.
        for _ in 0..2 {
            let chat = Chat::new(client_id);
            let inserted = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO chats (id, client_id)
                VALUES ($1, $2)
                ON CONFLICT (client_id) WHERE NOT finished DO NOTHING
                RETURNING id
                "#,
            )
            .bind(chat.id.0)
            .bind(client_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

            if inserted.is_some() {
                tracing::info!(chat_id = %chat.id, client_id = %client_id, "Chat created");
                return Ok(chat);
            }

            if let Some(existing) = self.find_open_by_client(client_id).await? {
                return Ok(existing);
            }
        }

        Err(StoreError::Database(format!(
            "could not create or find an open chat for client {client_id}"
        )))
    }

    async fn find_by_id(&self, chat_id: ChatId) -> StoreResult<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>(
            "SELECT id, client_id, agent_id, finished FROM chats WHERE id = $1",
        )
        .bind(chat_id.0)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_optional(row).await
    }

    async fn find_open_by_client(&self, client_id: &ClientId) -> StoreResult<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>(
            r#"
            SELECT id, client_id, agent_id, finished
            FROM chats
            WHERE client_id = $1 AND NOT finished
            "#,
        )
        .bind(client_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_optional(row).await
    }

    async fn find_open_by_agent(&self, agent_id: &AgentId) -> StoreResult<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>(
            r#"
            SELECT id, client_id, agent_id, finished
            FROM chats
            WHERE agent_id = $1 AND NOT finished
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(agent_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_optional(row).await
    }

    async fn assign_agent(&self, chat_id: ChatId, agent_id: &AgentId) -> StoreResult<Chat> {
        let updated = sqlx::query(
            r#"
            UPDATE chats
            SET agent_id = $2, updated_at = NOW()
            WHERE id = $1
              AND NOT finished
              AND (agent_id IS NULL OR agent_id = $2)
            "#,
        )
        .bind(chat_id.0)
        .bind(agent_id.as_str())
        .execute(&self.pool)
        .await?;

        let chat = self
            .find_by_id(chat_id)
            .await?
            .ok_or(StoreError::ChatNotFound(chat_id))?;

        if updated.rows_affected() == 0 {
            if chat.finished {
                return Err(StoreError::ChatFinished(chat_id));
            }
            return Err(StoreError::AlreadyAssigned {
                chat_id,
                agent_id: chat.agent_id.unwrap_or_default(),
            });
        }

        Ok(chat)
    }

    async fn append_message(&self, client_id: &ClientId, message: ChatMessage) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // Locking the chat row serializes appends, so the clamp below sees
        // every earlier message of the chat.
        let chat_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM chats WHERE client_id = $1 AND NOT finished FOR UPDATE",
        )
        .bind(client_id.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NoOpenChat(client_id.to_string()))?;

        // Timestamps never go backwards inside a chat even if the clock does.
        sqlx::query(
            r#"
            INSERT INTO chat_messages (chat_id, sender, role, text, created_at)
            SELECT $1, $2, $3, $4,
                   GREATEST($5, COALESCE(
                       (SELECT MAX(m.created_at) FROM chat_messages m WHERE m.chat_id = $1),
                       $5
                   ))
            "#,
        )
        .bind(chat_id)
        .bind(&message.sender)
        .bind(message.role)
        .bind(&message.text)
        .bind(message.timestamp)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn mark_finished(&self, chat_id: ChatId) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE chats
            SET finished = TRUE,
                finished_at = COALESCE(finished_at, NOW()),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(chat_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ChatNotFound(chat_id));
        }

        Ok(())
    }

    async fn list_unassigned_open(&self) -> StoreResult<Vec<ChatSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT c.id, c.client_id, c.agent_id, c.finished, COUNT(m.seq) AS message_count
            FROM chats c
            LEFT JOIN chat_messages m ON m.chat_id = c.id
            WHERE NOT c.finished AND c.agent_id IS NULL
            GROUP BY c.id
            ORDER BY c.created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ChatSummary::from).collect())
    }

    async fn list_open_for_agent(&self, agent_id: &AgentId) -> StoreResult<Vec<ChatSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT c.id, c.client_id, c.agent_id, c.finished, COUNT(m.seq) AS message_count
            FROM chats c
            LEFT JOIN chat_messages m ON m.chat_id = c.id
            WHERE NOT c.finished AND c.agent_id = $1
            GROUP BY c.id
            ORDER BY c.created_at ASC
            "#,
        )
        .bind(agent_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ChatSummary::from).collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
