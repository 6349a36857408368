use std::sync::Arc;

use {
    async_trait::async_trait,
    dashmap::DashMap,
    sqlx::{SqliteConnection, SqlitePool},
    tokio::sync::Mutex,
    tracing::debug,
};

use atendo_common::{new_id, now_ms};

use crate::{
    Error, Result,
    link::{IdentityLinker, NoLinker},
    model::{Chat, Direction, InboundDelta, InboundOutcome, Message, SenderType},
    store::ChatStore,
};

/// SQLite-backed [`ChatStore`].
///
/// Each mutation runs inside one transaction (message append and summary
/// update commit together or not at all) under a per-contact async mutex, so
/// there is exactly one logical writer per conversation while unrelated
/// chats stay concurrent.
pub struct SqliteChatStore {
    pool: SqlitePool,
    linker: Arc<dyn IdentityLinker>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SqliteChatStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_linker(pool, Arc::new(NoLinker))
    }

    pub fn with_linker(pool: SqlitePool, linker: Arc<dyn IdentityLinker>) -> Self {
        Self {
            pool,
            linker,
            locks: DashMap::new(),
        }
    }

    /// Initialize the chats/messages schema. Safe to call repeatedly; also
    /// used by tests against in-memory databases.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chats (
                id                  TEXT    PRIMARY KEY,
                external_contact_id TEXT    NOT NULL UNIQUE,
                linked_client_id    TEXT,
                status              TEXT    NOT NULL DEFAULT 'open',
                unread_count        INTEGER NOT NULL DEFAULT 0,
                last_message        TEXT,
                last_message_at     INTEGER NOT NULL DEFAULT 0,
                last_read_at        INTEGER NOT NULL DEFAULT 0,
                created_at          INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id           TEXT    PRIMARY KEY,
                chat_id      TEXT    NOT NULL REFERENCES chats(id),
                content      TEXT    NOT NULL,
                sender_type  TEXT    NOT NULL,
                message_type TEXT    NOT NULL DEFAULT 'text',
                created_at   INTEGER NOT NULL,
                external_id  TEXT
            )",
        )
        .execute(pool)
        .await?;

        // The inbound idempotency contract: one row per provider message id
        // per chat.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_chat_external
             ON messages (chat_id, external_id) WHERE external_id IS NOT NULL",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_chat_created
             ON messages (chat_id, created_at)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chats_last_message_at
             ON chats (last_message_at DESC)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────────

type ChatRow = (
    String,
    String,
    Option<String>,
    String,
    i64,
    Option<String>,
    i64,
    i64,
    i64,
);

type MessageRow = (String, String, String, String, String, i64, Option<String>);

fn chat_from_row(r: ChatRow) -> Chat {
    Chat {
        id: r.0,
        external_contact_id: r.1,
        linked_client_id: r.2,
        status: r.3,
        unread_count: r.4,
        last_message: r.5,
        last_message_at: r.6,
        last_read_at: r.7,
        created_at: r.8,
    }
}

fn message_from_row(r: MessageRow) -> Result<Message> {
    let sender_type = SenderType::parse(&r.3)
        .ok_or_else(|| Error::invalid_input(format!("unknown sender_type '{}'", r.3)))?;
    Ok(Message {
        id: r.0,
        chat_id: r.1,
        content: r.2,
        sender_type,
        message_type: r.4,
        created_at: r.5,
        external_id: r.6,
    })
}

const CHAT_COLUMNS: &str = "id, external_contact_id, linked_client_id, status, unread_count,
     last_message, last_message_at, last_read_at, created_at";

async fn chat_by_id(conn: &mut SqliteConnection, chat_id: &str) -> Result<Option<Chat>> {
    let row = sqlx::query_as::<_, ChatRow>(&format!(
        "SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?"
    ))
    .bind(chat_id)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(chat_from_row))
}

async fn chat_by_contact(conn: &mut SqliteConnection, contact: &str) -> Result<Option<Chat>> {
    let row = sqlx::query_as::<_, ChatRow>(&format!(
        "SELECT {CHAT_COLUMNS} FROM chats WHERE external_contact_id = ?"
    ))
    .bind(contact)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(chat_from_row))
}

async fn message_by_external_id(
    conn: &mut SqliteConnection,
    chat_id: &str,
    external_id: &str,
) -> Result<Option<Message>> {
    let row = sqlx::query_as::<_, MessageRow>(
        "SELECT id, chat_id, content, sender_type, message_type, created_at, external_id
         FROM messages WHERE chat_id = ? AND external_id = ?",
    )
    .bind(chat_id)
    .bind(external_id)
    .fetch_optional(conn)
    .await?;
    row.map(message_from_row).transpose()
}

/// Move the chat summary forward. Out-of-order arrivals insert their message
/// but leave the summary mirroring the newest message.
async fn advance_summary(
    conn: &mut SqliteConnection,
    chat_id: &str,
    content: &str,
    created_at: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE chats SET last_message = ?, last_message_at = ?
         WHERE id = ? AND last_message_at <= ?",
    )
    .bind(content)
    .bind(created_at)
    .bind(chat_id)
    .bind(created_at)
    .execute(conn)
    .await?;
    Ok(())
}

// ── Store implementation ─────────────────────────────────────────────────────

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn upsert_from_inbound(&self, delta: InboundDelta) -> Result<InboundOutcome> {
        if delta.external_id.is_empty() {
            return Err(Error::invalid_input("missing provider message id"));
        }
        if delta.external_contact_id.is_empty() {
            return Err(Error::invalid_input("missing contact identifier"));
        }

        let lock = self.lock_for(&delta.external_contact_id);
        let _guard = lock.lock().await;

        let existing = {
            let mut conn = self.pool.acquire().await?;
            chat_by_contact(&mut conn, &delta.external_contact_id).await?
        };

        // Identity linkage runs only when the chat is first created, and is
        // advisory: a None leaves the chat unlinked.
        let linked_client_id = match &existing {
            Some(_) => None,
            None => self.linker.link(&delta.external_contact_id).await,
        };

        let mut tx = self.pool.begin().await?;

        let chat_id = match existing {
            Some(chat) => chat.id,
            None => {
                let id = new_id();
                sqlx::query(
                    "INSERT INTO chats (id, external_contact_id, linked_client_id, status,
                                        unread_count, last_message_at, last_read_at, created_at)
                     VALUES (?, ?, ?, 'open', 0, 0, 0, ?)",
                )
                .bind(&id)
                .bind(&delta.external_contact_id)
                .bind(&linked_client_id)
                .bind(now_ms())
                .execute(&mut *tx)
                .await?;
                debug!(chat_id = %id, contact = %delta.external_contact_id, "created chat");
                id
            },
        };

        let sender_type = match delta.direction {
            Direction::FromContact => SenderType::Contact,
            Direction::FromMe => SenderType::Operator,
        };

        let message = Message {
            id: new_id(),
            chat_id: chat_id.clone(),
            content: delta.content.clone(),
            sender_type,
            message_type: "text".into(),
            created_at: delta.occurred_at,
            external_id: Some(delta.external_id.clone()),
        };

        // Replays of the same provider message id hit the unique index and
        // insert nothing.
        let inserted = sqlx::query(
            "INSERT INTO messages (id, chat_id, content, sender_type, message_type,
                                   created_at, external_id)
             VALUES (?, ?, ?, ?, 'text', ?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(&message.id)
        .bind(&message.chat_id)
        .bind(&message.content)
        .bind(message.sender_type.as_str())
        .bind(message.created_at)
        .bind(&message.external_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            debug!(chat_id = %chat_id, external_id = %delta.external_id, "duplicate inbound dropped");
            return Ok(InboundOutcome::Duplicate { chat_id });
        }

        advance_summary(&mut tx, &chat_id, &delta.content, delta.occurred_at).await?;

        if delta.direction == Direction::FromContact {
            // Count only messages newer than the read watermark, so a late
            // arrival older than the last mark-read does not inflate unread.
            sqlx::query(
                "UPDATE chats SET unread_count = unread_count + 1
                 WHERE id = ? AND last_read_at < ?",
            )
            .bind(&chat_id)
            .bind(delta.occurred_at)
            .execute(&mut *tx)
            .await?;
        }

        let chat = chat_by_id(&mut tx, &chat_id)
            .await?
            .ok_or_else(|| Error::unknown_chat(&chat_id))?;
        tx.commit().await?;

        Ok(InboundOutcome::Applied { chat, message })
    }

    async fn record_outbound(
        &self,
        chat_id: &str,
        content: &str,
        external_id: Option<&str>,
    ) -> Result<(Chat, Message)> {
        let chat = {
            let mut conn = self.pool.acquire().await?;
            chat_by_id(&mut conn, chat_id)
                .await?
                .ok_or_else(|| Error::unknown_chat(chat_id))?
        };

        let lock = self.lock_for(&chat.external_contact_id);
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await?;

        let message = Message {
            id: new_id(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            sender_type: SenderType::Operator,
            message_type: "text".into(),
            created_at: now_ms(),
            external_id: external_id.map(str::to_string),
        };

        let inserted = sqlx::query(
            "INSERT INTO messages (id, chat_id, content, sender_type, message_type,
                                   created_at, external_id)
             VALUES (?, ?, ?, 'operator', 'text', ?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(&message.id)
        .bind(&message.chat_id)
        .bind(&message.content)
        .bind(message.created_at)
        .bind(&message.external_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            // The provider's echo of this send beat us through the webhook;
            // the message is already stored under the same external id.
            if let Some(ext) = external_id
                && let Some(existing) = message_by_external_id(&mut tx, chat_id, ext).await?
            {
                let chat = chat_by_id(&mut tx, chat_id)
                    .await?
                    .ok_or_else(|| Error::unknown_chat(chat_id))?;
                tx.commit().await?;
                return Ok((chat, existing));
            }
            tx.rollback().await?;
            return Err(Error::invalid_input("outbound message insert conflicted"));
        }

        advance_summary(&mut tx, chat_id, content, message.created_at).await?;

        let chat = chat_by_id(&mut tx, chat_id)
            .await?
            .ok_or_else(|| Error::unknown_chat(chat_id))?;
        tx.commit().await?;

        Ok((chat, message))
    }

    async fn mark_read(&self, chat_id: &str) -> Result<Chat> {
        let chat = {
            let mut conn = self.pool.acquire().await?;
            chat_by_id(&mut conn, chat_id)
                .await?
                .ok_or_else(|| Error::unknown_chat(chat_id))?
        };

        let lock = self.lock_for(&chat.external_contact_id);
        let _guard = lock.lock().await;

        sqlx::query("UPDATE chats SET unread_count = 0, last_read_at = ? WHERE id = ?")
            .bind(now_ms())
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        let mut conn = self.pool.acquire().await?;
        chat_by_id(&mut conn, chat_id)
            .await?
            .ok_or_else(|| Error::unknown_chat(chat_id))
    }

    async fn list_chats(&self) -> Result<Vec<Chat>> {
        let rows = sqlx::query_as::<_, ChatRow>(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats ORDER BY last_message_at DESC, created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(chat_from_row).collect())
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, chat_id, content, sender_type, message_type, created_at, external_id
             FROM messages WHERE chat_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(message_from_row).collect()
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        let mut conn = self.pool.acquire().await?;
        chat_by_id(&mut conn, chat_id).await
    }

    async fn get_chat_by_contact(&self, external_contact_id: &str) -> Result<Option<Chat>> {
        let mut conn = self.pool.acquire().await?;
        chat_by_contact(&mut conn, external_contact_id).await
    }
}
