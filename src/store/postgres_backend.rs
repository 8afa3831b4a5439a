//! PostgreSQL-backed chat store.
//!
//! Works against an existing schema with `users`, `space_members` and
//! `messages` tables; timestamps are expected as `timestamptz`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::config::DatabaseConfig;

use super::backend::{ChatStore, StoreError, HISTORY_LIMIT};
use super::{MessageRecord, MessageTarget, NewMessage};

const MESSAGE_COLUMNS: &str = "m.id, m.content, m.sender_id, u.username, m.space_id, m.recipient_id, \
     m.is_direct_message, m.created_at, m.updated_at, m.is_edited";

pub struct PostgresChatStore {
    pool: PgPool,
}

impl PostgresChatStore {
    fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("database.url is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .connect(url)
            .await?;

        tracing::info!(pool_size = config.pool_size, "PostgreSQL connection pool created");

        Ok(Self::new(pool))
    }

    async fn username(&self, user_id: Uuid) -> Result<String, StoreError> {
        let row = sqlx::query("SELECT username FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get("username")?),
            None => Err(StoreError::NotFound("User".to_string())),
        }
    }
}

fn record_from_row(row: &PgRow) -> Result<MessageRecord, sqlx::Error> {
    Ok(MessageRecord {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        sender_id: row.try_get("sender_id")?,
        sender_username: row.try_get("username")?,
        space_id: row.try_get("space_id")?,
        recipient_id: row.try_get("recipient_id")?,
        is_direct_message: row.try_get("is_direct_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        is_edited: row.try_get("is_edited")?,
    })
}

#[async_trait]
impl ChatStore for PostgresChatStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn is_member(&self, user_id: Uuid, space_id: Uuid) -> Result<bool, StoreError> {
        let (is_member,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM space_members WHERE space_id = $1 AND user_id = $2)",
        )
        .bind(space_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(is_member)
    }

    async fn create_message(
        &self,
        sender_id: Uuid,
        message: NewMessage,
    ) -> Result<MessageRecord, StoreError> {
        let sender_username = self.username(sender_id).await?;

        let (space_id, recipient_id) = match message.target {
            MessageTarget::Space(space_id) => (Some(space_id), None),
            MessageTarget::Direct(recipient_id) => (None, Some(recipient_id)),
        };
        let now = Utc::now();

        let row = sqlx::query(
            r#"
            INSERT INTO messages (id, content, sender_id, space_id, recipient_id, is_direct_message, created_at, updated_at, is_edited)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, false)
            RETURNING id, content, sender_id, $9::text AS username, space_id, recipient_id, is_direct_message, created_at, updated_at, is_edited
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&message.content)
        .bind(sender_id)
        .bind(space_id)
        .bind(recipient_id)
        .bind(recipient_id.is_some())
        .bind(now)
        .bind(now)
        .bind(&sender_username)
        .fetch_one(&self.pool)
        .await?;

        Ok(record_from_row(&row)?)
    }

    async fn recent_messages(
        &self,
        user_id: Uuid,
        target: MessageTarget,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let rows = match target {
            MessageTarget::Space(space_id) => {
                let sql = format!(
                    r#"
                    SELECT {MESSAGE_COLUMNS}
                    FROM messages m
                    JOIN users u ON m.sender_id = u.id
                    WHERE m.space_id = $1
                    ORDER BY m.created_at DESC
                    LIMIT $2
                    "#
                );
                sqlx::query(&sql)
                    .bind(space_id)
                    .bind(HISTORY_LIMIT as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
            MessageTarget::Direct(peer) => {
                let sql = format!(
                    r#"
                    SELECT {MESSAGE_COLUMNS}
                    FROM messages m
                    JOIN users u ON m.sender_id = u.id
                    WHERE (m.sender_id = $1 AND m.recipient_id = $2)
                       OR (m.sender_id = $2 AND m.recipient_id = $1)
                    ORDER BY m.created_at DESC
                    LIMIT $3
                    "#
                );
                sqlx::query(&sql)
                    .bind(user_id)
                    .bind(peer)
                    .bind(HISTORY_LIMIT as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        // Newest first from the query; callers get oldest first
        let mut messages = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();

        Ok(messages)
    }
}
