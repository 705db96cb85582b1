//! Local SQLite backend

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use super::MessageStore;
use crate::address::split_address;
use crate::error::StoreError;
use crate::types::{
    AddressStats, Attachment, DisposableAddress, InboundMessage, NewAddress, NewMessage,
    UserMessage,
};

/// Fixed-width UTC timestamps so TEXT columns sort chronologically
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, FromRow)]
struct DbAddress {
    id: String,
    email: String,
    login: String,
    domain: String,
    user_id: Option<String>,
    team_id: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    messages_count: i64,
}

impl From<DbAddress> for DisposableAddress {
    fn from(row: DbAddress) -> Self {
        Self {
            id: row.id,
            email: row.email,
            login: row.login,
            domain: row.domain,
            user_id: row.user_id,
            team_id: row.team_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
            is_active: row.is_active,
            messages_count: row.messages_count,
        }
    }
}

#[derive(Debug, FromRow)]
struct DbMessage {
    id: String,
    temp_email_id: String,
    from_email: String,
    subject: String,
    body_text: String,
    body_html: Option<String>,
    attachments_json: Option<String>,
    received_at: DateTime<Utc>,
    is_read: bool,
}

impl TryFrom<DbMessage> for InboundMessage {
    type Error = StoreError;

    fn try_from(row: DbMessage) -> Result<Self, Self::Error> {
        let attachments: Option<Vec<Attachment>> = row
            .attachments_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Self {
            id: row.id,
            temp_email_id: row.temp_email_id,
            from_email: row.from_email,
            subject: row.subject,
            body_text: row.body_text,
            body_html: row.body_html,
            attachments,
            received_at: row.received_at,
            is_read: row.is_read,
        })
    }
}

#[derive(Debug, FromRow)]
struct DbUserMessage {
    #[sqlx(flatten)]
    message: DbMessage,
    temp_email: String,
}

const ADDRESS_COLUMNS: &str = "id, email, login, domain, user_id, team_id, created_at, \
                               expires_at, is_active, messages_count";

const MESSAGE_COLUMNS: &str = "m.id AS id, m.temp_email_id AS temp_email_id, \
                               m.from_email AS from_email, m.subject AS subject, \
                               m.body_text AS body_text, m.body_html AS body_html, \
                               m.attachments_json AS attachments_json, \
                               m.received_at AS received_at, m.is_read AS is_read";

/// SQLite-backed store
///
/// Construct with [`SqliteStore::connect`] (runs migrations) and release
/// with [`SqliteStore::close`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and migrate it
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database, one connection kept alive for its lifetime
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        tracing::info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS temp_emails (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                login TEXT NOT NULL,
                domain TEXT NOT NULL,
                user_id TEXT,
                team_id TEXT,
                created_at TEXT NOT NULL,
                expires_at TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                messages_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                temp_email_id TEXT NOT NULL REFERENCES temp_emails(id),
                from_email TEXT NOT NULL,
                subject TEXT NOT NULL,
                body_text TEXT NOT NULL,
                body_html TEXT,
                attachments_json TEXT,
                received_at TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_temp_emails_user ON temp_emails(user_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_temp_email \
             ON messages(temp_email_id, received_at)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Migrations complete");
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create_address(&self, address: NewAddress) -> Result<DisposableAddress, StoreError> {
        let email = address.email.trim().to_lowercase();
        let (login, domain) = split_address(&email)
            .map(|(l, d)| (l.to_string(), d.to_string()))
            .ok_or_else(|| StoreError::Invalid(format!("not an email address: {}", email)))?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO temp_emails (id, email, login, domain, user_id, team_id, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&email)
        .bind(&login)
        .bind(&domain)
        .bind(&address.user_id)
        .bind(&address.team_id)
        .bind(timestamp(now))
        .bind(address.expires_at.map(timestamp))
        .execute(&self.pool)
        .await?;

        tracing::info!(id = %id, email = %email, "Created disposable address");

        Ok(DisposableAddress {
            id,
            email,
            login,
            domain,
            user_id: address.user_id,
            team_id: address.team_id,
            created_at: now,
            expires_at: address.expires_at,
            is_active: true,
            messages_count: 0,
        })
    }

    async fn find_active_address(
        &self,
        email: &str,
    ) -> Result<Option<DisposableAddress>, StoreError> {
        let row: Option<DbAddress> = sqlx::query_as(&format!(
            "SELECT {} FROM temp_emails WHERE email = ? AND is_active = 1",
            ADDRESS_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_addresses(&self, user_id: &str) -> Result<Vec<DisposableAddress>, StoreError> {
        let rows: Vec<DbAddress> = sqlx::query_as(&format!(
            "SELECT {} FROM temp_emails WHERE user_id = ? AND is_active = 1 \
             ORDER BY created_at DESC",
            ADDRESS_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn deactivate_address(&self, id: &str, user_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE temp_emails SET is_active = 0 WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("address {}", id)));
        }
        Ok(())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE temp_emails SET is_active = 0 \
             WHERE is_active = 1 AND expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(timestamp(now))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn address_stats(&self, user_id: &str) -> Result<AddressStats, StoreError> {
        let (total, active, messages): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(is_active), 0), COALESCE(SUM(messages_count), 0)
            FROM temp_emails
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(AddressStats {
            total_emails: total.max(0) as u64,
            active_emails: active.max(0) as u64,
            total_messages: messages.max(0) as u64,
        })
    }

    async fn insert_message(&self, message: NewMessage) -> Result<InboundMessage, StoreError> {
        let id = Uuid::new_v4().to_string();
        let received_at = message.received_at.unwrap_or_else(Utc::now);
        let attachments_json = message
            .attachments
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, temp_email_id, from_email, subject, body_text, body_html, attachments_json, received_at, is_read)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&id)
        .bind(&message.temp_email_id)
        .bind(&message.from_email)
        .bind(&message.subject)
        .bind(&message.body_text)
        .bind(&message.body_html)
        .bind(&attachments_json)
        .bind(timestamp(received_at))
        .execute(&self.pool)
        .await?;

        // cached counter, approximate by contract
        if let Err(e) =
            sqlx::query("UPDATE temp_emails SET messages_count = messages_count + 1 WHERE id = ?")
                .bind(&message.temp_email_id)
                .execute(&self.pool)
                .await
        {
            tracing::warn!(temp_email_id = %message.temp_email_id, error = %e, "Failed to bump message count");
        }

        Ok(InboundMessage {
            id,
            temp_email_id: message.temp_email_id,
            from_email: message.from_email,
            subject: message.subject,
            body_text: message.body_text,
            body_html: message.body_html,
            attachments: message.attachments,
            received_at,
            is_read: false,
        })
    }

    async fn list_messages(
        &self,
        temp_email_id: &str,
    ) -> Result<Vec<InboundMessage>, StoreError> {
        let rows: Vec<DbMessage> = sqlx::query_as(&format!(
            "SELECT {} FROM messages m WHERE m.temp_email_id = ? ORDER BY m.received_at DESC",
            MESSAGE_COLUMNS
        ))
        .bind(temp_email_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_messages_for_user(&self, user_id: &str) -> Result<Vec<UserMessage>, StoreError> {
        let rows: Vec<DbUserMessage> = sqlx::query_as(&format!(
            "SELECT {}, e.email AS temp_email \
             FROM messages m JOIN temp_emails e ON e.id = m.temp_email_id \
             WHERE e.user_id = ? ORDER BY m.received_at DESC",
            MESSAGE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(UserMessage {
                    message: row.message.try_into()?,
                    temp_email: row.temp_email,
                })
            })
            .collect()
    }

    async fn mark_read(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE messages SET is_read = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("message {}", id)));
        }
        Ok(())
    }

    async fn delete_message(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("message {}", id)));
        }
        Ok(())
    }
}
