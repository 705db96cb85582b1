//! Hosted Supabase backend over PostgREST
//!
//! Same tables as the SQLite backend. The message counter is maintained by
//! the database side; `cleanup_expired` delegates to the
//! `cleanup_expired_emails` RPC.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use super::MessageStore;
use crate::address::split_address;
use crate::error::{FetchError, StoreError};
use crate::retry::RetryPolicy;
use crate::types::{
    AddressStats, Attachment, DisposableAddress, InboundMessage, NewAddress, NewMessage,
    UserMessage,
};

/// Project URL and service key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// e.g. `https://xyzcompany.supabase.co`
    pub url: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
struct AddressRow {
    id: String,
    email: String,
    #[serde(default)]
    login: Option<String>,
    #[serde(default)]
    domain: Option<String>,
    user_id: Option<String>,
    #[serde(default)]
    team_id: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    #[serde(default)]
    messages_count: i64,
}

impl From<AddressRow> for DisposableAddress {
    fn from(row: AddressRow) -> Self {
        let (login, domain) = match (row.login, row.domain) {
            (Some(login), Some(domain)) => (login, domain),
            _ => split_address(&row.email)
                .map(|(l, d)| (l.to_string(), d.to_string()))
                .unwrap_or_else(|| (row.email.clone(), String::new())),
        };

        Self {
            id: row.id,
            email: row.email,
            login,
            domain,
            user_id: row.user_id,
            team_id: row.team_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
            is_active: row.is_active,
            messages_count: row.messages_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageRow {
    id: String,
    temp_email_id: String,
    from_email: String,
    subject: String,
    body_text: String,
    body_html: Option<String>,
    attachments: Option<Vec<Attachment>>,
    received_at: DateTime<Utc>,
    is_read: bool,
}

impl From<MessageRow> for InboundMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            temp_email_id: row.temp_email_id,
            from_email: row.from_email,
            subject: row.subject,
            body_text: row.body_text,
            body_html: row.body_html,
            attachments: row.attachments,
            received_at: row.received_at,
            is_read: row.is_read,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JoinedEmail {
    email: String,
}

#[derive(Debug, Deserialize)]
struct UserMessageRow {
    #[serde(flatten)]
    message: MessageRow,
    temp_emails: JoinedEmail,
}

#[derive(Debug, Deserialize)]
struct StatsRow {
    is_active: bool,
    #[serde(default)]
    messages_count: i64,
}

#[derive(Debug, Serialize)]
struct InsertMessage<'a> {
    temp_email_id: &'a str,
    from_email: &'a str,
    subject: &'a str,
    body_text: &'a str,
    body_html: Option<&'a str>,
    attachments: Option<&'a [Attachment]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    received_at: Option<DateTime<Utc>>,
}

/// PostgREST-backed store
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    http: reqwest::Client,
    rest_url: String,
    key: String,
    retry: RetryPolicy,
}

impl SupabaseStore {
    pub fn new(http: reqwest::Client, config: SupabaseConfig) -> Self {
        Self {
            http,
            rest_url: format!("{}/rest/v1", config.url.trim_end_matches('/')),
            key: config.key,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// One PostgREST call, retried per policy, decoded as `T`
    ///
    /// Writes ask for `return=representation` so affected rows come back.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<T, FetchError> {
        let url = format!("{}/{}", self.rest_url, path);
        let label = format!("supabase {} {}", method, path);

        self.retry
            .run(&label, || async {
                let mut builder = self
                    .http
                    .request(method.clone(), &url)
                    .query(query)
                    .header("apikey", &self.key)
                    .bearer_auth(&self.key);

                if method != Method::GET {
                    builder = builder.header("Prefer", "return=representation");
                }
                if let Some(body) = body {
                    builder = builder.json(body);
                }

                let response = builder.send().await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(FetchError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }

                response
                    .json::<T>()
                    .await
                    .map_err(|e| FetchError::Decode(e.to_string()))
            })
            .await
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        Ok(self.request(Method::GET, table, query, None).await?)
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

#[async_trait]
impl MessageStore for SupabaseStore {
    async fn create_address(&self, address: NewAddress) -> Result<DisposableAddress, StoreError> {
        let email = address.email.trim().to_lowercase();
        let (login, domain) = split_address(&email)
            .ok_or_else(|| StoreError::Invalid(format!("not an email address: {}", email)))?;

        let body = json!({
            "email": email,
            "login": login,
            "domain": domain,
            "user_id": address.user_id,
            "team_id": address.team_id,
            "expires_at": address.expires_at,
        });

        let rows: Vec<AddressRow> = self
            .request(Method::POST, "temp_emails", &[], Some(&body))
            .await?;

        rows.into_iter()
            .next()
            .map(Into::into)
            .ok_or_else(|| StoreError::Invalid("insert returned no row".into()))
    }

    async fn find_active_address(
        &self,
        email: &str,
    ) -> Result<Option<DisposableAddress>, StoreError> {
        let rows: Vec<AddressRow> = self
            .select(
                "temp_emails",
                &[
                    ("select", "*".into()),
                    ("email", eq(email)),
                    ("is_active", eq("true")),
                    ("limit", "1".into()),
                ],
            )
            .await?;

        Ok(rows.into_iter().next().map(Into::into))
    }

    async fn list_addresses(&self, user_id: &str) -> Result<Vec<DisposableAddress>, StoreError> {
        let rows: Vec<AddressRow> = self
            .select(
                "temp_emails",
                &[
                    ("select", "*".into()),
                    ("user_id", eq(user_id)),
                    ("is_active", eq("true")),
                    ("order", "created_at.desc".into()),
                ],
            )
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn deactivate_address(&self, id: &str, user_id: &str) -> Result<(), StoreError> {
        let rows: Vec<Value> = self
            .request(
                Method::PATCH,
                "temp_emails",
                &[("id", eq(id)), ("user_id", eq(user_id))],
                Some(&json!({ "is_active": false })),
            )
            .await?;

        if rows.is_empty() {
            return Err(StoreError::NotFound(format!("address {}", id)));
        }
        Ok(())
    }

    async fn cleanup_expired(&self, _now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result: Value = self
            .request(
                Method::POST,
                "rpc/cleanup_expired_emails",
                &[],
                Some(&json!({})),
            )
            .await?;

        Ok(result.as_u64().unwrap_or(0))
    }

    async fn address_stats(&self, user_id: &str) -> Result<AddressStats, StoreError> {
        let rows: Vec<StatsRow> = self
            .select(
                "temp_emails",
                &[
                    ("select", "id,is_active,messages_count".into()),
                    ("user_id", eq(user_id)),
                ],
            )
            .await?;

        Ok(AddressStats {
            total_emails: rows.len() as u64,
            active_emails: rows.iter().filter(|r| r.is_active).count() as u64,
            total_messages: rows.iter().map(|r| r.messages_count.max(0) as u64).sum(),
        })
    }

    async fn insert_message(&self, message: NewMessage) -> Result<InboundMessage, StoreError> {
        let body = serde_json::to_value(InsertMessage {
            temp_email_id: &message.temp_email_id,
            from_email: &message.from_email,
            subject: &message.subject,
            body_text: &message.body_text,
            body_html: message.body_html.as_deref(),
            attachments: message.attachments.as_deref(),
            received_at: message.received_at,
        })?;

        let rows: Vec<MessageRow> = self
            .request(Method::POST, "messages", &[], Some(&body))
            .await?;

        rows.into_iter()
            .next()
            .map(Into::into)
            .ok_or_else(|| StoreError::Invalid("insert returned no row".into()))
    }

    async fn list_messages(
        &self,
        temp_email_id: &str,
    ) -> Result<Vec<InboundMessage>, StoreError> {
        let rows: Vec<MessageRow> = self
            .select(
                "messages",
                &[
                    ("select", "*".into()),
                    ("temp_email_id", eq(temp_email_id)),
                    ("order", "received_at.desc".into()),
                ],
            )
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_messages_for_user(&self, user_id: &str) -> Result<Vec<UserMessage>, StoreError> {
        let rows: Vec<UserMessageRow> = self
            .select(
                "messages",
                &[
                    ("select", "*,temp_emails!inner(email,user_id)".into()),
                    ("temp_emails.user_id", eq(user_id)),
                    ("order", "received_at.desc".into()),
                ],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| UserMessage {
                message: row.message.into(),
                temp_email: row.temp_emails.email,
            })
            .collect())
    }

    async fn mark_read(&self, id: &str) -> Result<(), StoreError> {
        let rows: Vec<Value> = self
            .request(
                Method::PATCH,
                "messages",
                &[("id", eq(id))],
                Some(&json!({ "is_read": true })),
            )
            .await?;

        if rows.is_empty() {
            return Err(StoreError::NotFound(format!("message {}", id)));
        }
        Ok(())
    }

    async fn delete_message(&self, id: &str) -> Result<(), StoreError> {
        let rows: Vec<Value> = self
            .request(Method::DELETE, "messages", &[("id", eq(id))], None)
            .await?;

        if rows.is_empty() {
            return Err(StoreError::NotFound(format!("message {}", id)));
        }
        Ok(())
    }
}
