//! Mailsac REST client
//!
//! Thin typed wrapper over the hosted mailbox API. Every method returns a
//! `Result`; callers that want a polling UI to stay quiet on failure
//! (empty list, missing body) downgrade the error themselves.

use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::address::AddressGenerator;
use crate::error::{AddressError, FetchError};
use crate::retry::RetryPolicy;

/// Production API host
pub const DEFAULT_BASE_URL: &str = "https://mailsac.com";

/// Domain of addresses handed out through the provider
pub const DEFAULT_DOMAIN: &str = "mailsac.com";

/// Default `wait_for_messages` budget
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default `wait_for_messages` poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

const API_KEY_HEADER: &str = "Mailsac-Key";

/// Client configuration
#[derive(Debug, Clone)]
pub struct MailsacConfig {
    /// `Mailsac-Key` header value; calls fail fast without one
    pub api_key: Option<String>,
    pub base_url: String,
    pub domain: String,
}

impl Default for MailsacConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
        }
    }
}

/// Sender or recipient entry of a listed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Message metadata as returned by the inbox listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub to: Vec<AddressEntry>,
    #[serde(default)]
    pub from: Vec<AddressEntry>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub inbox: Option<String>,
    #[serde(default)]
    pub received: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl MessageSummary {
    /// First sender address, if any
    pub fn sender(&self) -> Option<&str> {
        self.from.first().map(|entry| entry.address.as_str())
    }
}

/// Bodies of one message, each fetched independently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub id: String,
    pub text: Option<String>,
    pub html: Option<String>,
}

/// Mailsac API client
///
/// The `reqwest::Client` is passed in so one connection pool can be shared
/// with the rest of the process.
#[derive(Debug, Clone)]
pub struct MailsacClient {
    http: reqwest::Client,
    config: MailsacConfig,
    retry: RetryPolicy,
    generator: AddressGenerator,
}

impl MailsacClient {
    pub fn new(http: reqwest::Client, config: MailsacConfig) -> Self {
        let generator = AddressGenerator::new(config.domain.clone());
        Self {
            http,
            config,
            retry: RetryPolicy::default(),
            generator,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn generator(&self) -> &AddressGenerator {
        &self.generator
    }

    /// New address at the provider domain, random unless `custom` is given
    pub fn generate_address(&self, custom: Option<&str>) -> Result<String, AddressError> {
        self.generator.generate(custom)
    }

    /// List the inbox of `address`
    pub async fn list_messages(&self, address: &str) -> Result<Vec<MessageSummary>, FetchError> {
        let path = format!("/api/addresses/{}/messages", urlencoding::encode(address));
        let messages: Option<Vec<MessageSummary>> = self.get_json(&path).await?;
        Ok(messages.unwrap_or_default())
    }

    /// Plain-text body
    pub async fn get_message_text(&self, address: &str, id: &str) -> Result<String, FetchError> {
        self.get_text(&message_path("text", address, id)).await
    }

    /// HTML body
    pub async fn get_message_html(&self, address: &str, id: &str) -> Result<String, FetchError> {
        self.get_text(&message_path("body", address, id)).await
    }

    /// Full RFC 5322 source
    pub async fn get_message_raw(&self, address: &str, id: &str) -> Result<String, FetchError> {
        self.get_text(&message_path("raw", address, id)).await
    }

    /// Text and HTML bodies, fetched concurrently, each `None` on failure
    pub async fn get_message_content(&self, address: &str, id: &str) -> MessageContent {
        let (text, html) = tokio::join!(
            self.get_message_text(address, id),
            self.get_message_html(address, id)
        );

        MessageContent {
            id: id.to_string(),
            text: text
                .map_err(|e| warn!(address, id, error = %e, "Failed to get message text"))
                .ok(),
            html: html
                .map_err(|e| warn!(address, id, error = %e, "Failed to get message HTML"))
                .ok(),
        }
    }

    /// Poll the inbox every `interval` until it is non-empty or `timeout`
    /// elapses
    ///
    /// Returns the last listing observed, possibly empty. An in-flight poll
    /// is dropped at the deadline, so this never runs past `timeout`.
    pub async fn wait_for_messages(
        &self,
        address: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Vec<MessageSummary> {
        let deadline = Instant::now() + timeout;
        let mut last_seen = Vec::new();

        let poll = async {
            loop {
                match self.list_messages(address).await {
                    Ok(messages) if !messages.is_empty() => {
                        last_seen = messages;
                        return;
                    }
                    Ok(messages) => last_seen = messages,
                    Err(e) => warn!(address, error = %e, "Inbox poll failed"),
                }
                debug!(address, interval_ms = interval.as_millis() as u64, "Inbox empty, waiting");
                tokio::time::sleep(interval).await;
            }
        };

        if tokio::time::timeout_at(deadline, poll).await.is_err() {
            info!(address, timeout_ms = timeout.as_millis() as u64, "Gave up waiting for messages");
        }

        last_seen
    }

    fn api_key(&self) -> Result<&str, FetchError> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(FetchError::NotConfigured("Mailsac API key"))
    }

    async fn send(&self, path: &str) -> Result<reqwest::Response, FetchError> {
        let key = self.api_key()?;
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);

        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        self.retry
            .run(path, || async {
                let response = self.send(path).await?;
                response
                    .json::<T>()
                    .await
                    .map_err(|e| FetchError::Decode(e.to_string()))
            })
            .await
    }

    async fn get_text(&self, path: &str) -> Result<String, FetchError> {
        self.retry
            .run(path, || async {
                let response = self.send(path).await?;
                Ok(response.text().await?)
            })
            .await
    }
}

fn message_path(kind: &str, address: &str, id: &str) -> String {
    format!(
        "/api/{}/{}/{}",
        kind,
        urlencoding::encode(address),
        urlencoding::encode(id)
    )
}
