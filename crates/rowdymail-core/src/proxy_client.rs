//! Client for the `/api/emails` proxy endpoint
//!
//! Every call goes through [`RetryPolicy::run`]. When a call finally fails
//! the optional [`Notifier`] is told once, with the user-facing message,
//! and the error is still returned.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::error;

use crate::error::FetchError;
use crate::mailsac::{MessageContent, MessageSummary};
use crate::retry::RetryPolicy;

/// Sink for user-visible failure notices
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

impl<F> Notifier for F
where
    F: Fn(&str) + Send + Sync,
{
    fn notify(&self, message: &str) {
        self(message)
    }
}

/// Body of `POST /api/emails`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ProxyRequest {
    GenerateEmail {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
    },
    GetMessages {
        email: String,
    },
    #[serde(rename_all = "camelCase")]
    GetMessage {
        email: String,
        message_id: String,
    },
}

/// `generateEmail` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedEmail {
    pub email: String,
}

#[derive(Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ProxyClient {
    /// `base_url` is the server root; the client talks to `{base_url}/api/emails`
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/api/emails", base_url.trim_end_matches('/')),
            retry: RetryPolicy::default(),
            notifier: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub async fn generate_email(&self, prefix: Option<&str>) -> Result<String, FetchError> {
        let generated: GeneratedEmail = self
            .call(&ProxyRequest::GenerateEmail {
                prefix: prefix.map(str::to_string),
            })
            .await?;
        Ok(generated.email)
    }

    pub async fn get_messages(&self, email: &str) -> Result<Vec<MessageSummary>, FetchError> {
        self.call(&ProxyRequest::GetMessages {
            email: email.to_string(),
        })
        .await
    }

    pub async fn get_message(
        &self,
        email: &str,
        message_id: &str,
    ) -> Result<MessageContent, FetchError> {
        self.call(&ProxyRequest::GetMessage {
            email: email.to_string(),
            message_id: message_id.to_string(),
        })
        .await
    }

    async fn call<T: DeserializeOwned>(&self, request: &ProxyRequest) -> Result<T, FetchError> {
        let result = self
            .retry
            .run(&self.endpoint, || async {
                let response = self.http.post(&self.endpoint).json(request).send().await?;

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
            .await;

        if let Err(err) = &result {
            error!(endpoint = %self.endpoint, error = %err, "Proxy call failed");
            if let Some(notifier) = &self.notifier {
                notifier.notify(&format!("API Error: {}", err.user_message()));
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        assert_eq!(
            serde_json::to_value(ProxyRequest::GenerateEmail { prefix: None }).unwrap(),
            json!({ "action": "generateEmail" })
        );
        assert_eq!(
            serde_json::to_value(ProxyRequest::GetMessage {
                email: "a@b.com".into(),
                message_id: "m1".into(),
            })
            .unwrap(),
            json!({ "action": "getMessage", "email": "a@b.com", "messageId": "m1" })
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        let parsed: Result<ProxyRequest, _> =
            serde_json::from_value(json!({ "action": "deleteEverything" }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_endpoint_joins_base() {
        let client = ProxyClient::new(reqwest::Client::new(), "http://localhost:3000/");
        assert_eq!(client.endpoint, "http://localhost:3000/api/emails");
    }
}
