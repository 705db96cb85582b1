//! Domain types shared by the ingestion pipeline, the stores and the API
//!
//! Field names serialize in camelCase, which is what the web dashboard and
//! the webhook senders speak.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A disposable email address owned by a user (or nobody)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisposableAddress {
    pub id: String,
    /// Full address, always lower-case
    pub email: String,
    pub login: String,
    pub domain: String,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    /// Cached counter, approximate
    pub messages_count: i64,
}

impl DisposableAddress {
    /// True once the expiry timestamp has passed
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }
}

/// Attachment descriptor carried by a canonical message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    /// Inline payload, base64 (standard alphabet, padded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Canonical inbound message, independent of the webhook shape it came in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    /// Recipient, lower-cased
    pub to: String,
    pub from: String,
    pub subject: String,
    pub text_body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

/// A stored message row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub id: String,
    pub temp_email_id: String,
    pub from_email: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
    pub attachments: Option<Vec<Attachment>>,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
}

/// A stored message together with the address it was delivered to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessage {
    #[serde(flatten)]
    pub message: InboundMessage,
    pub temp_email: String,
}

/// Insert payload for a disposable address
#[derive(Debug, Clone, Default)]
pub struct NewAddress {
    pub email: String,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Insert payload for a message row
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub temp_email_id: String,
    pub from_email: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
    pub attachments: Option<Vec<Attachment>>,
    /// Defaults to the insertion time
    pub received_at: Option<DateTime<Utc>>,
}

impl NewMessage {
    /// Build the row for a canonical message delivered to `temp_email_id`
    pub fn from_incoming(temp_email_id: impl Into<String>, message: IncomingMessage) -> Self {
        Self {
            temp_email_id: temp_email_id.into(),
            from_email: message.from,
            subject: message.subject,
            body_text: message.text_body,
            body_html: message.html_body,
            attachments: message.attachments,
            received_at: None,
        }
    }
}

/// Per-user address counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressStats {
    pub total_emails: u64,
    pub active_emails: u64,
    pub total_messages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn address(expires_at: Option<DateTime<Utc>>) -> DisposableAddress {
        DisposableAddress {
            id: "a1".into(),
            email: "abc@mailsac.com".into(),
            login: "abc".into(),
            domain: "mailsac.com".into(),
            user_id: None,
            team_id: None,
            created_at: Utc::now(),
            expires_at,
            is_active: true,
            messages_count: 0,
        }
    }

    #[test]
    fn test_address_without_expiry_never_expires() {
        assert!(!address(None).is_expired_at(Utc::now() + Duration::days(3650)));
    }

    #[test]
    fn test_address_expiry_boundary() {
        let now = Utc::now();
        let addr = address(Some(now));
        assert!(addr.is_expired_at(now));
        assert!(!addr.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn test_incoming_message_omits_absent_optionals() {
        let msg = IncomingMessage {
            to: "a@b.com".into(),
            from: "x@y.com".into(),
            subject: "Hi".into(),
            text_body: "body".into(),
            html_body: None,
            attachments: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"textBody\":\"body\""));
        assert!(!json.contains("htmlBody"));
        assert!(!json.contains("attachments"));
    }

    #[test]
    fn test_user_message_flattens_row() {
        let msg = UserMessage {
            message: InboundMessage {
                id: "m1".into(),
                temp_email_id: "a1".into(),
                from_email: "x@y.com".into(),
                subject: "Hi".into(),
                body_text: "body".into(),
                body_html: None,
                attachments: None,
                received_at: Utc::now(),
                is_read: false,
            },
            temp_email: "abc@mailsac.com".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["id"], "m1");
        assert_eq!(value["tempEmail"], "abc@mailsac.com");
        assert_eq!(value["isRead"], false);
    }
}
