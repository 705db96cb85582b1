//! Webhook payload normalization
//!
//! Two senders push inbound mail to us:
//!
//! - the generic forwarder posts JSON (`to`, `from`, `subject`, `text`,
//!   `html`, `attachments[]`)
//! - ImprovMX posts a multipart form with the same text fields plus indexed
//!   `attachment-N` / `attachment-N-name` pairs
//!
//! Both reduce to one [`IncomingMessage`]. Nothing here touches the network
//! or the database.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;

use crate::error::IngestError;
use crate::types::{Attachment, IncomingMessage};

/// Content type used when a multipart attachment part does not declare one
pub const DEFAULT_ATTACHMENT_TYPE: &str = "application/octet-stream";

/// JSON webhook body as sent by the forwarder
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonWebhookPayload {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
}

impl JsonWebhookPayload {
    /// Parse a raw request body
    pub fn from_slice(body: &[u8]) -> Result<Self, IngestError> {
        serde_json::from_slice(body).map_err(|e| IngestError::InvalidPayload(e.to_string()))
    }

    /// Validate and reduce to the canonical record
    pub fn normalize(self) -> Result<IncomingMessage, IngestError> {
        let required = RequiredFields::check(self.to, self.from, self.subject, self.text)?;
        Ok(required.into_message(self.html, self.attachments.unwrap_or_default()))
    }
}

/// One multipart form value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    File {
        content_type: Option<String>,
        data: Vec<u8>,
    },
}

impl FormValue {
    fn as_text(&self) -> Option<&str> {
        match self {
            FormValue::Text(text) => Some(text),
            FormValue::File { .. } => None,
        }
    }
}

/// Multipart form fields keyed by field name
///
/// When a name repeats, the first value wins.
#[derive(Debug, Clone, Default)]
pub struct FormFields {
    fields: HashMap<String, FormValue>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FormValue) {
        self.fields.entry(name.into()).or_insert(value);
    }

    pub fn insert_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.insert(name, FormValue::Text(value.into()));
    }

    pub fn insert_file(
        &mut self,
        name: impl Into<String>,
        content_type: Option<String>,
        data: Vec<u8>,
    ) {
        self.insert(name, FormValue::File { content_type, data });
    }

    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FormValue::as_text)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Decode `attachment-0`, `attachment-1`, ... until the first missing index
    ///
    /// An index whose `-name` field is missing or blank is skipped without
    /// ending the scan.
    pub fn attachments(&self) -> Vec<Attachment> {
        let mut attachments = Vec::new();

        for index in 0.. {
            let Some(value) = self.get(&format!("attachment-{}", index)) else {
                break;
            };

            let filename = match self.text(&format!("attachment-{}-name", index)) {
                Some(name) if !name.trim().is_empty() => name.to_string(),
                _ => {
                    tracing::debug!(index, "Skipping attachment without a name");
                    continue;
                }
            };

            let (content_type, data) = match value {
                FormValue::File { content_type, data } => (
                    content_type
                        .clone()
                        .unwrap_or_else(|| DEFAULT_ATTACHMENT_TYPE.to_string()),
                    data.as_slice(),
                ),
                FormValue::Text(text) => ("text/plain".to_string(), text.as_bytes()),
            };

            attachments.push(Attachment {
                filename,
                content_type,
                size: data.len() as u64,
                content: Some(BASE64.encode(data)),
            });
        }

        attachments
    }

    /// Validate and reduce to the canonical record
    pub fn normalize(&self) -> Result<IncomingMessage, IngestError> {
        let owned = |name: &str| self.text(name).map(str::to_string);
        let required =
            RequiredFields::check(owned("to"), owned("from"), owned("subject"), owned("text"))?;
        Ok(required.into_message(owned("html"), self.attachments()))
    }
}

/// The four fields every payload must carry
struct RequiredFields {
    to: String,
    from: String,
    subject: String,
    text: String,
}

impl RequiredFields {
    /// Blank strings count as missing
    fn check(
        to: Option<String>,
        from: Option<String>,
        subject: Option<String>,
        text: Option<String>,
    ) -> Result<Self, IngestError> {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        let (to, from, subject, text) =
            (present(to), present(from), present(subject), present(text));

        let missing: Vec<&'static str> = [
            ("to", to.is_none()),
            ("from", from.is_none()),
            ("subject", subject.is_none()),
            ("text", text.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        match (to, from, subject, text) {
            (Some(to), Some(from), Some(subject), Some(text)) => Ok(Self {
                to,
                from,
                subject,
                text,
            }),
            _ => Err(IngestError::MissingFields(missing)),
        }
    }

    fn into_message(self, html: Option<String>, attachments: Vec<Attachment>) -> IncomingMessage {
        IncomingMessage {
            to: self.to.trim().to_lowercase(),
            from: self.from,
            subject: self.subject,
            text_body: self.text,
            html_body: html.filter(|h| !h.is_empty()),
            attachments: if attachments.is_empty() {
                None
            } else {
                Some(attachments)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn json_payload(value: serde_json::Value) -> Result<IncomingMessage, IngestError> {
        JsonWebhookPayload::from_slice(value.to_string().as_bytes())?.normalize()
    }

    fn base_form() -> FormFields {
        let mut form = FormFields::new();
        form.insert_text("to", "ABC123@provider.tld");
        form.insert_text("from", "x@y.com");
        form.insert_text("subject", "Hi");
        form.insert_text("text", "body");
        form
    }

    #[test]
    fn test_json_minimal_payload() {
        let msg = json_payload(json!({
            "to": "ABC123@provider.tld",
            "from": "X@Y.com",
            "subject": "Hi",
            "text": "body"
        }))
        .unwrap();

        assert_eq!(
            msg,
            IncomingMessage {
                to: "abc123@provider.tld".into(),
                from: "X@Y.com".into(),
                subject: "Hi".into(),
                text_body: "body".into(),
                html_body: None,
                attachments: None,
            }
        );
    }

    #[test]
    fn test_json_with_html_and_attachments() {
        let msg = json_payload(json!({
            "to": "a@b.com",
            "from": "x@y.com",
            "subject": "Report",
            "text": "see attached",
            "html": "<p>see attached</p>",
            "attachments": [{
                "filename": "r.txt",
                "contentType": "text/plain",
                "size": 5,
                "content": "aGVsbG8="
            }]
        }))
        .unwrap();

        assert_eq!(msg.html_body.as_deref(), Some("<p>see attached</p>"));
        let attachments = msg.attachments.unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "r.txt");
        assert_eq!(attachments[0].content.as_deref(), Some("aGVsbG8="));
    }

    #[test]
    fn test_json_attachment_without_inline_content() {
        let msg = json_payload(json!({
            "to": "a@b.com",
            "from": "x@y.com",
            "subject": "Invoice",
            "text": "attached",
            "attachments": [{
                "filename": "a.pdf",
                "contentType": "application/pdf",
                "size": 10
            }]
        }))
        .unwrap();

        let attachments = msg.attachments.unwrap();
        assert_eq!(attachments[0].filename, "a.pdf");
        assert_eq!(attachments[0].size, 10);
        assert_eq!(attachments[0].content, None);
    }

    #[test]
    fn test_json_empty_optionals_become_absent() {
        let msg = json_payload(json!({
            "to": "a@b.com",
            "from": "x@y.com",
            "subject": "s",
            "text": "t",
            "html": "",
            "attachments": []
        }))
        .unwrap();

        assert!(msg.html_body.is_none());
        assert!(msg.attachments.is_none());
    }

    #[test]
    fn test_json_missing_fields_are_all_reported() {
        let err = json_payload(json!({ "from": "x@y.com", "subject": "  " })).unwrap_err();
        assert_eq!(err, IngestError::MissingFields(vec!["to", "subject", "text"]));
    }

    #[test]
    fn test_json_malformed_body() {
        let err = JsonWebhookPayload::from_slice(b"{not json").unwrap_err();
        assert!(matches!(err, IngestError::InvalidPayload(_)));
    }

    #[test]
    fn test_json_wrong_field_type() {
        let err = JsonWebhookPayload::from_slice(br#"{"to": 42}"#).unwrap_err();
        assert!(matches!(err, IngestError::InvalidPayload(_)));
    }

    #[test]
    fn test_form_single_attachment_then_gap() {
        let mut form = base_form();
        form.insert_file(
            "attachment-0",
            Some("application/pdf".into()),
            b"%PDF-1.7".to_vec(),
        );
        form.insert_text("attachment-0-name", "doc.pdf");
        // index 1 missing, index 2 must not be read
        form.insert_file("attachment-2", None, b"ignored".to_vec());
        form.insert_text("attachment-2-name", "ignored.bin");

        let msg = form.normalize().unwrap();
        let attachments = msg.attachments.unwrap();

        assert_eq!(attachments.len(), 1);
        assert_eq!(
            attachments[0],
            Attachment {
                filename: "doc.pdf".into(),
                content_type: "application/pdf".into(),
                size: 8,
                content: Some(BASE64.encode(b"%PDF-1.7")),
            }
        );
    }

    #[test]
    fn test_form_unnamed_attachment_is_skipped_but_scan_continues() {
        let mut form = base_form();
        form.insert_file("attachment-0", None, b"nameless".to_vec());
        form.insert_file("attachment-1", None, b"named".to_vec());
        form.insert_text("attachment-1-name", "named.bin");

        let attachments = form.normalize().unwrap().attachments.unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "named.bin");
        assert_eq!(attachments[0].content_type, DEFAULT_ATTACHMENT_TYPE);
    }

    #[test]
    fn test_form_text_attachment() {
        let mut form = base_form();
        form.insert_text("attachment-0", "plain words");
        form.insert_text("attachment-0-name", "notes.txt");

        let attachments = form.attachments();
        assert_eq!(attachments[0].content_type, "text/plain");
        assert_eq!(attachments[0].size, 11);
    }

    #[test]
    fn test_form_missing_text_is_rejected() {
        let mut form = FormFields::new();
        form.insert_text("to", "a@b.com");
        form.insert_text("from", "x@y.com");
        form.insert_text("subject", "s");

        assert_eq!(
            form.normalize().unwrap_err(),
            IngestError::MissingFields(vec!["text"])
        );
    }

    #[test]
    fn test_form_file_in_text_slot_counts_as_missing() {
        let mut form = FormFields::new();
        form.insert_file("to", None, b"a@b.com".to_vec());
        form.insert_text("from", "x@y.com");
        form.insert_text("subject", "s");
        form.insert_text("text", "t");

        assert_eq!(
            form.normalize().unwrap_err(),
            IngestError::MissingFields(vec!["to"])
        );
    }

    #[test]
    fn test_form_first_value_wins() {
        let mut form = base_form();
        form.insert_text("subject", "second");
        assert_eq!(form.normalize().unwrap().subject, "Hi");
    }
}
