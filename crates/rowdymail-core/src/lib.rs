//! RowdyMail core - disposable inbox plumbing
//!
//! This crate holds everything the HTTP surface delegates to:
//!
//! - **Ingestion**: reduce JSON and multipart webhook payloads to one
//!   canonical [`IncomingMessage`] ([`ingest`])
//! - **Delivery**: store a canonical message against its active disposable
//!   address, or skip it quietly ([`gateway`])
//! - **Storage**: the [`MessageStore`] trait with a local SQLite backend and
//!   a hosted PostgREST backend ([`store`])
//! - **Mailbox provider**: typed Mailsac REST client ([`mailsac`])
//! - **Retries**: exponential backoff with jitter for every outward HTTP call
//!   ([`retry`])
//! - **Client side**: the proxy API client and the periodic inbox refresher
//!   ([`proxy_client`], [`poller`])

pub mod address;
pub mod addresses;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod mailsac;
pub mod poller;
pub mod proxy_client;
pub mod retry;
pub mod store;
pub mod types;

pub use address::{is_valid_email, AddressGenerator};
pub use addresses::{AddressService, CreateAddress, CreateAddressError};
pub use error::{AddressError, FetchError, IngestError, StoreError};
pub use gateway::{IngestOutcome, MessageGateway};
pub use mailsac::{MailsacClient, MailsacConfig, MessageContent, MessageSummary};
pub use poller::InboxPoller;
pub use proxy_client::{Notifier, ProxyClient, ProxyRequest};
pub use retry::RetryPolicy;
pub use store::{MessageStore, SharedStore, SqliteStore, SupabaseConfig, SupabaseStore};
pub use types::{
    AddressStats, Attachment, DisposableAddress, InboundMessage, IncomingMessage, NewAddress,
    NewMessage, UserMessage,
};

/// Crate version, reported by the health endpoint
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
