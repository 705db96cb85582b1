//! Persistence for disposable addresses and their messages
//!
//! Two tables, `temp_emails` and `messages`, related by
//! `messages.temp_email_id`. Addresses are unique on `email` and are only
//! ever soft-deleted (`is_active = false`).

mod sqlite;
mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::{
    AddressStats, DisposableAddress, InboundMessage, NewAddress, NewMessage, UserMessage,
};

pub use sqlite::SqliteStore;
pub use supabase::{SupabaseConfig, SupabaseStore};

/// Store handle shared across request handlers
pub type SharedStore = Arc<dyn MessageStore>;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a new, active address
    async fn create_address(&self, address: NewAddress) -> Result<DisposableAddress, StoreError>;

    /// Active address whose email equals `email` exactly
    ///
    /// Callers lower-case before asking.
    async fn find_active_address(
        &self,
        email: &str,
    ) -> Result<Option<DisposableAddress>, StoreError>;

    /// Active addresses of a user, newest first
    async fn list_addresses(&self, user_id: &str) -> Result<Vec<DisposableAddress>, StoreError>;

    /// Soft-delete an address owned by `user_id`
    async fn deactivate_address(&self, id: &str, user_id: &str) -> Result<(), StoreError>;

    /// Deactivate every active address that expired at or before `now`
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn address_stats(&self, user_id: &str) -> Result<AddressStats, StoreError>;

    async fn insert_message(&self, message: NewMessage) -> Result<InboundMessage, StoreError>;

    /// Messages of one address, newest first
    async fn list_messages(&self, temp_email_id: &str)
        -> Result<Vec<InboundMessage>, StoreError>;

    /// Messages across all of a user's addresses, newest first
    async fn list_messages_for_user(&self, user_id: &str)
        -> Result<Vec<UserMessage>, StoreError>;

    async fn mark_read(&self, id: &str) -> Result<(), StoreError>;

    async fn delete_message(&self, id: &str) -> Result<(), StoreError>;
}
