//! User-facing address management

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::info;

use crate::address::AddressGenerator;
use crate::error::{AddressError, StoreError};
use crate::store::SharedStore;
use crate::types::{AddressStats, DisposableAddress, InboundMessage, NewAddress, UserMessage};

/// Request to create a disposable address
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAddress {
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    /// Lifetime from now; no expiry when absent
    pub expires_in_hours: Option<i64>,
    /// Custom local part
    pub prefix: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateAddressError {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("expiresInHours must be a positive number of hours in range")]
    InvalidExpiry,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// `now + hours`, or `None` when it leaves chrono's range
fn expiry_after(hours: i64) -> Option<DateTime<Utc>> {
    Utc::now().checked_add_signed(Duration::try_hours(hours)?)
}

#[derive(Clone)]
pub struct AddressService {
    store: SharedStore,
    generator: AddressGenerator,
}

impl AddressService {
    pub fn new(store: SharedStore, generator: AddressGenerator) -> Self {
        Self { store, generator }
    }

    pub fn generator(&self) -> &AddressGenerator {
        &self.generator
    }

    pub async fn create(
        &self,
        request: CreateAddress,
    ) -> Result<DisposableAddress, CreateAddressError> {
        let expires_at = match request.expires_in_hours {
            Some(hours) if hours <= 0 => return Err(CreateAddressError::InvalidExpiry),
            Some(hours) => Some(expiry_after(hours).ok_or(CreateAddressError::InvalidExpiry)?),
            None => None,
        };

        let prefix = request.prefix.as_deref().filter(|p| !p.trim().is_empty());
        let email = self.generator.generate(prefix)?;

        let address = self
            .store
            .create_address(NewAddress {
                email,
                user_id: request.user_id,
                team_id: request.team_id,
                expires_at,
            })
            .await?;

        info!(email = %address.email, id = %address.id, "Created disposable address");
        Ok(address)
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<DisposableAddress>, StoreError> {
        self.store.list_addresses(user_id).await
    }

    pub async fn deactivate(&self, id: &str, user_id: &str) -> Result<(), StoreError> {
        self.store.deactivate_address(id, user_id).await?;
        info!(id, user_id, "Deactivated address");
        Ok(())
    }

    pub async fn stats(&self, user_id: &str) -> Result<AddressStats, StoreError> {
        self.store.address_stats(user_id).await
    }

    pub async fn messages(&self, address_id: &str) -> Result<Vec<InboundMessage>, StoreError> {
        self.store.list_messages(address_id).await
    }

    pub async fn messages_for_user(&self, user_id: &str) -> Result<Vec<UserMessage>, StoreError> {
        self.store.list_messages_for_user(user_id).await
    }

    pub async fn mark_read(&self, message_id: &str) -> Result<(), StoreError> {
        self.store.mark_read(message_id).await
    }

    pub async fn delete_message(&self, message_id: &str) -> Result<(), StoreError> {
        self.store.delete_message(message_id).await
    }

    /// Deactivate everything past its expiry
    pub async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let count = self.store.cleanup_expired(Utc::now()).await?;
        if count > 0 {
            info!(count, "Deactivated expired addresses");
        }
        Ok(count)
    }
}
