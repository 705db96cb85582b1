//! Delivery of canonical messages into the store

use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::SharedStore;
use crate::types::{InboundMessage, IncomingMessage, NewMessage};

/// What happened to one delivered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Written against an active address
    Stored(InboundMessage),
    /// No active address for the recipient; nothing written
    Skipped,
}

impl IngestOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, IngestOutcome::Stored(_))
    }
}

/// Stores canonical messages against their active disposable address
#[derive(Clone)]
pub struct MessageGateway {
    store: SharedStore,
}

impl MessageGateway {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Deliver one message
    ///
    /// Unknown or inactive recipients are a successful no-op. Lookup and
    /// write failures are returned to the caller.
    pub async fn deliver(&self, message: IncomingMessage) -> Result<IngestOutcome, StoreError> {
        // Normalized payloads arrive lower-cased; hand-built messages may not
        let recipient = message.to.trim().to_lowercase();

        let Some(address) = self.store.find_active_address(&recipient).await? else {
            info!(to = %recipient, "No active address for recipient, dropping message");
            return Ok(IngestOutcome::Skipped);
        };

        debug!(to = %recipient, address_id = %address.id, "Storing inbound message");
        let stored = self
            .store
            .insert_message(NewMessage::from_incoming(address.id, message))
            .await?;

        info!(
            to = %recipient,
            message_id = %stored.id,
            from = %stored.from_email,
            "Stored inbound message"
        );
        Ok(IngestOutcome::Stored(stored))
    }
}
