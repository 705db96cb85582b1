//! Application state for the RowdyMail API

use std::sync::Arc;

use anyhow::Result;
use rowdymail_core::{
    AddressService, MailsacClient, MailsacConfig, MessageGateway, SharedStore, SqliteStore,
    SupabaseStore,
};
use tracing::info;

use crate::config::{Args, StoreBackend, DEFAULT_MAX_BODY_BYTES};

pub struct AppState {
    pub store: SharedStore,
    pub gateway: MessageGateway,
    pub addresses: AddressService,
    pub mailsac: MailsacClient,
    pub webhook_secret: Option<String>,
    /// Body limit on the webhook routes
    pub max_body_bytes: usize,
}

impl AppState {
    /// Build from configuration, connecting and migrating the store
    pub async fn new(args: &Args) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("rowdymail/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let store: SharedStore = match args.store_backend() {
            StoreBackend::Supabase(config) => {
                info!("Using hosted store at {}", config.url);
                Arc::new(SupabaseStore::new(http.clone(), config))
            }
            StoreBackend::Sqlite(url) => {
                info!("Connecting to database: {}", url);
                Arc::new(SqliteStore::connect(&url).await?)
            }
        };

        if args.mailsac_config().api_key.is_none() {
            tracing::warn!("MAILSAC_API_KEY not set, provider calls will fail");
        }

        Ok(Self::from_parts(
            store,
            MailsacClient::new(http, args.mailsac_config()),
            args.webhook_secret(),
        )
        .with_max_body_bytes(args.max_body_bytes))
    }

    pub fn from_parts(
        store: SharedStore,
        mailsac: MailsacClient,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            gateway: MessageGateway::new(store.clone()),
            addresses: AddressService::new(store.clone(), mailsac.generator().clone()),
            store,
            mailsac,
            webhook_secret,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// In-memory store and an unconfigured provider client
    pub async fn for_tests(mailsac: MailsacConfig) -> Result<Self> {
        let store: SharedStore = Arc::new(SqliteStore::in_memory().await?);
        Ok(Self::from_parts(
            store,
            MailsacClient::new(reqwest::Client::new(), mailsac),
            None,
        ))
    }
}
