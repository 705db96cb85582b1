//! Command-line and environment configuration

use std::path::PathBuf;

use clap::Parser;
use rowdymail_core::mailsac::{DEFAULT_BASE_URL, DEFAULT_DOMAIN};
use rowdymail_core::{MailsacConfig, SupabaseConfig};

/// Webhook body cap; attachments arrive inline
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Command-line arguments for the RowdyMail API server
///
/// Every option can also come from the environment (or a `.env` file).
#[derive(Parser, Debug, Clone)]
#[command(name = "rowdymail-api")]
#[command(about = "RowdyMail API server for disposable inboxes")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// SQLite URL for the local store (defaults to the platform data dir)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Supabase project URL; with a key, replaces the local store
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Supabase service key
    #[arg(long, env = "SUPABASE_KEY", hide_env_values = true)]
    pub supabase_key: Option<String>,

    /// Mailsac API key
    #[arg(long, env = "MAILSAC_API_KEY", hide_env_values = true)]
    pub mailsac_api_key: Option<String>,

    /// Mailsac API host
    #[arg(long, env = "MAILSAC_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub mailsac_base_url: String,

    /// Domain of generated addresses
    #[arg(long, env = "PROVIDER_DOMAIN", default_value = DEFAULT_DOMAIN)]
    pub provider_domain: String,

    /// Shared secret expected as `Authorization: Bearer <secret>` on the JSON webhook
    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,

    /// Seconds between expiry sweeps, 0 disables
    #[arg(long, env = "CLEANUP_INTERVAL_SECS", default_value = "3600")]
    pub cleanup_interval_secs: u64,

    /// Largest accepted webhook body in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Rate limit: requests per second per IP
    #[arg(long, env = "RATE_LIMIT", default_value = "20")]
    pub rate_limit: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Where rows are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite(String),
    Supabase(SupabaseConfig),
}

impl Args {
    pub fn store_backend(&self) -> StoreBackend {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());

        match (non_empty(&self.supabase_url), non_empty(&self.supabase_key)) {
            (Some(url), Some(key)) => StoreBackend::Supabase(SupabaseConfig { url, key }),
            _ => StoreBackend::Sqlite(
                non_empty(&self.database_url).unwrap_or_else(default_database_url),
            ),
        }
    }

    pub fn mailsac_config(&self) -> MailsacConfig {
        MailsacConfig {
            api_key: self.mailsac_api_key.clone().filter(|k| !k.is_empty()),
            base_url: self.mailsac_base_url.clone(),
            domain: self.provider_domain.clone(),
        }
    }

    /// Milliseconds between quota refills, so `rate_limit` requests fit in a second
    pub fn rate_limit_period_ms(&self) -> u64 {
        (1000 / u64::from(self.rate_limit.max(1))).max(1)
    }

    /// Requests an idle client may send at once
    pub fn rate_limit_burst(&self) -> u32 {
        self.rate_limit.max(1).saturating_mul(2)
    }

    pub fn webhook_secret(&self) -> Option<String> {
        self.webhook_secret.clone().filter(|s| !s.is_empty())
    }
}

/// `sqlite:` URL under the platform data dir
fn default_database_url() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rowdymail");
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::warn!(dir = %data_dir.display(), error = %e, "Could not create data dir");
    }
    format!("sqlite:{}/rowdymail.db", data_dir.display())
}

/// Get platform-specific data directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            None
        }
    }
}
