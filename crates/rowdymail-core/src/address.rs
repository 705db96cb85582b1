//! Disposable address generation and validation
//!
//! One generator serves both the provider proxy (`generateEmail`) and the
//! stored-address service, so every address the system hands out has the
//! same shape: a random or caller-chosen local part at the provider domain.

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;

use crate::error::AddressError;

/// Alphabet for random local parts
const LOCAL_PART_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of a random local part (36^12 possibilities)
pub const RANDOM_LOCAL_PART_LEN: usize = 12;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    static ref LOCAL_PART_RE: Regex = Regex::new(r"^[a-z0-9._-]{1,64}$").unwrap();
}

/// Loose syntactic check used by the proxy endpoint
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Split an address into `(login, domain)` at the last `@`
pub fn split_address(email: &str) -> Option<(&str, &str)> {
    let (login, domain) = email.rsplit_once('@')?;
    if login.is_empty() || domain.is_empty() {
        return None;
    }
    Some((login, domain))
}

/// Generates addresses at a fixed provider domain
#[derive(Debug, Clone)]
pub struct AddressGenerator {
    domain: String,
}

impl AddressGenerator {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into().trim().to_lowercase(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Random `[a-z0-9]` local part
    pub fn random_local_part(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..RANDOM_LOCAL_PART_LEN)
            .map(|_| LOCAL_PART_ALPHABET[rng.gen_range(0..LOCAL_PART_ALPHABET.len())] as char)
            .collect()
    }

    /// Build an address, using `custom` as the local part when given
    ///
    /// Custom local parts are trimmed and lower-cased, then must match
    /// `[a-z0-9._-]{1,64}`. No uniqueness check happens here.
    pub fn generate(&self, custom: Option<&str>) -> Result<String, AddressError> {
        let local = match custom {
            Some(raw) => {
                let local = raw.trim().to_lowercase();
                if !LOCAL_PART_RE.is_match(&local) {
                    return Err(AddressError::InvalidLocalPart(raw.to_string()));
                }
                local
            }
            None => self.random_local_part(),
        };

        Ok(format!("{}@{}", local, self.domain))
    }
}
