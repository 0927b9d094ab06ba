//! Caller credentials and identities.
//!
//! API keys have the shape `tollgate_` followed by 32 lowercase ASCII
//! alphanumerics. Stores never hold the key itself: records are indexed by
//! the SHA-256 digest of the key and remember only its last four characters
//! for display.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::AuthError;

/// Prefix every API key starts with.
pub const KEY_PREFIX: &str = "tollgate_";

/// Number of random characters after the prefix.
pub const KEY_RANDOM_LEN: usize = 32;

const KEY_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Characters of a key shown in masked previews.
const PREVIEW_LEN: usize = 10;

/// Trailing characters of a key kept for identification.
const SUFFIX_LEN: usize = 4;

/// A syntactically valid API key.
///
/// `Debug` and `Display` only ever show a masked preview.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ApiKey(String);

impl ApiKey {
    /// Validate the shape of a presented key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedHeader`] when the key has the wrong
    /// prefix, length, or alphabet.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let random = raw
            .strip_prefix(KEY_PREFIX)
            .ok_or(AuthError::MalformedHeader)?;
        if random.len() != KEY_RANDOM_LEN
            || !random
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(AuthError::MalformedHeader);
        }
        Ok(Self(raw.to_owned()))
    }

    /// Extract and validate a key from an `Authorization` header value.
    ///
    /// The scheme must be `Bearer` (any case), separated from the key by a
    /// single space.
    ///
    /// # Errors
    ///
    /// [`AuthError::MissingHeader`] when no header was sent,
    /// [`AuthError::MalformedHeader`] when the scheme or key shape is wrong.
    pub fn from_authorization(header: Option<&str>) -> Result<Self, AuthError> {
        let header = header.ok_or(AuthError::MissingHeader)?;
        let (scheme, token) = header
            .split_once(' ')
            .ok_or(AuthError::MalformedHeader)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(AuthError::MalformedHeader);
        }
        Self::parse(token.trim())
    }

    /// Generate a fresh key from the operating system RNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = OsRng;
        let mut key = String::with_capacity(KEY_PREFIX.len().saturating_add(KEY_RANDOM_LEN));
        key.push_str(KEY_PREFIX);
        for _ in 0..KEY_RANDOM_LEN {
            let idx = rng.gen_range(0..KEY_CHARSET.len());
            key.push(char::from(KEY_CHARSET.get(idx).copied().unwrap_or(b'0')));
        }
        Self(key)
    }

    /// The full key. Only for handing to the operator once at creation.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Hex SHA-256 digest used as the store index.
    #[must_use]
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }

    /// Masked preview safe for logs: first ten characters then `...`.
    #[must_use]
    pub fn preview(&self) -> String {
        let head: String = self.0.chars().take(PREVIEW_LEN).collect();
        format!("{head}...")
    }

    /// Last four characters, used to tell keys apart in listings.
    #[must_use]
    pub fn suffix(&self) -> String {
        let skip = self.0.len().saturating_sub(SUFFIX_LEN);
        self.0.chars().skip(skip).collect()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiKey").field(&self.preview()).finish()
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.preview())
    }
}

/// Stored metadata for one API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Unique human-readable name.
    pub name: String,
    /// When the key was created.
    pub created_at: DateTime<Utc>,
    /// When the key last authenticated a request.
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Disabled keys are refused with 403.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Last four characters of the key.
    pub key_suffix: String,
}

fn default_enabled() -> bool {
    true
}

impl KeyRecord {
    /// Create an enabled, never-used record for `key`.
    #[must_use]
    pub fn new(name: impl Into<String>, key: &ApiKey) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            last_used_at: None,
            enabled: true,
            key_suffix: key.suffix(),
        }
    }

    /// The caller identity this record resolves to.
    #[must_use]
    pub fn identity(&self) -> CallerIdentity {
        CallerIdentity {
            name: self.name.clone(),
            enabled: self.enabled,
            last_used_at: self.last_used_at,
        }
    }
}

/// The caller a presented key resolved to. Re-resolved on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Key name.
    pub name: String,
    /// Whether the key may be used.
    pub enabled: bool,
    /// Previous use, before the current request.
    pub last_used_at: Option<DateTime<Utc>>,
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
