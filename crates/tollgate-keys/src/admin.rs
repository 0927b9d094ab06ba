//! Key administration: create, list, show, enable, disable, revoke.
//!
//! These are blocking calls meant for the command line, not the request
//! path. Each one is a single locked read-modify-write of the key file.

use tollgate_core::{ApiKey, KeyRecord};
use tracing::info;

use crate::error::{KeyStoreError, KeyStoreResult};
use crate::store::FileKeyStore;

/// Longest accepted key name.
pub const MAX_NAME_LEN: usize = 64;

/// Check a key name: 1-64 characters of ASCII alphanumerics, `-` and `_`.
///
/// # Errors
///
/// Returns [`KeyStoreError::InvalidName`] describing the broken rule.
pub fn validate_name(name: &str) -> KeyStoreResult<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(KeyStoreError::InvalidName(format!(
            "name must be between 1 and {MAX_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(KeyStoreError::InvalidName(
            "name must contain only alphanumeric characters, hyphens, and underscores".into(),
        ));
    }
    Ok(())
}

/// Masked form of a key for display: prefix, stars, last four characters.
#[must_use]
pub fn masked(record: &KeyRecord) -> String {
    format!("{}****{}", tollgate_core::KEY_PREFIX, record.key_suffix)
}

impl FileKeyStore {
    /// Create a key named `name`. The returned key is the only copy; the
    /// file keeps its digest.
    ///
    /// # Errors
    ///
    /// Invalid or duplicate names, or key file failures.
    pub fn create(&self, name: &str) -> KeyStoreResult<(ApiKey, KeyRecord)> {
        validate_name(name)?;
        let created = self.mutate(|file| {
            if file.keys.values().any(|r| r.name == name) {
                return Err(KeyStoreError::DuplicateName(name.to_owned()));
            }
            let key = ApiKey::generate();
            let record = KeyRecord::new(name, &key);
            file.keys.insert(key.digest(), record.clone());
            Ok(((key, record), true))
        })?;
        info!(name, "created API key");
        Ok(created)
    }

    /// All keys, oldest first.
    ///
    /// # Errors
    ///
    /// Key file failures.
    pub fn list(&self) -> KeyStoreResult<Vec<KeyRecord>> {
        let mut records: Vec<_> = self.load()?.keys.into_values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(records)
    }

    /// The key named `name`, if any.
    ///
    /// # Errors
    ///
    /// Key file failures.
    pub fn show(&self, name: &str) -> KeyStoreResult<Option<KeyRecord>> {
        Ok(self.load()?.keys.into_values().find(|r| r.name == name))
    }

    /// Enable or disable the key named `name`. Returns `false` if there is
    /// no such key.
    ///
    /// # Errors
    ///
    /// Key file failures.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> KeyStoreResult<bool> {
        let found = self.mutate(|file| {
            let record = file.keys.values_mut().find(|r| r.name == name);
            Ok(match record {
                Some(r) => {
                    r.enabled = enabled;
                    (true, true)
                },
                None => (false, false),
            })
        })?;
        if found {
            info!(name, enabled, "updated API key");
        }
        Ok(found)
    }

    /// Permanently delete the key named `name`. Returns `false` if there is
    /// no such key.
    ///
    /// # Errors
    ///
    /// Key file failures.
    pub fn revoke(&self, name: &str) -> KeyStoreResult<bool> {
        let removed = self.mutate(|file| {
            let digest = file
                .keys
                .iter()
                .find(|(_, r)| r.name == name)
                .map(|(d, _)| d.clone());
            Ok(match digest {
                Some(d) => {
                    file.keys.remove(&d);
                    (true, true)
                },
                None => (false, false),
            })
        })?;
        if removed {
            info!(name, "revoked API key");
        }
        Ok(removed)
    }
}
