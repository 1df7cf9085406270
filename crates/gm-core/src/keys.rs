//! Loading the bot's signing key.

use nostr_sdk::nips::nip49::EncryptedSecretKey;
use nostr_sdk::prelude::*;

use crate::constants::{ENV_KEY_PASSWORD, ENV_PRIVATE_KEY};

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("key is encrypted (ncryptsec) but {0} is not set")]
    PasswordRequired(&'static str),

    #[error("invalid secret key: {0}")]
    Invalid(String),

    #[error("failed to decrypt key: {0}")]
    Decrypt(String),
}

/// Parse a secret key given as nsec, hex, or NIP-49 ncryptsec.
pub fn parse_secret(key: &str, password: Option<&str>) -> Result<Keys, KeyError> {
    let key = key.trim();

    let secret_key = if key.starts_with("ncryptsec") {
        let password = password.ok_or(KeyError::PasswordRequired(ENV_KEY_PASSWORD))?;
        let encrypted =
            EncryptedSecretKey::from_bech32(key).map_err(|e| KeyError::Invalid(e.to_string()))?;
        encrypted
            .decrypt(password)
            .map_err(|e| KeyError::Decrypt(e.to_string()))?
    } else {
        SecretKey::parse(key).map_err(|e| KeyError::Invalid(e.to_string()))?
    };

    Ok(Keys::new(secret_key))
}

/// Read the key (and optional password) from the process environment.
pub fn load_from_env() -> Result<Keys, KeyError> {
    let key = std::env::var(ENV_PRIVATE_KEY).map_err(|_| KeyError::Missing(ENV_PRIVATE_KEY))?;
    let password = std::env::var(ENV_KEY_PASSWORD).ok();
    parse_secret(&key, password.as_deref())
}
