//! Ambient configuration: the four environment variables the engine needs
//! plus the CLI overrides layered on top of them.

use crate::error::{AuthenticatorError, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub attestation_key_path: PathBuf,
    pub attestation_cert_path: PathBuf,
    pub wrap_key: [u8; 32],
    pub device_path: PathBuf,
}

impl Config {
    /// Reads the four ambient variables, applying `device_override` (from
    /// `--device`) in preference to `DEVICE_PATH` if present. Any missing or
    /// malformed value is a fatal configuration error.
    pub fn load(device_override: Option<PathBuf>) -> Result<Self> {
        let attestation_key_path = env_path("ATTESTATION_KEY_PATH")?;
        let attestation_cert_path = env_path("ATTESTATION_CERT_PATH")?;
        let wrap_key = env_wrap_key("WRAP_KEY")?;

        let device_path = match device_override {
            Some(p) => p,
            None => env_path("DEVICE_PATH")?,
        };

        Ok(Config {
            attestation_key_path,
            attestation_cert_path,
            wrap_key,
            device_path,
        })
    }
}

fn env_path(name: &str) -> Result<PathBuf> {
    std::env::var(name)
        .map(PathBuf::from)
        .map_err(|_| AuthenticatorError::Config(format!("{name} is not set")))
}

fn env_wrap_key(name: &str) -> Result<[u8; 32]> {
    let raw = std::env::var(name)
        .map_err(|_| AuthenticatorError::Config(format!("{name} is not set")))?;
    let bytes = hex::decode(raw.trim())
        .map_err(|e| AuthenticatorError::Config(format!("{name} is not valid hex: {e}")))?;
    let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        AuthenticatorError::Config(format!(
            "{name} must decode to exactly 32 bytes, got {}",
            bytes.len()
        ))
    })?;
    Ok(arr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_key_rejects_wrong_length() {
        std::env::set_var("TEST_WRAP_KEY_SHORT", "aabb");
        let err = env_wrap_key("TEST_WRAP_KEY_SHORT").unwrap_err();
        assert!(matches!(err, AuthenticatorError::Config(_)));
        std::env::remove_var("TEST_WRAP_KEY_SHORT");
    }

    #[test]
    fn wrap_key_accepts_32_bytes() {
        let hex32 = "00".repeat(32);
        std::env::set_var("TEST_WRAP_KEY_OK", &hex32);
        let key = env_wrap_key("TEST_WRAP_KEY_OK").unwrap();
        assert_eq!(key, [0u8; 32]);
        std::env::remove_var("TEST_WRAP_KEY_OK");
    }
}
