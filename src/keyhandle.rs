//! Key handle wrap/unwrap: binds a generated credential's private key to
//! the relying party's application parameter inside an opaque blob the
//! relying party stores and returns on authentication.

use crate::crypto;
use crate::error::{AuthenticatorError, Result};
use ring::signature::EcdsaKeyPair;

const APP_PARAM_LEN: usize = 32;

/// Private key material recovered from a key handle.
pub struct UnwrappedHandle {
    pub key_pair: EcdsaKeyPair,
    pub application_param: [u8; APP_PARAM_LEN],
}

/// Wraps `key_pair`'s PKCS#8 bytes together with `application_param` under
/// `wrap_key`, producing the opaque `key_handle` returned to the relying
/// party by REGISTER.
pub fn wrap(wrap_key: &[u8; 32], pkcs8: &[u8], application_param: &[u8; 32]) -> Result<Vec<u8>> {
    let mut plaintext = Vec::with_capacity(pkcs8.len() + APP_PARAM_LEN);
    plaintext.extend_from_slice(pkcs8);
    plaintext.extend_from_slice(application_param);
    crypto::seal(wrap_key, &plaintext)
}

/// Unwraps a key handle, recovering the signing key and the bound
/// application parameter. Does not itself check the parameter against the
/// request's — callers compare it per the REGISTER/AUTHENTICATE procedures.
pub fn unwrap(wrap_key: &[u8; 32], key_handle: &[u8]) -> Result<UnwrappedHandle> {
    let plaintext = crypto::unseal(wrap_key, key_handle)?;
    if plaintext.len() <= APP_PARAM_LEN {
        return Err(AuthenticatorError::Crypto(
            "unwrapped key handle too short to hold a private key".into(),
        ));
    }
    let split_at = plaintext.len() - APP_PARAM_LEN;
    let (pkcs8, app_param_bytes) = plaintext.split_at(split_at);

    let key_pair = crypto::key_pair_from_pkcs8(pkcs8)?;
    let mut application_param = [0u8; APP_PARAM_LEN];
    application_param.copy_from_slice(app_param_bytes);

    Ok(UnwrappedHandle {
        key_pair,
        application_param,
    })
}
