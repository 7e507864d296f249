//! REGISTER (INS=0x01): mints a fresh credential keypair, wraps its private
//! key into an opaque key handle, and produces an attestation signature
//! over the whole response.

use crate::crypto;
use crate::engine::AuthenticatorState;
use crate::error::StatusWord;
use crate::keyhandle;
use log::{debug, error};

use super::constants::{
    APP_PARAM_LEN, CHALLENGE_PARAM_LEN, REGISTER_RESERVED_BYTE, REGISTER_SIGNED_PREFIX,
};

/// `data` is the APDU payload after the 7-byte header: `challenge_param:32
/// ‖ application_param:32`. Returns the response payload including the
/// trailing status word.
pub fn handle(state: &AuthenticatorState, data: &[u8]) -> Vec<u8> {
    if data.len() != CHALLENGE_PARAM_LEN + APP_PARAM_LEN {
        return StatusWord::WrongLength.to_be_bytes().to_vec();
    }
    let challenge_param = &data[..CHALLENGE_PARAM_LEN];
    let application_param = &data[CHALLENGE_PARAM_LEN..];
    let mut app_param_arr = [0u8; APP_PARAM_LEN];
    app_param_arr.copy_from_slice(application_param);

    let (credential_key, pkcs8) = match crypto::generate_p256_keypair() {
        Ok(pair) => pair,
        Err(e) => {
            error!("failed to generate credential key pair: {e}");
            return StatusWord::WrongData.to_be_bytes().to_vec();
        }
    };

    let key_handle = match keyhandle::wrap(&state.wrap_key, &pkcs8, &app_param_arr) {
        Ok(kh) => kh,
        Err(e) => {
            error!("failed to wrap key handle: {e}");
            return StatusWord::WrongData.to_be_bytes().to_vec();
        }
    };
    if key_handle.len() > u8::MAX as usize {
        error!("wrapped key handle exceeds the 1-byte length field ({} bytes)", key_handle.len());
        return StatusWord::WrongData.to_be_bytes().to_vec();
    }

    let public_key = crypto::public_key_uncompressed(&credential_key);

    let mut to_sign = Vec::with_capacity(1 + APP_PARAM_LEN + CHALLENGE_PARAM_LEN + key_handle.len() + public_key.len());
    to_sign.push(REGISTER_SIGNED_PREFIX);
    to_sign.extend_from_slice(application_param);
    to_sign.extend_from_slice(challenge_param);
    to_sign.extend_from_slice(&key_handle);
    to_sign.extend_from_slice(&public_key);

    let signature = match crypto::sign_der(&state.attestation_key, &to_sign) {
        Ok(sig) => sig,
        Err(e) => {
            error!("attestation signing failed: {e}");
            return StatusWord::WrongData.to_be_bytes().to_vec();
        }
    };

    debug!("REGISTER produced a {}-byte key handle", key_handle.len());

    let mut response = Vec::with_capacity(
        1 + public_key.len() + 1 + key_handle.len() + state.attestation_cert.len() + signature.len() + 2,
    );
    response.push(REGISTER_RESERVED_BYTE);
    response.extend_from_slice(&public_key);
    response.push(key_handle.len() as u8);
    response.extend_from_slice(&key_handle);
    response.extend_from_slice(&state.attestation_cert);
    response.extend_from_slice(&signature);
    response.extend_from_slice(&StatusWord::NoError.to_be_bytes());
    response
}
