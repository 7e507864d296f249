//! AUTHENTICATE (INS=0x02): unwraps a previously issued key handle and
//! either reports whether it is still valid (check-only) or signs a fresh
//! assertion over it (enforce).

use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};

use crate::engine::AuthenticatorState;
use crate::error::StatusWord;
use crate::keyhandle;

use super::constants::{
    AuthenticateControl, APP_PARAM_LEN, CHALLENGE_PARAM_LEN, USER_PRESENCE_VERIFIED,
};

/// `data` is the APDU payload after the header: `challenge_param:32 ‖
/// application_param:32 ‖ key_handle_len:1 ‖ key_handle`.
pub fn handle(state: &mut AuthenticatorState, p1: u8, data: &[u8]) -> Vec<u8> {
    if data.len() < CHALLENGE_PARAM_LEN + APP_PARAM_LEN + 1 {
        return StatusWord::WrongLength.to_be_bytes().to_vec();
    }

    let challenge_param = &data[..CHALLENGE_PARAM_LEN];
    let application_param = &data[CHALLENGE_PARAM_LEN..CHALLENGE_PARAM_LEN + APP_PARAM_LEN];
    let kh_len = data[CHALLENGE_PARAM_LEN + APP_PARAM_LEN] as usize;
    let kh_start = CHALLENGE_PARAM_LEN + APP_PARAM_LEN + 1;

    if data.len() != kh_start + kh_len {
        return StatusWord::WrongLength.to_be_bytes().to_vec();
    }
    let key_handle = &data[kh_start..];

    let Some(control) = AuthenticateControl::from_byte(p1) else {
        warn!("AUTHENTICATE with unrecognized P1={p1:#x}");
        return StatusWord::WrongData.to_be_bytes().to_vec();
    };

    let unwrapped = match keyhandle::unwrap(&state.wrap_key, key_handle) {
        Ok(u) => u,
        Err(_) => return StatusWord::WrongData.to_be_bytes().to_vec(),
    };

    let app_param_matches = unwrapped.application_param == application_param;

    match control {
        AuthenticateControl::CheckOnly => {
            if app_param_matches {
                StatusWord::ConditionsNotSatisfied.to_be_bytes().to_vec()
            } else {
                StatusWord::WrongData.to_be_bytes().to_vec()
            }
        }
        // `DontEnforce` (P1=0x08) is treated identically to enforce in this
        // implementation — see the design notes' resolved open question.
        AuthenticateControl::EnforceUserPresence | AuthenticateControl::DontEnforce => {
            if !app_param_matches {
                return StatusWord::WrongData.to_be_bytes().to_vec();
            }
            sign_assertion(state, challenge_param, application_param, &unwrapped.key_pair)
        }
    }
}

fn sign_assertion(
    state: &mut AuthenticatorState,
    challenge_param: &[u8],
    application_param: &[u8],
    credential_key: &ring::signature::EcdsaKeyPair,
) -> Vec<u8> {
    state.counter = state.counter.wrapping_add(1);
    let counter = state.counter;

    let mut to_sign = Vec::with_capacity(APP_PARAM_LEN + 1 + 4 + CHALLENGE_PARAM_LEN);
    to_sign.extend_from_slice(application_param);
    to_sign.push(USER_PRESENCE_VERIFIED);
    let mut counter_be = [0u8; 4];
    BigEndian::write_u32(&mut counter_be, counter);
    to_sign.extend_from_slice(&counter_be);
    to_sign.extend_from_slice(challenge_param);

    let signature = match crate::crypto::sign_der(credential_key, &to_sign) {
        Ok(sig) => sig,
        Err(_) => return StatusWord::WrongData.to_be_bytes().to_vec(),
    };

    debug!("AUTHENTICATE enforce succeeded at counter {counter}");

    let mut response = Vec::with_capacity(1 + 4 + signature.len() + 2);
    response.push(USER_PRESENCE_VERIFIED);
    response.extend_from_slice(&counter_be);
    response.extend_from_slice(&signature);
    response.extend_from_slice(&StatusWord::NoError.to_be_bytes());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::u2f::constants::AuthenticateControl as Ctl;
    use ring::signature::{UnparsedPublicKey, ECDSA_P256_SHA256_ASN1};

    fn register_and_get_handle(state: &AuthenticatorState, app: &[u8; 32]) -> (Vec<u8>, Vec<u8>) {
        let challenge = [0xAAu8; 32];
        let mut data = Vec::new();
        data.extend_from_slice(&challenge);
        data.extend_from_slice(app);
        let response = crate::u2f::register::handle(state, &data);
        let public_key = response[1..66].to_vec();
        let kh_len = response[66] as usize;
        let key_handle = response[67..67 + kh_len].to_vec();
        (key_handle, public_key)
    }

    #[test]
    fn enforce_after_register_verifies_and_increments_counter() {
        let mut state = AuthenticatorState::for_tests();
        let app = [0xCCu8; 32];
        let (key_handle, public_key) = register_and_get_handle(&state, &app);

        let challenge = [0x11u8; 32];
        let mut data = Vec::new();
        data.extend_from_slice(&challenge);
        data.extend_from_slice(&app);
        data.push(key_handle.len() as u8);
        data.extend_from_slice(&key_handle);

        let counter_before = state.counter;
        let response = handle(&mut state, Ctl::EnforceUserPresence as u8, &data);
        assert_eq!(response[0], USER_PRESENCE_VERIFIED);
        let counter = BigEndian::read_u32(&response[1..5]);
        assert!(counter > counter_before);

        let sw = &response[response.len() - 2..];
        assert_eq!(sw, &StatusWord::NoError.to_be_bytes());

        let signature = &response[5..response.len() - 2];
        let mut to_verify = Vec::new();
        to_verify.extend_from_slice(&app);
        to_verify.push(USER_PRESENCE_VERIFIED);
        to_verify.extend_from_slice(&response[1..5]);
        to_verify.extend_from_slice(&challenge);

        let pub_key = UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, public_key);
        pub_key.verify(&to_verify, signature).unwrap();
    }

    #[test]
    fn enforce_with_mismatched_app_param_is_wrong_data() {
        let mut state = AuthenticatorState::for_tests();
        let app = [0xDDu8; 32];
        let (key_handle, _pub) = register_and_get_handle(&state, &app);

        let other_app = [0xEEu8; 32];
        let challenge = [0x22u8; 32];
        let mut data = Vec::new();
        data.extend_from_slice(&challenge);
        data.extend_from_slice(&other_app);
        data.push(key_handle.len() as u8);
        data.extend_from_slice(&key_handle);

        let response = handle(&mut state, Ctl::EnforceUserPresence as u8, &data);
        assert_eq!(response, StatusWord::WrongData.to_be_bytes());
    }

    #[test]
    fn check_only_reports_conditions_not_satisfied_for_valid_handle() {
        let mut state = AuthenticatorState::for_tests();
        let app = [0x33u8; 32];
        let (key_handle, _pub) = register_and_get_handle(&state, &app);

        let challenge = [0x44u8; 32];
        let mut data = Vec::new();
        data.extend_from_slice(&challenge);
        data.extend_from_slice(&app);
        data.push(key_handle.len() as u8);
        data.extend_from_slice(&key_handle);

        let response = handle(&mut state, Ctl::CheckOnly as u8, &data);
        assert_eq!(response, StatusWord::ConditionsNotSatisfied.to_be_bytes());
    }

    #[test]
    fn check_only_reports_wrong_data_for_mismatched_app_param() {
        let mut state = AuthenticatorState::for_tests();
        let app = [0x55u8; 32];
        let (key_handle, _pub) = register_and_get_handle(&state, &app);

        let other_app = [0x66u8; 32];
        let challenge = [0x77u8; 32];
        let mut data = Vec::new();
        data.extend_from_slice(&challenge);
        data.extend_from_slice(&other_app);
        data.push(key_handle.len() as u8);
        data.extend_from_slice(&key_handle);

        let response = handle(&mut state, Ctl::CheckOnly as u8, &data);
        assert_eq!(response, StatusWord::WrongData.to_be_bytes());
    }
}
