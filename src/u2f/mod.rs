//! U2F APDU handler: parses the ISO 7816-style header tunneled inside a
//! HID `MSG` command and dispatches `REGISTER`/`AUTHENTICATE`/`VERSION`.

pub mod authenticate;
pub mod constants;
pub mod register;

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use crate::engine::AuthenticatorState;
use crate::error::StatusWord;

use constants::{CLA_SUPPORTED, U2F_VERSION_STRING, U2fCommand, APDU_HEADER_LEN};

/// Parses and dispatches one APDU, returning the response payload
/// including its trailing 2-byte status word. Never panics: every
/// malformed input is rejected with the appropriate status word, carried
/// as an otherwise-empty response payload rather than a HID-level error.
pub fn handle_apdu(state: &mut AuthenticatorState, apdu: &[u8]) -> Vec<u8> {
    if apdu.len() < APDU_HEADER_LEN {
        return StatusWord::WrongLength.to_be_bytes().to_vec();
    }

    let cla = apdu[0];
    let ins = apdu[1];
    let p1 = apdu[2];
    let p2 = apdu[3];
    let lc = read_lc(&apdu[4..7]);

    if cla != CLA_SUPPORTED {
        return StatusWord::ClaNotSupported.to_be_bytes().to_vec();
    }

    let Some(command) = U2fCommand::from_byte(ins) else {
        return StatusWord::InsNotSupported.to_be_bytes().to_vec();
    };

    let data_end = APDU_HEADER_LEN + lc;
    if apdu.len() < data_end {
        return StatusWord::WrongLength.to_be_bytes().to_vec();
    }
    let data = &apdu[APDU_HEADER_LEN..data_end];

    debug!("dispatching U2F APDU {command:?} (p1={p1:#x} p2={p2:#x} lc={lc})");

    match command {
        U2fCommand::Register => register::handle(state, data),
        U2fCommand::Authenticate => authenticate::handle(state, p1, data),
        U2fCommand::Version => {
            let mut response = Vec::with_capacity(U2F_VERSION_STRING.len() + 2);
            response.extend_from_slice(U2F_VERSION_STRING);
            response.extend_from_slice(&StatusWord::NoError.to_be_bytes());
            response
        }
    }
}

fn read_lc(bytes: &[u8]) -> usize {
    let mut buf = [0u8; 4];
    buf[1..4].copy_from_slice(bytes);
    BigEndian::read_u32(&buf) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AuthenticatorState;

    fn apdu_header(ins: u8, p1: u8, p2: u8, lc: usize) -> Vec<u8> {
        let mut header = vec![CLA_SUPPORTED, ins, p1, p2];
        header.push((lc >> 16) as u8);
        header.push((lc >> 8) as u8);
        header.push(lc as u8);
        header
    }

    #[test]
    fn version_responds_with_literal_string() {
        let mut state = AuthenticatorState::for_tests();
        let apdu = apdu_header(0x03, 0, 0, 0);
        let response = handle_apdu(&mut state, &apdu);
        assert_eq!(&response[..6], b"U2F_V2");
        assert_eq!(&response[6..], &StatusWord::NoError.to_be_bytes());
    }

    #[test]
    fn unknown_cla_is_rejected() {
        let mut state = AuthenticatorState::for_tests();
        let mut apdu = apdu_header(0x03, 0, 0, 0);
        apdu[0] = 0x01;
        let response = handle_apdu(&mut state, &apdu);
        assert_eq!(response, StatusWord::ClaNotSupported.to_be_bytes());
    }

    #[test]
    fn unknown_ins_is_rejected() {
        let mut state = AuthenticatorState::for_tests();
        let apdu = apdu_header(0x55, 0, 0, 0);
        let response = handle_apdu(&mut state, &apdu);
        assert_eq!(response, StatusWord::InsNotSupported.to_be_bytes());
    }

    #[test]
    fn truncated_data_is_wrong_length() {
        let mut state = AuthenticatorState::for_tests();
        let mut apdu = apdu_header(0x01, 0, 0, 64);
        apdu.extend_from_slice(&[0u8; 10]); // far short of the declared lc
        let response = handle_apdu(&mut state, &apdu);
        assert_eq!(response, StatusWord::WrongLength.to_be_bytes());
    }
}
