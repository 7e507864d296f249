//! Packet codec: encodes/decodes the two U2FHID packet variants to/from raw
//! report buffers. Every field is read and written by explicit
//! slice-indexing, never by overlaying a struct on the wire buffer — see
//! the endianness note in the design notes for why.

use byteorder::{BigEndian, ByteOrder};

use super::constants::{CONT_DATA_CAP, CONT_HEADER_LEN, INIT_DATA_CAP, INIT_HEADER_LEN, REPORT_LEN};
use crate::error::{AuthenticatorError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Init {
        cid: u32,
        cmd: u8,
        bcnt: u16,
        data: Vec<u8>,
    },
    Cont {
        cid: u32,
        seq: u8,
        data: Vec<u8>,
    },
}

/// Encodes an initialization packet. `data` is copied in and the remainder
/// of the report is zero-padded; `bcnt` is the *logical* payload length,
/// which may be smaller than `data.len()` if `data` was already padded by
/// the caller, or larger if this is the first packet of a longer message.
pub fn encode_init(cid: u32, cmd: u8, bcnt: u16, data: &[u8]) -> [u8; REPORT_LEN] {
    let mut report = [0u8; REPORT_LEN];
    BigEndian::write_u32(&mut report[0..4], cid);
    // cmd already carries bit 7 (e.g. INIT = 0x86); OR is a defensive no-op.
    report[4] = cmd | 0x80;
    BigEndian::write_u16(&mut report[5..7], bcnt);
    let n = data.len().min(INIT_DATA_CAP);
    report[INIT_HEADER_LEN..INIT_HEADER_LEN + n].copy_from_slice(&data[..n]);
    report
}

/// Encodes a continuation packet with sequence number `seq` (0..=0x7F).
pub fn encode_cont(cid: u32, seq: u8, data: &[u8]) -> [u8; REPORT_LEN] {
    let mut report = [0u8; REPORT_LEN];
    BigEndian::write_u32(&mut report[0..4], cid);
    report[4] = seq & 0x7F;
    let n = data.len().min(CONT_DATA_CAP);
    report[CONT_HEADER_LEN..CONT_HEADER_LEN + n].copy_from_slice(&data[..n]);
    report
}

/// Decodes a raw report. Returns `Init` iff bit 7 of byte 4 is set,
/// otherwise `Cont`. Malformed (wrong-length) reports fail as `TRANSPORT`.
pub fn decode(report: &[u8]) -> Result<Packet> {
    if report.len() != REPORT_LEN {
        return Err(AuthenticatorError::transport(format!(
            "report has wrong length: {} (expected {})",
            report.len(),
            REPORT_LEN
        )));
    }

    let cid = BigEndian::read_u32(&report[0..4]);
    let type_byte = report[4];

    if type_byte & 0x80 != 0 {
        // Command bytes are defined with bit 7 already set (e.g. INIT is
        // 0x86), so the full byte is the command identity — not stripped.
        let cmd = type_byte;
        let bcnt = BigEndian::read_u16(&report[5..7]);
        let data = report[INIT_HEADER_LEN..].to_vec();
        Ok(Packet::Init { cid, cmd, bcnt, data })
    } else {
        let seq = type_byte;
        let data = report[CONT_HEADER_LEN..].to_vec();
        Ok(Packet::Cont { cid, seq, data })
    }
}
