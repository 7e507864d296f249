//! HID-level command dispatcher: routes a reassembled message by its `CMD`
//! byte, handling `INIT`/`PING`/`WINK`/`ERROR` directly and tunneling `MSG`
//! payloads into the U2F APDU handler.

use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};

use super::channel::ChannelTable;
use super::constants::{
    CAP_FLAGS, CID_BROADCAST, DEV_VERSION_BUILD, DEV_VERSION_MAJOR, DEV_VERSION_MINOR, HidCommand,
    INIT_NONCE_LEN, PROTOCOL_VERSION,
};
use super::message::Message;
use crate::error::HidErrorCode;
use crate::u2f;

/// Handles one reassembled message and returns the response message to
/// serialize back to the transport.
pub fn dispatch(table: &mut ChannelTable, engine: &mut crate::engine::AuthenticatorState, msg: Message) -> Message {
    let response = match HidCommand::from_byte(msg.cmd) {
        Some(HidCommand::Init) => handle_init(table, &msg),
        Some(HidCommand::Ping) => Message::new(msg.cid, msg.cmd, msg.payload.clone()),
        Some(HidCommand::Wink) => Message::new(msg.cid, msg.cmd, Vec::new()),
        Some(HidCommand::Msg) => {
            let apdu_response = u2f::handle_apdu(engine, &msg.payload);
            Message::new(msg.cid, msg.cmd, apdu_response)
        }
        Some(HidCommand::Error) => {
            warn!("received inbound ERROR command on cid {:#x}, ignoring", msg.cid);
            Message::new(msg.cid, msg.cmd, msg.payload.clone())
        }
        None => {
            debug!("unknown HID command byte {:#x} on cid {:#x}", msg.cmd, msg.cid);
            error_response(msg.cid, HidErrorCode::InvalidCmd)
        }
    };

    // The channel that produced this message is done being PROCESSING; a
    // freshly allocated channel (broadcast INIT) is already idle, so
    // finishing it is a harmless no-op.
    table.finish(msg.cid);
    response
}

fn handle_init(table: &mut ChannelTable, msg: &Message) -> Message {
    let nonce = {
        let mut n = [0u8; INIT_NONCE_LEN];
        let take = msg.payload.len().min(INIT_NONCE_LEN);
        n[..take].copy_from_slice(&msg.payload[..take]);
        n
    };

    let target_cid = if msg.cid == CID_BROADCAST {
        table.allocate_channel()
    } else {
        msg.cid
    };

    let mut payload = Vec::with_capacity(INIT_NONCE_LEN + 4 + 5);
    payload.extend_from_slice(&nonce);
    let mut cid_bytes = [0u8; 4];
    BigEndian::write_u32(&mut cid_bytes, target_cid);
    payload.extend_from_slice(&cid_bytes);
    payload.push(PROTOCOL_VERSION);
    payload.push(DEV_VERSION_MAJOR);
    payload.push(DEV_VERSION_MINOR);
    payload.push(DEV_VERSION_BUILD);
    payload.push(CAP_FLAGS);

    // INIT always answers on the (possibly freshly allocated) target CID.
    Message::new(target_cid, HidCommand::Init as u8, payload)
}

pub fn error_response(cid: u32, code: HidErrorCode) -> Message {
    Message::new(cid, HidCommand::Error as u8, vec![code as u8])
}
