//! The U2FHID layer: packet codec, message reassembler/channel table, and
//! the HID-level command dispatcher.

pub mod channel;
pub mod constants;
pub mod dispatcher;
pub mod message;
pub mod packet;
