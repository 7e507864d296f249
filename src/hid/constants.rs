//! U2FHID wire constants: report geometry, command bytes, reserved CIDs,
//! and INIT response fields.

/// Size of a single HID report, as read from/written to the transport.
pub const REPORT_LEN: usize = 64;

/// Header overhead of an initialization packet: CID(4) + CMD(1) + BCNT(2).
pub const INIT_HEADER_LEN: usize = 7;
/// Header overhead of a continuation packet: CID(4) + SEQ(1).
pub const CONT_HEADER_LEN: usize = 5;

pub const INIT_DATA_CAP: usize = REPORT_LEN - INIT_HEADER_LEN;
pub const CONT_DATA_CAP: usize = REPORT_LEN - CONT_HEADER_LEN;

/// Broadcast CID used only by `INIT` before a channel is allocated.
pub const CID_BROADCAST: u32 = 0xFFFF_FFFF;
/// Reserved CID, never valid for data.
pub const CID_RESERVED: u32 = 0x0000_0000;

pub const TRANSACTION_TIMEOUT_MS: u64 = 500;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HidCommand {
    Ping = 0x81,
    Msg = 0x83,
    Init = 0x86,
    Wink = 0x88,
    Error = 0xBF,
}

impl HidCommand {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x81 => Some(Self::Ping),
            0x83 => Some(Self::Msg),
            0x86 => Some(Self::Init),
            0x88 => Some(Self::Wink),
            0xBF => Some(Self::Error),
            _ => None,
        }
    }
}

pub const PROTOCOL_VERSION: u8 = 2;
pub const DEV_VERSION_MAJOR: u8 = 0;
pub const DEV_VERSION_MINOR: u8 = 1;
pub const DEV_VERSION_BUILD: u8 = 0;

bitflags::bitflags! {
    /// Capability flags reported in the INIT response. WINK is handled as
    /// a no-op but not advertised as a capability: no bits are set.
    pub struct CapabilityFlags: u8 {
        const WINK = 0x01;
    }
}

pub const CAP_FLAGS: u8 = CapabilityFlags::empty().bits();

pub const INIT_NONCE_LEN: usize = 8;
