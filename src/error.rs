//! Crate-wide error type.
//!
//! Mirrors the four error kinds from the authenticator design: transport
//! failures and internal invariant violations are fatal (the process exits),
//! while HID-level and U2F-level protocol errors carry their wire code so
//! the dispatcher can serialize them without re-deriving anything from a
//! `Display` string.

use thiserror::Error;

/// One-byte U2FHID error codes carried by an `ERROR` response.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HidErrorCode {
    InvalidCmd = 0x01,
    InvalidPar = 0x02,
    InvalidLen = 0x03,
    InvalidSeq = 0x04,
    MsgTimeout = 0x05,
    ChannelBusy = 0x06,
    LockRequired = 0x0A,
    InvalidCid = 0x0B,
    Other = 0x7F,
}

/// Two-byte U2F/ISO-7816 status words, appended as the last two bytes of a
/// `MSG` response.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWord {
    NoError = 0x9000,
    ConditionsNotSatisfied = 0x6985,
    WrongData = 0x6A80,
    WrongLength = 0x6700,
    ClaNotSupported = 0x6E00,
    InsNotSupported = 0x6D00,
}

impl StatusWord {
    pub fn to_be_bytes(self) -> [u8; 2] {
        (self as u16).to_be_bytes()
    }
}

#[derive(Debug, Error)]
pub enum AuthenticatorError {
    /// Fatal: I/O on the transport device failed, or a report pulled off
    /// it was structurally malformed (wrong length).
    #[error("transport I/O failed: {0}")]
    Transport(#[from] std::io::Error),

    /// Recoverable: malformed packet, bad sequence, busy channel, timeout.
    #[error("HID protocol error: {0:?}")]
    ProtocolHid(HidErrorCode),

    /// Recoverable: APDU-level error, reported as a bare status word.
    #[error("U2F protocol error: {0:?}")]
    ProtocolU2f(StatusWord),

    /// Fatal: unreachable state, allocation failure, corrupt ambient material.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cryptographic operation failed: {0}")]
    Crypto(String),
}

impl AuthenticatorError {
    /// Builds a `Transport` error for a malformed report that was never a
    /// `std::io::Error` in the first place (e.g. a wrong-length buffer),
    /// so transport-level failures are reachable without an underlying
    /// I/O error to wrap.
    pub fn transport(message: impl Into<String>) -> Self {
        AuthenticatorError::Transport(std::io::Error::new(std::io::ErrorKind::InvalidData, message.into()))
    }
}

impl From<ring::error::Unspecified> for AuthenticatorError {
    fn from(_: ring::error::Unspecified) -> Self {
        AuthenticatorError::Crypto("ring operation returned Unspecified".into())
    }
}

impl From<pem::PemError> for AuthenticatorError {
    fn from(e: pem::PemError) -> Self {
        AuthenticatorError::Config(format!("invalid PEM: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, AuthenticatorError>;
