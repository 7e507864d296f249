//! The engine context: per the design notes' anti-global-state guidance,
//! this struct (not file-scope statics) owns the channel table and the
//! cryptographic material and is threaded through every operation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{error, info, warn};
use ring::signature::EcdsaKeyPair;

use crate::config::Config;
use crate::crypto;
use crate::error::Result;
use crate::hid::channel::{ChannelTable, IngestResult};
use crate::hid::dispatcher;
use crate::transport::Transport;

/// Ambient authenticator material plus the one piece of mutable session
/// state (the signature counter).
pub struct AuthenticatorState {
    pub attestation_key: EcdsaKeyPair,
    pub attestation_cert: Vec<u8>,
    pub wrap_key: [u8; 32],
    /// Monotonic only within this process's lifetime — see the design
    /// notes' resolved open question on counter persistence.
    pub counter: u32,
}

impl AuthenticatorState {
    pub fn new(config: &Config) -> Result<Self> {
        let attestation_key = crypto::load_attestation_key(&config.attestation_key_path)?;
        let attestation_cert = crypto::load_attestation_cert(&config.attestation_cert_path)?;
        Ok(AuthenticatorState {
            attestation_key,
            attestation_cert,
            wrap_key: config.wrap_key,
            counter: 1,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        let (attestation_key, _) = crypto::generate_p256_keypair().expect("keygen");
        AuthenticatorState {
            attestation_key,
            attestation_cert: vec![0x30, 0x00], // a minimal placeholder DER SEQUENCE
            wrap_key: [0x5Au8; 32],
            counter: 1,
        }
    }
}

/// Drives the single-threaded, event-driven main loop: reads reports from
/// the transport, feeds the reassembler, dispatches complete messages, and
/// writes responses back, until `running` is cleared.
pub struct Engine {
    transport: Transport,
    channels: ChannelTable,
    state: AuthenticatorState,
    running: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(config: &Config, running: Arc<AtomicBool>) -> Result<Self> {
        let transport = Transport::open(&config.device_path)?;
        let state = AuthenticatorState::new(config)?;
        Ok(Engine {
            transport,
            channels: ChannelTable::new(),
            state,
            running,
        })
    }

    /// Runs until `running` is cleared (clean shutdown) or a `TRANSPORT`/
    /// `INTERNAL` error occurs (fatal — the process should exit nonzero).
    pub fn run(&mut self) -> Result<()> {
        info!("engine started");
        while self.running.load(Ordering::SeqCst) {
            self.reap_timeouts();

            let report = match self.transport.read_report() {
                Ok(r) => r,
                Err(e) => {
                    error!("fatal transport error: {e}");
                    return Err(e);
                }
            };

            match self.channels.ingest(&report) {
                Ok(IngestResult::Pending) => {}
                Ok(IngestResult::Complete(msg)) => {
                    let response = dispatcher::dispatch(&mut self.channels, &mut self.state, msg);
                    self.write_message(&response)?;
                }
                Ok(IngestResult::Error(cid, code)) => {
                    let response = dispatcher::error_response(cid, code);
                    self.write_message(&response)?;
                }
                Err(e) => {
                    error!("fatal reassembler error: {e}");
                    return Err(e);
                }
            }
        }
        info!("engine shut down cleanly");
        Ok(())
    }

    fn reap_timeouts(&mut self) {
        for (cid, code) in self.channels.tick(Instant::now()) {
            warn!("channel {cid:#x} timed out mid-transaction");
            let response = dispatcher::error_response(cid, code);
            if let Err(e) = self.write_message(&response) {
                error!("failed to report timeout on channel {cid:#x}: {e}");
            }
        }
    }

    fn write_message(&mut self, message: &crate::hid::message::Message) -> Result<()> {
        for report in ChannelTable::serialize(message) {
            self.transport.write_report(&report)?;
        }
        Ok(())
    }
}
