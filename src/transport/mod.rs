//! Transport: owns the character device node and reads/writes fixed-size
//! HID reports. Treated as a byte-oriented full-duplex transport — the HID
//! gadget driver backing the device node is an external collaborator, out
//! of scope here.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use log::{debug, error};

use crate::error::{AuthenticatorError, Result};
use crate::hid::constants::REPORT_LEN;

pub struct Transport {
    device: File,
}

impl Transport {
    pub fn open(path: &Path) -> Result<Self> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                error!("failed to open transport device {path:?}: {e}");
                AuthenticatorError::Transport(e)
            })?;
        debug!("opened transport device {path:?}");
        Ok(Transport { device })
    }

    /// Blocks for exactly one fixed-size report. Never splits a report
    /// across I/O operations.
    pub fn read_report(&mut self) -> Result<[u8; REPORT_LEN]> {
        let mut buf = [0u8; REPORT_LEN];
        self.device.read_exact(&mut buf).map_err(AuthenticatorError::Transport)?;
        Ok(buf)
    }

    pub fn write_report(&mut self, report: &[u8; REPORT_LEN]) -> Result<()> {
        self.device.write_all(report).map_err(AuthenticatorError::Transport)?;
        self.device.flush().map_err(AuthenticatorError::Transport)
    }
}
