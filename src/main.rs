use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

mod config;
mod crypto;
mod engine;
mod error;
mod hid;
mod keyhandle;
mod logging;
mod transport;
mod u2f;

use config::Config;
use engine::Engine;

/// Software U2F/CTAP1 authenticator exposed as a USB-HID FIDO device.
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Opts {
    /// Character device node to open, overriding DEVICE_PATH
    #[clap(short, long)]
    device: Option<PathBuf>,

    /// Verbose logging
    #[clap(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let opts = Opts::parse();
    logging::logger_init(opts.verbose);

    let config = match Config::load(opts.device) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            info!("received shutdown signal");
            running.store(false, Ordering::SeqCst);
        }) {
            error!("failed to install Ctrl-C handler: {e}");
            return ExitCode::FAILURE;
        }
    }

    let mut engine = match Engine::new(&config, running) {
        Ok(e) => e,
        Err(e) => {
            error!("failed to start engine: {e}");
            return ExitCode::FAILURE;
        }
    };

    match engine.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("engine exited with a fatal error: {e}");
            ExitCode::FAILURE
        }
    }
}
