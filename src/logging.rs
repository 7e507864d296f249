//! Structured logging setup: a rolling file appender with a size-based
//! delete-on-roll policy, plus a console appender, with independent level
//! filters for debug and release builds.

use directories::ProjectDirs;
use log::LevelFilter;
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        rolling_file::{
            policy::compound::{
                roll::delete::DeleteRoller, trigger::size::SizeTrigger, CompoundPolicy,
            },
            RollingFileAppender,
        },
    },
    config::{Appender, Logger, Root},
    encode::pattern::PatternEncoder,
};
use std::fs;

/// Initializes log4rs. `verbose` bumps the console appender by one level
/// (set via `-v`/`--verbose` on the CLI).
pub fn logger_init(verbose: bool) {
    let qual = "io";
    let org = "u2f-emulator";
    let app = "u2f-emulator";

    let log_file_path = {
        let log_dir = if let Some(proj_dirs) = ProjectDirs::from(qual, org, app) {
            proj_dirs.data_local_dir().join("logs")
        } else {
            eprintln!("Could not determine project directories. Falling back to local directory.");
            std::path::PathBuf::from("logs")
        };

        if let Err(e) = fs::create_dir_all(&log_dir) {
            eprintln!("Failed to create log directory at {:?}: {}", log_dir, e);
        }

        log_dir.join("u2f-emulator.log")
    };

    let size_trigger = SizeTrigger::new(10 * 1024 * 1024);
    let roller = DeleteRoller::new();
    let policy = CompoundPolicy::new(Box::new(size_trigger), Box::new(roller));

    let logfile = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "[{d(%Y-%m-%d %H:%M:%S %Z)} {l} {t}] {m}{n}",
        )))
        .build(log_file_path, Box::new(policy))
        .unwrap();

    let stdout = ConsoleAppender::builder()
        .target(Target::Stdout)
        .encoder(Box::new(PatternEncoder::new(
            "[{d(%Y-%m-%d %H:%M:%S %Z)} {h({l})} {t}] {m}{n}",
        )))
        .build();

    let (mut app_level, root_level) = if cfg!(debug_assertions) {
        (LevelFilter::Trace, LevelFilter::Debug)
    } else {
        (LevelFilter::Info, LevelFilter::Error)
    };
    if verbose {
        app_level = LevelFilter::Trace;
    }

    let config = log4rs::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .logger(Logger::builder().build("u2f_emulator", app_level))
        .build(
            Root::builder()
                .appenders(vec!["logfile", "stdout"])
                .build(root_level),
        )
        .unwrap();

    log4rs::init_config(config).unwrap();
}
