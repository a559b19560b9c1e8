//! Opt-in logging setup for binaries embedding the finder. The library
//! itself only emits through the `log` facade.

use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

/// Install an env_logger with the crate at `debug` (verbose) or `info`
/// level and dependencies at `warn`. `RUST_LOG` still overrides everything.
pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .format(|buf, record| {
            let tag = env!("CARGO_PKG_NAME").cyan();
            match record.level() {
                Level::Warn => writeln!(
                    buf,
                    "[{tag} {} {}] {}",
                    "WARN".yellow(),
                    record.target(),
                    record.args()
                ),
                Level::Error => writeln!(
                    buf,
                    "[{tag} {} {}] {}",
                    "ERROR".red(),
                    record.target(),
                    record.args()
                ),
                _ => writeln!(buf, "[{tag}] {}", record.args()),
            }
        })
        .init();
}
