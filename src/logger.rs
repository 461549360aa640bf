//! Where the logger lives
//!
//! The rest of the crate only ever talks to the `log` facade. This module provides a simple
//! file-backed logger for applications (and tests) that don't bring their own, along with the
//! tools to change it at runtime.

use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::io::Write;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};

use lazy_static::lazy_static;
use log::{LevelFilter, Metadata, Record};

lazy_static! {
    /// The global log sink
    ///
    /// This lock is provided both to sync writes to whatever log file we're using,
    /// AND to allow access to changing the logger at runtime.
    static ref LOG: Arc<Mutex<Option<File>>> = Arc::new(Mutex::new(None));
}

const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// The error returned from [`init`] when a logger was already installed
#[derive(Debug)]
pub struct AlreadyInitialized;

impl Display for AlreadyInitialized {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str("a global logger has already been set")
    }
}

impl std::error::Error for AlreadyInitialized {}

/// Initializes the logging utilities, particularly setting the global logger
/// to be the one given here.
///
/// Nothing is written until a file is provided with [`set_file`].
///
/// ## Errors
///
/// Fails if some logger - this one or another - has already been installed for the process.
pub fn init() -> Result<(), AlreadyInitialized> {
    log::set_logger(&LOGGER).map_err(|_| AlreadyInitialized)?;
    log::set_max_level(DEFAULT_LEVEL);
    Ok(())
}

/// (*Internal*) Locks the sink, recovering the guard if a writer panicked while holding it
fn sink() -> MutexGuard<'static, Option<File>> {
    match LOG.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Sets the log file to the given file handle, returning the old one, if it was present.
pub fn set_file(file: File) -> Option<File> {
    mem::replace(&mut *sink(), Some(file))
}

/// Removes the current log file, if there is one
pub fn take_file() -> Option<File> {
    sink().take()
}

/// Sets the global logging level, returning the previous one
pub fn set_level(level: LevelFilter) -> LevelFilter {
    let previous = log::max_level();
    log::set_max_level(level);
    previous
}

/// Returns whether there there is currently a log file in use
pub fn logging() -> bool {
    sink().is_some()
}

/// Returns the curent level of the logger
pub fn level() -> LevelFilter {
    log::max_level()
}

/// Utility function for grabbing the log level from a string.
///
/// The string should be one of:
///   "Trace", "Debug", "Info", "Warn", "Error", "Off"
pub fn level_filter_from_str(s: &str) -> Option<LevelFilter> {
    match s {
        "Trace" => Some(LevelFilter::Trace),
        "Debug" => Some(LevelFilter::Debug),
        "Info" => Some(LevelFilter::Info),
        "Warn" => Some(LevelFilter::Warn),
        "Error" => Some(LevelFilter::Error),
        "Off" => Some(LevelFilter::Off),
        _ => None,
    }
}

/// The public-facing logger. This is an empty struct that uses the internal
/// functions of the rest of the logging utilities to perform the logging.
pub struct Logger;

/// A dummy type that allows a static reference to a global logger.
pub static LOGGER: Logger = Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut guard = sink();

        // We only log if we actually have a file to log to
        if let Some(log_file) = guard.as_mut() {
            let now = chrono::Local::now().format("%H:%M:%S%.3f");
            let res = writeln!(
                log_file,
                "{} {:<5} [{}] {}",
                now,
                record.level(),
                record.target(),
                record.args()
            );

            // There's nowhere left to report a failure to write the log. Dropping the file means
            // we stop trying, instead of failing on every record afterwards.
            if res.is_err() {
                *guard = None;
            }
        }
    }

    fn flush(&self) {
        let mut guard = sink();
        if let Some(file) = guard.as_mut() {
            if file.flush().is_err() {
                *guard = None;
            }
        }
    }
}
