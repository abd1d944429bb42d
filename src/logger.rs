//! File-backed structured logging.
//!
//! `Logger::new` installs a `tracing_subscriber::fmt` layer writing to a
//! user-supplied path alongside whatever global subscriber the host process
//! has already installed (mirroring how `velesdb-server` wires
//! `tracing_subscriber::registry()` at startup). Every corrupt-record skip,
//! rebalance trigger, and maintenance pass goes through `tracing::event!`
//! so it reaches both this dedicated file and the host's own subscriber.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a file-backed `tracing` subscriber for the lifetime of the
/// process. Dropping the returned guard has no effect; the subscriber, once
/// installed, stays installed (matching `tracing`'s own global-default
/// model).
pub struct Logger;

impl Logger {
    /// Opens (creating if needed, appending otherwise) the log file at
    /// `path` and installs a `tracing` subscriber that writes formatted
    /// events to it, filtered by `RUST_LOG` (defaulting to `info`).
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if `path` cannot be opened for appending.
    ///
    /// # Panics
    ///
    /// Panics if a global `tracing` subscriber has already been installed
    /// in this process (matches `tracing`'s own `set_global_default`
    /// contract); call this at most once per process.
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(tracing_subscriber::fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
            .init();

        Ok(Self)
    }
}
