//! Server configuration, parsed from the command line.
//!
//! The CLI surface mirrors the source implementation's flags (`-addr`, `-port`, ...) but is
//! expressed with `clap`'s derive API, in the style of the `apex` example crate's `main.rs`.

use crate::error::ConfigError;
use clap::Parser;

/// Immutable server configuration, shared via `Arc` once validated.
#[derive(Parser, Debug, Clone)]
#[command(name = "scgi-templar")]
#[command(author, version, about = "An SCGI front-end that executes HTML/script templates", long_about = None)]
pub struct Config {
    /// Address to listen on.
    #[arg(long = "addr", default_value = "127.0.0.1")]
    pub addr: String,

    /// Port to listen on.
    #[arg(long = "port", default_value_t = 4000)]
    pub port: u16,

    /// Base directory for template resolution. Empty means derive from the request's
    /// DOCUMENT_ROOT header.
    #[arg(long = "path", default_value = "")]
    pub script_path: String,

    /// Daemonize: re-exec self as a detached child process, print its PID, then exit.
    #[arg(long = "fork")]
    pub fork: bool,

    /// Maximum number of concurrent worker contexts.
    #[arg(long = "max-threads", default_value_t = 50)]
    pub max_threads: usize,

    /// Minimum number of worker contexts to keep alive once created.
    #[arg(long = "min-threads", default_value_t = 1)]
    pub min_threads: usize,

    /// Seconds an idle worker is kept alive before being reclaimed.
    #[arg(long = "thread-keepalive", default_value_t = 60)]
    pub thread_keepalive: u64,

    /// Seconds a connection may sit idle before being dropped. -1 disables the timeout.
    #[arg(long = "conn-keepalive", default_value_t = -1)]
    pub conn_keepalive: i64,

    /// Emit debug-level logging.
    #[arg(long = "verbose")]
    pub verbose: bool,
}

impl Config {
    /// Validates cross-field invariants that `clap` can't express declaratively.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::ZeroMaxThreads);
        }
        if self.min_threads > self.max_threads {
            return Err(ConfigError::MinExceedsMax {
                min: self.min_threads,
                max: self.max_threads,
            });
        }
        Ok(())
    }

    /// `conn_keepalive` as a `Duration`, or `None` when disabled (-1).
    pub fn conn_keepalive_duration(&self) -> Option<std::time::Duration> {
        if self.conn_keepalive < 0 {
            None
        } else {
            Some(std::time::Duration::from_secs(self.conn_keepalive as u64))
        }
    }

    /// `thread_keepalive` as a `Duration`.
    pub fn thread_keepalive_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.thread_keepalive)
    }
}
