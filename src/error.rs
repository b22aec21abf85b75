//! Error types for each subsystem boundary.
//!
//! Each error is non-panicking and propagates via `Result`; conversion into an HTTP-ish
//! response happens at the worker boundary (see `worker.rs`), not here.

use thiserror::Error;

/// Errors raised while decoding the SCGI netstring framing (see `protocol.rs`).
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The netstring length prefix was not a valid non-negative integer.
    #[error("invalid netstring length prefix: {0}")]
    BadLength(String),

    /// The `,` separating the header block from the body was missing.
    #[error("missing ',' separating headers from content")]
    MissingSeparator,

    /// A header key or value was not valid UTF-8.
    #[error("header key or value is not valid UTF-8")]
    BadHeaderEncoding,

    /// The header block did not contain complete `name\0value\0` pairs.
    #[error("truncated header pair")]
    TruncatedHeaders,

    /// `CONTENT_LENGTH` was missing or not an integer.
    #[error("CONTENT_LENGTH header is missing or not an integer: {0}")]
    BadContentLength(String),

    /// Underlying socket I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while resolving a template file from request metadata.
#[derive(Error, Debug)]
pub enum LocatorError {
    /// None of the candidate paths resolved to a readable regular file.
    #[error("Could not find {0} on the server")]
    NotFound(String),
}

/// Errors raised by the sandboxed DSL interpreter. These never escape a fragment boundary
/// in normal operation (see `sandbox::Sandbox::run_fragment`); they exist so that the one
/// call site which does catch them can render a useful `die()` message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    /// A lexical/syntax error while parsing a fragment.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Reference to a name that isn't bound in the sandbox.
    #[error("undefined name: {0}")]
    UndefinedName(String),

    /// A value was used in a way its type doesn't support (e.g. indexing an integer).
    #[error("type error: {0}")]
    Type(String),

    /// Wrong number of arguments to a builtin.
    #[error("wrong number of arguments to {0}")]
    Arity(String),

    /// The template explicitly called the `error(...)` builtin.
    #[error("{0}")]
    Raised(String),
}

/// Errors raised while loading configuration / parsing CLI arguments.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `min_threads` exceeded `max_threads`.
    #[error("min_threads ({min}) must not exceed max_threads ({max})")]
    MinExceedsMax { min: usize, max: usize },

    /// `max_threads` was zero.
    #[error("max_threads must be at least 1")]
    ZeroMaxThreads,
}
