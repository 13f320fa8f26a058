//! Typed errors for the harvesting library.
//!
//! Orchestration code (pipeline, CLI, providers) works in `anyhow::Result`
//! and attaches context; the leaf layers below return these enums so the
//! pipeline can tell a per-item failure from a process-fatal one.
//!
//! | Error | Policy |
//! |-------|--------|
//! | [`NavigationError`] | Caught per target, recorded as a failed target |
//! | [`SchemaError`] | Rejected when the schema is built |
//! | [`PersistError`] | Surfaced to the caller; `Malformed` can be quarantined |
//! | [`ConfigError`] | Fatal at startup |

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A page could not be loaded by the navigation driver.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("navigation to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("navigation to {url} failed with HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("navigation to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("cannot navigate to {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// A schema was declared with an invalid shape.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema has no fields")]
    Empty,

    #[error("field name must not be empty")]
    EmptyFieldName,

    #[error("field name '{field}' is reserved for the record itself")]
    ReservedFieldName { field: String },

    #[error("field '{field}': {what} selector must not be empty")]
    EmptySelector { field: String, what: &'static str },

    #[error("retry ladder must contain at least one tier")]
    NoTiers,

    #[error("tier '{tier}' declares required field '{field}' that its schema does not extract")]
    UnknownRequiredField { tier: String, field: String },
}

/// A persisted artifact could not be read or written.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed persisted state in {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Required configuration is absent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required credential {name} is not set in the environment")]
    MissingCredential { name: &'static str },

    #[error("{field} must be an absolute http(s) URL, got '{value}': {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },
}
