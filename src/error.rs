//! Error taxonomy for descriptor parsing, driver option building and tunnelling.
//!
//! Every failure a connect attempt can produce is one variant of [`Error`].
//! The variants are deliberately coarse so callers can branch on the stage that
//! failed:
//!
//! | Variant | Stage |
//! |---------|-------|
//! | [`Error::Parse`] | malformed connection string syntax |
//! | [`Error::Validation`] | semantically invalid field or field combination |
//! | [`Error::DnsResolution`] | SRV / TXT lookup for `mongodb+srv` |
//! | [`Error::TlsMaterial`] | unreadable CA / certificate / key file |
//! | [`Error::TunnelStartup`] | SSH connect, handshake or authentication |
//! | [`Error::TunnelTimeout`] | SSH handshake or forwarded channel took too long |
//! | [`Error::TunnelListen`] | local listener could not be bound |
//! | [`Error::Connect`] | the database driver's own connection failure |
//!
//! Display output never includes a credential value. Validation errors name the
//! offending field and what was expected of it, nothing more.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by an external collaborator (database driver, resolver).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or using a connection descriptor.
#[derive(Error, Debug)]
pub enum Error {
    /// The connection string is not syntactically valid.
    #[error("invalid connection string: {0}")]
    Parse(String),

    /// A field holds an invalid value or conflicts with another field.
    #[error("{field}: {reason}")]
    Validation { field: String, reason: String },

    /// SRV or TXT resolution failed for a `mongodb+srv` hostname.
    #[error("failed to resolve {host}: {message}")]
    DnsResolution { host: String, message: String },

    /// A referenced TLS file could not be read.
    #[error("failed to read TLS material from {}: {source}", path.display())]
    TlsMaterial {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The SSH session to the jump host could not be established.
    #[error("ssh tunnel startup failed: {0}")]
    TunnelStartup(String),

    /// The SSH handshake or forwarded channel did not complete in time.
    #[error("ssh tunnel timed out after {0:?} while {1}")]
    TunnelTimeout(Duration, &'static str),

    /// The local forwarding listener could not be bound.
    #[error("ssh tunnel failed to listen on {addr}: {source}")]
    TunnelListen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The database driver failed to connect.
    #[error("failed to connect: {0}")]
    Connect(#[source] BoxError),

    /// Invalid runtime configuration (environment, CLI arguments).
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Create a validation error naming the offending field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a DNS resolution error.
    pub fn dns(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DnsResolution {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Wrap a driver connection failure.
    pub fn connect(err: impl Into<BoxError>) -> Self {
        Self::Connect(err.into())
    }

    /// Field named by a validation error.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Check if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if this is a parse error.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }

    /// Check if this error originated in the SSH tunnel.
    pub fn is_tunnel(&self) -> bool {
        matches!(
            self,
            Self::TunnelStartup(_) | Self::TunnelTimeout(..) | Self::TunnelListen { .. }
        )
    }
}
