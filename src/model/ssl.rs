//! TLS mode and certificate material references.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::auth::Secret;

/// How the client secures (or does not secure) the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SslMethod {
    /// Plain TCP.
    #[default]
    None,
    /// TLS validated against the system CA store.
    SystemCa,
    /// TLS without server identity checks.
    IfAvailable,
    /// TLS without any certificate chain validation.
    Unvalidated,
    /// TLS validated against the supplied CA files.
    Server,
    /// Mutual TLS: the client presents its own certificate.
    All,
}

impl SslMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::SystemCa => "SYSTEMCA",
            Self::IfAvailable => "IFAVAILABLE",
            Self::Unvalidated => "UNVALIDATED",
            Self::Server => "SERVER",
            Self::All => "ALL",
        }
    }

    /// Whether CA/cert/key files may be attached to this mode.
    pub fn accepts_files(&self) -> bool {
        matches!(self, Self::Server | Self::All)
    }
}

impl FromStr for SslMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "SYSTEMCA" => Ok(Self::SystemCa),
            "IFAVAILABLE" => Ok(Self::IfAvailable),
            "UNVALIDATED" => Ok(Self::Unvalidated),
            "SERVER" => Ok(Self::Server),
            "ALL" => Ok(Self::All),
            _ => Err(Error::validation(
                "ssl",
                "expected one of NONE, SYSTEMCA, IFAVAILABLE, UNVALIDATED, SERVER, ALL",
            )),
        }
    }
}

impl fmt::Display for SslMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TLS mode plus the files it references.
///
/// CA files are always held as a list even when a single path was supplied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SslConfig {
    pub method: SslMethod,
    pub ca: Vec<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub key_passphrase: Option<Secret>,
}

impl SslConfig {
    pub fn new(method: SslMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    fn has_files(&self) -> bool {
        !self.ca.is_empty() || self.cert.is_some() || self.key.is_some()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.method.accepts_files() {
            if !self.ca.is_empty() {
                return Err(Error::validation(
                    "sslCA",
                    format!("does not apply to ssl {}", self.method),
                ));
            }
            if self.cert.is_some() {
                return Err(Error::validation(
                    "sslCert",
                    format!("does not apply to ssl {}", self.method),
                ));
            }
            if self.key.is_some() {
                return Err(Error::validation(
                    "sslKey",
                    format!("does not apply to ssl {}", self.method),
                ));
            }
        }

        match self.method {
            SslMethod::Server => {
                if self.ca.is_empty() {
                    return Err(Error::validation("sslCA", "field is required"));
                }
                if self.cert.is_some() || self.key.is_some() {
                    return Err(Error::validation(
                        if self.cert.is_some() { "sslCert" } else { "sslKey" },
                        "does not apply to ssl SERVER",
                    ));
                }
            }
            SslMethod::All => {
                if self.cert.is_none() && self.key.is_none() {
                    return Err(Error::validation("sslKey", "field is required"));
                }
            }
            _ => {}
        }

        if self.key_passphrase.is_some() && self.method != SslMethod::All {
            return Err(Error::validation(
                "sslPass",
                format!("does not apply to ssl {}", self.method),
            ));
        }

        if self.has_files()
            && self
                .ca
                .iter()
                .chain(self.cert.iter())
                .chain(self.key.iter())
                .any(|path| path.as_os_str().is_empty())
        {
            return Err(Error::validation("sslCA", "file paths must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse_round_trip() {
        for method in [
            SslMethod::None,
            SslMethod::SystemCa,
            SslMethod::IfAvailable,
            SslMethod::Unvalidated,
            SslMethod::Server,
            SslMethod::All,
        ] {
            assert_eq!(method.as_str().parse::<SslMethod>().unwrap(), method);
        }
    }

    #[test]
    fn test_files_rejected_for_system_ca() {
        let config = SslConfig {
            ca: vec![PathBuf::from("/etc/ca.pem")],
            ..SslConfig::new(SslMethod::SystemCa)
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.field(), Some("sslCA"));
    }

    #[test]
    fn test_server_requires_ca() {
        let err = SslConfig::new(SslMethod::Server).validate().unwrap_err();
        assert_eq!(err.field(), Some("sslCA"));
    }

    #[test]
    fn test_all_with_key_and_passphrase() {
        let config = SslConfig {
            key: Some(PathBuf::from("/etc/client.pem")),
            key_passphrase: Some(Secret::new("woof")),
            ..SslConfig::new(SslMethod::All)
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_passphrase_requires_all() {
        let config = SslConfig {
            ca: vec![PathBuf::from("/etc/ca.pem")],
            key_passphrase: Some(Secret::new("woof")),
            ..SslConfig::new(SslMethod::Server)
        };
        assert_eq!(config.validate().unwrap_err().field(), Some("sslPass"));
    }
}
