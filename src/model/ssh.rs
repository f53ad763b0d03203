//! SSH jump-host settings for reaching a database that is not directly routable.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::auth::Secret;

/// Default SSH port on the jump host.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Tunnel mode, as stored in connection attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SshTunnelMethod {
    #[default]
    None,
    UserPassword,
    IdentityFile,
}

impl SshTunnelMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::UserPassword => "USER_PASSWORD",
            Self::IdentityFile => "IDENTITY_FILE",
        }
    }
}

impl FromStr for SshTunnelMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "USER_PASSWORD" => Ok(Self::UserPassword),
            "IDENTITY_FILE" => Ok(Self::IdentityFile),
            _ => Err(Error::validation(
                "sshTunnel",
                "expected one of NONE, USER_PASSWORD, IDENTITY_FILE",
            )),
        }
    }
}

impl fmt::Display for SshTunnelMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the tunnel authenticates to the jump host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshTunnelAuth {
    Password(Secret),
    IdentityFile {
        path: PathBuf,
        passphrase: Option<Secret>,
    },
}

/// A configured SSH tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTunnelConfig {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub auth: SshTunnelAuth,
    /// Local port for the forwarding listener; a free port is picked at bind time when unset.
    pub bind_to_local_port: Option<u16>,
}

impl SshTunnelConfig {
    pub fn method(&self) -> SshTunnelMethod {
        match self.auth {
            SshTunnelAuth::Password(_) => SshTunnelMethod::UserPassword,
            SshTunnelAuth::IdentityFile { .. } => SshTunnelMethod::IdentityFile,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.hostname.is_empty() {
            return Err(Error::validation("sshTunnelHostname", "field is required"));
        }
        if self.port == 0 {
            return Err(Error::validation(
                "sshTunnelPort",
                "expected an integer between 1 and 65535",
            ));
        }
        if self.username.is_empty() {
            return Err(Error::validation("sshTunnelUsername", "field is required"));
        }
        match &self.auth {
            SshTunnelAuth::Password(password) if password.expose().is_empty() => Err(
                Error::validation("sshTunnelPassword", "field is required"),
            ),
            SshTunnelAuth::IdentityFile { path, .. } if path.as_os_str().is_empty() => Err(
                Error::validation("sshTunnelIdentityFile", "field is required"),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(auth: SshTunnelAuth) -> SshTunnelConfig {
        SshTunnelConfig {
            hostname: "123.45.67.89".into(),
            port: DEFAULT_SSH_PORT,
            username: "user".into(),
            auth,
            bind_to_local_port: None,
        }
    }

    #[test]
    fn test_method_follows_auth() {
        assert_eq!(
            config(SshTunnelAuth::Password("pass".into())).method(),
            SshTunnelMethod::UserPassword
        );
        let identity = SshTunnelAuth::IdentityFile {
            path: PathBuf::from("/home/user/.ssh/id_ed25519"),
            passphrase: None,
        };
        assert_eq!(config(identity).method(), SshTunnelMethod::IdentityFile);
    }

    #[test]
    fn test_empty_password_is_rejected() {
        let err = config(SshTunnelAuth::Password("".into()))
            .validate()
            .unwrap_err();
        assert_eq!(err.field(), Some("sshTunnelPassword"));
    }

    #[test]
    fn test_zero_port_is_rejected() {
        let mut tunnel = config(SshTunnelAuth::Password("pass".into()));
        tunnel.port = 0;
        assert_eq!(tunnel.validate().unwrap_err().field(), Some("sshTunnelPort"));
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(
            "identity_file".parse::<SshTunnelMethod>().unwrap(),
            SshTunnelMethod::IdentityFile
        );
        assert!("TELNET".parse::<SshTunnelMethod>().is_err());
    }
}
