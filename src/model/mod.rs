//! Connection descriptor data model.
//!
//! A [`ConnectionDescriptor`] is the validated record of everything needed to
//! reach and authenticate against a deployment. It is produced by
//! [`crate::uri::parse`] or [`ConnectionDescriptor::from_attributes`] and
//! consumed by the URI serializer, the driver options builder and the
//! connect orchestrator.

pub mod attributes;
pub mod auth;
pub mod options;
pub mod ssh;
pub mod ssl;

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use auth::{AuthMechanism, AuthStrategy, Credentials, Secret};
pub use options::{
    Compressor, ConnectionOptions, ReadConcernLevel, ReadPreference, TagSet, UuidRepresentation,
    WriteConcernW,
};
pub use ssh::{SshTunnelAuth, SshTunnelConfig, SshTunnelMethod};
pub use ssl::{SslConfig, SslMethod};

/// Default server port.
pub const DEFAULT_PORT: u16 = 27017;

/// Host used when none is given.
pub const DEFAULT_HOSTNAME: &str = "localhost";

/// Authentication database for externally-managed identities.
pub const EXTERNAL_AUTH_SOURCE: &str = "$external";

/// Default authentication database for password credentials.
pub const ADMIN_AUTH_SOURCE: &str = "admin";

/// Suffix identifying MongoDB Atlas hosts.
const ATLAS_SUFFIX: &str = ".mongodb.net";

/// One `host:port` seed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Whether this is a MongoDB Atlas host. Host names compare without case.
    pub fn is_atlas(&self) -> bool {
        self.host.to_ascii_lowercase().ends_with(ATLAS_SUFFIX)
    }
}

impl Default for HostPort {
    fn default() -> Self {
        Self::new(DEFAULT_HOSTNAME, DEFAULT_PORT)
    }
}

impl From<SocketAddr> for HostPort {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Validated connection configuration.
///
/// Fields are public so callers can adjust a descriptor between connect
/// attempts; [`ConnectionDescriptor::validate`] runs again at the start of
/// every attempt.
///
/// Equality compares how a descriptor connects: a MONGODB descriptor with no
/// `auth_source` equals one whose source is spelled out as `admin`, and a
/// Kerberos service name of `mongodb` equals an unset one.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    /// Seed list. For SRV descriptors this is the single name to resolve.
    pub hosts: Vec<HostPort>,
    pub is_srv_record: bool,
    /// Database from the URI path.
    pub database: Option<String>,
    /// Explicit authentication database. Always `None` for LDAP, X509 and
    /// KERBEROS, which authenticate against `$external`.
    pub auth_source: Option<String>,
    pub credentials: Credentials,
    pub ssl: SslConfig,
    pub ssh_tunnel: Option<SshTunnelConfig>,
    pub options: ConnectionOptions,
    /// Free-form options merged into the driver options as-is.
    pub extra_options: serde_json::Map<String, serde_json::Value>,
    pub promote_values: Option<bool>,
}

impl Default for ConnectionDescriptor {
    fn default() -> Self {
        Self {
            hosts: vec![HostPort::default()],
            is_srv_record: false,
            database: None,
            auth_source: None,
            credentials: Credentials::None,
            ssl: SslConfig::default(),
            ssh_tunnel: None,
            options: ConnectionOptions::default(),
            extra_options: serde_json::Map::new(),
            promote_values: None,
        }
    }
}

impl PartialEq for ConnectionDescriptor {
    fn eq(&self, other: &Self) -> bool {
        let Self {
            hosts,
            is_srv_record,
            database,
            auth_source: _,
            credentials,
            ssl,
            ssh_tunnel,
            options,
            extra_options,
            promote_values,
        } = self;
        *hosts == other.hosts
            && *is_srv_record == other.is_srv_record
            && *database == other.database
            && self.explicit_auth_source() == other.explicit_auth_source()
            && credentials.canonical() == other.credentials.canonical()
            && *ssl == other.ssl
            && *ssh_tunnel == other.ssh_tunnel
            && *options == other.options
            && *extra_options == other.extra_options
            && *promote_values == other.promote_values
    }
}

impl ConnectionDescriptor {
    pub fn auth_strategy(&self) -> AuthStrategy {
        self.credentials.strategy()
    }

    pub fn ssh_tunnel_method(&self) -> SshTunnelMethod {
        self.ssh_tunnel
            .as_ref()
            .map(SshTunnelConfig::method)
            .unwrap_or_default()
    }

    /// Database the credentials are checked against.
    pub fn effective_auth_source(&self) -> &str {
        if let Some(source) = self.auth_source.as_deref() {
            return source;
        }
        match self.auth_strategy() {
            AuthStrategy::Mongodb => ADMIN_AUTH_SOURCE,
            AuthStrategy::Ldap | AuthStrategy::X509 | AuthStrategy::Kerberos => {
                EXTERNAL_AUTH_SOURCE
            }
            AuthStrategy::None => self.database.as_deref().unwrap_or(ADMIN_AUTH_SOURCE),
        }
    }

    /// `auth_source` with the strategy default folded into `None`.
    fn explicit_auth_source(&self) -> Option<&str> {
        match (self.auth_strategy(), self.auth_source.as_deref()) {
            (AuthStrategy::Mongodb, Some(ADMIN_AUTH_SOURCE)) => None,
            (_, source) => source,
        }
    }

    /// Check every field and field combination, returning the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(Error::validation("hosts", "at least one host is required"));
        }
        for host in &self.hosts {
            if host.host.is_empty() {
                return Err(Error::validation("hostname", "field is required"));
            }
            if host.port == 0 {
                return Err(Error::validation(
                    "port",
                    "expected an integer between 1 and 65535",
                ));
            }
        }
        if self.is_srv_record && self.hosts.len() != 1 {
            return Err(Error::validation(
                "hosts",
                "SRV descriptors take exactly one hostname",
            ));
        }

        self.credentials.validate()?;

        let strategy = self.auth_strategy();
        if self.auth_source.is_some()
            && matches!(
                strategy,
                AuthStrategy::Ldap | AuthStrategy::X509 | AuthStrategy::Kerberos
            )
        {
            return Err(Error::validation(
                "authSource",
                format!("does not apply to {}", strategy),
            ));
        }

        self.ssl.validate()?;
        self.options.validate()?;

        if let Some(tunnel) = &self.ssh_tunnel {
            tunnel.validate()?;
        }

        Ok(())
    }

    /// Canonical connection string for this descriptor.
    pub fn driver_url(&self) -> String {
        crate::uri::serialize(self)
    }

    /// Connection string the driver receives when the traffic rides an SSH
    /// tunnel: the seed list becomes the tunnel's local listener.
    pub fn driver_url_with_tunnel(&self, local_addr: SocketAddr) -> String {
        let mut tunnelled = self.clone();
        tunnelled.hosts = vec![HostPort::from(local_addr)];
        tunnelled.is_srv_record = false;
        crate::uri::serialize(&tunnelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mongodb_credentials() -> Credentials {
        Credentials::Mongodb {
            username: "arlo".into(),
            password: Secret::new("woof"),
            mechanism: None,
        }
    }

    mod auth_source {
        use super::*;

        #[test]
        fn test_mongodb_defaults_to_admin() {
            let descriptor = ConnectionDescriptor {
                credentials: mongodb_credentials(),
                database: Some("sales".into()),
                ..Default::default()
            };
            assert_eq!(descriptor.effective_auth_source(), "admin");
        }

        #[test]
        fn test_explicit_admin_equals_unset_for_mongodb() {
            let unset = ConnectionDescriptor {
                credentials: mongodb_credentials(),
                ..Default::default()
            };
            let explicit = ConnectionDescriptor {
                auth_source: Some("admin".into()),
                ..unset.clone()
            };
            assert_eq!(unset, explicit);
            assert_ne!(
                unset,
                ConnectionDescriptor {
                    auth_source: Some("users".into()),
                    ..explicit
                }
            );
        }

        #[test]
        fn test_explicit_admin_differs_without_credentials() {
            let unset = ConnectionDescriptor {
                database: Some("sales".into()),
                ..Default::default()
            };
            let explicit = ConnectionDescriptor {
                auth_source: Some("admin".into()),
                ..unset.clone()
            };
            assert_ne!(unset, explicit);
        }

        #[test]
        fn test_none_uses_database() {
            let descriptor = ConnectionDescriptor {
                database: Some("sales".into()),
                ..Default::default()
            };
            assert_eq!(descriptor.effective_auth_source(), "sales");
        }

        #[test]
        fn test_ldap_uses_external() {
            let descriptor = ConnectionDescriptor {
                credentials: Credentials::Ldap {
                    username: "ldap-user".into(),
                    password: Secret::new("ldap-password"),
                },
                ..Default::default()
            };
            assert_eq!(descriptor.effective_auth_source(), "$external");
        }

        #[test]
        fn test_explicit_source_rejected_for_x509() {
            let descriptor = ConnectionDescriptor {
                credentials: Credentials::X509 {
                    username: "CN=client".into(),
                },
                auth_source: Some("admin".into()),
                ssl: SslConfig::new(SslMethod::SystemCa),
                ..Default::default()
            };
            assert_eq!(descriptor.validate().unwrap_err().field(), Some("authSource"));
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn test_default_descriptor_is_valid() {
            assert!(ConnectionDescriptor::default().validate().is_ok());
        }

        #[test]
        fn test_srv_requires_single_host() {
            let descriptor = ConnectionDescriptor {
                hosts: vec![HostPort::new("a.example.com", 27017), HostPort::new("b.example.com", 27017)],
                is_srv_record: true,
                ..Default::default()
            };
            assert_eq!(descriptor.validate().unwrap_err().field(), Some("hosts"));
        }

        #[test]
        fn test_zero_port_rejected() {
            let descriptor = ConnectionDescriptor {
                hosts: vec![HostPort::new("localhost", 0)],
                ..Default::default()
            };
            assert_eq!(descriptor.validate().unwrap_err().field(), Some("port"));
        }
    }

    #[test]
    fn test_atlas_host_detection_ignores_case() {
        assert!(HostPort::new("cluster0-shard-00-00.abcde.MONGODB.NET", 27017).is_atlas());
        assert!(!HostPort::new("mongodb.net.example.com", 27017).is_atlas());
    }

    #[test]
    fn test_host_port_display_brackets_ipv6() {
        assert_eq!(HostPort::new("::1", 27018).to_string(), "[::1]:27018");
        assert_eq!(HostPort::default().to_string(), "localhost:27017");
    }

    #[test]
    fn test_driver_url_with_tunnel_replaces_hosts() {
        let descriptor = ConnectionDescriptor {
            hosts: vec![HostPort::new("cluster0.example.mongodb.net", 27017)],
            is_srv_record: true,
            ssl: SslConfig::new(SslMethod::SystemCa),
            ..Default::default()
        };
        let addr: SocketAddr = "127.0.0.1:29017".parse().unwrap();
        assert_eq!(
            descriptor.driver_url_with_tunnel(addr),
            "mongodb://127.0.0.1:29017/?readPreference=primary&ssl=true"
        );
    }
}
