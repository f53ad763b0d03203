//! Driver options builder.
//!
//! Flattens a [`ConnectionDescriptor`] into the option set the database client
//! consumes for one connect attempt, reading TLS material into memory on the
//! way. The result is never persisted.

mod tls;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Result;
use crate::model::{AuthMechanism, ConnectionDescriptor, ConnectionOptions, Credentials, Secret};

pub use tls::{CaCertificates, TlsOptions};

/// Credentials as the driver receives them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverAuth {
    pub mechanism: Option<AuthMechanism>,
    pub username: String,
    pub password: Option<Secret>,
    /// Authentication database.
    pub source: String,
    pub mechanism_properties: Vec<(&'static str, String)>,
}

/// Options for one driver connect attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverOptions {
    /// Pool, timeout, compression, read/write concern and topology options.
    pub connection: ConnectionOptions,
    /// Allow connecting when no primary is available.
    pub connect_with_no_primary: bool,
    pub tls: TlsOptions,
    pub auth: Option<DriverAuth>,
    pub promote_values: Option<bool>,
    /// Free-form options with credential-shaped keys removed.
    pub extra: Map<String, Value>,
}

impl DriverOptions {
    pub fn direct_connection(&self) -> Option<bool> {
        self.connection.direct_connection
    }
}

/// Keys never forwarded from free-form options; credentials travel in [`DriverAuth`].
fn is_credential_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    matches!(lower.as_str(), "auth" | "password" | "sslpass")
        || lower.ends_with("password")
        || lower.ends_with("passphrase")
}

fn auth(descriptor: &ConnectionDescriptor) -> Option<DriverAuth> {
    let credentials = &descriptor.credentials;
    if matches!(credentials, Credentials::None) {
        return None;
    }
    Some(DriverAuth {
        mechanism: credentials.mechanism(),
        username: credentials.username().unwrap_or_default().to_string(),
        password: credentials.password().cloned(),
        source: descriptor.effective_auth_source().to_string(),
        mechanism_properties: credentials.mechanism_properties(),
    })
}

/// Build driver options for `descriptor`.
///
/// Fails with [`Error::TlsMaterial`](crate::error::Error::TlsMaterial) when a
/// referenced CA, certificate or key file cannot be read.
pub async fn build(descriptor: &ConnectionDescriptor) -> Result<DriverOptions> {
    let tls = tls::load(&descriptor.ssl).await?;

    let mut connection = descriptor.options.clone();
    // A lone seed without a replica set has always been a direct connection.
    if connection.direct_connection.is_none()
        && descriptor.hosts.len() == 1
        && !descriptor.is_srv_record
        && connection.replica_set.as_deref().is_none_or(str::is_empty)
    {
        connection.direct_connection = Some(true);
    }

    let mut extra = Map::new();
    for (key, value) in &descriptor.extra_options {
        if is_credential_key(key) {
            debug!(option = %key, "Dropped credential-shaped extra option");
            continue;
        }
        extra.insert(key.clone(), value.clone());
    }

    let options = DriverOptions {
        connection,
        connect_with_no_primary: true,
        tls,
        auth: auth(descriptor),
        promote_values: descriptor.promote_values,
        extra,
    };
    debug!(
        tls = options.tls.enabled,
        direct_connection = ?options.direct_connection(),
        "Built driver options"
    );
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HostPort, SslConfig, SslMethod};
    use serde_json::json;

    mod direct_connection {
        use super::*;

        #[tokio::test]
        async fn test_single_host_defaults_to_direct() {
            let descriptor = ConnectionDescriptor::default();
            let options = build(&descriptor).await.unwrap();
            assert_eq!(options.direct_connection(), Some(true));
        }

        #[tokio::test]
        async fn test_two_hosts_leave_it_unset() {
            let descriptor = ConnectionDescriptor {
                hosts: vec![HostPort::new("a", 27017), HostPort::new("b", 27017)],
                ..Default::default()
            };
            let options = build(&descriptor).await.unwrap();
            assert_eq!(options.direct_connection(), None);
        }

        #[tokio::test]
        async fn test_replica_set_leaves_it_unset() {
            let mut descriptor = ConnectionDescriptor::default();
            descriptor.options.replica_set = Some("rs0".into());
            assert_eq!(build(&descriptor).await.unwrap().direct_connection(), None);
        }

        #[tokio::test]
        async fn test_srv_leaves_it_unset() {
            let descriptor = ConnectionDescriptor {
                is_srv_record: true,
                ssl: SslConfig::new(SslMethod::SystemCa),
                ..Default::default()
            };
            assert_eq!(build(&descriptor).await.unwrap().direct_connection(), None);
        }

        #[tokio::test]
        async fn test_explicit_false_is_kept() {
            let mut descriptor = ConnectionDescriptor::default();
            descriptor.options.direct_connection = Some(false);
            assert_eq!(build(&descriptor).await.unwrap().direct_connection(), Some(false));
        }
    }

    #[tokio::test]
    async fn test_credentials_stripped_from_extra_options() {
        let mut descriptor = ConnectionDescriptor::default();
        descriptor.extra_options = json!({
            "auth": { "user": "arlo", "password": "woof" },
            "password": "woof",
            "sslPass": "woof",
            "sshTunnelPassword": "woof",
            "keyPassphrase": "woof",
            "socketTimeoutMS": 1000,
        })
        .as_object()
        .cloned()
        .unwrap();
        let options = build(&descriptor).await.unwrap();
        assert_eq!(options.extra.keys().collect::<Vec<_>>(), vec!["socketTimeoutMS"]);
    }

    #[tokio::test]
    async fn test_ldap_auth_uses_external_source() {
        let descriptor = ConnectionDescriptor {
            credentials: Credentials::Ldap {
                username: "ldap-user".into(),
                password: Secret::new("ldap-password"),
            },
            ..Default::default()
        };
        let auth = build(&descriptor).await.unwrap().auth.unwrap();
        assert_eq!(auth.mechanism, Some(AuthMechanism::Plain));
        assert_eq!(auth.source, "$external");
        assert_eq!(auth.username, "ldap-user");
    }

    #[tokio::test]
    async fn test_no_credentials_no_auth() {
        let options = build(&ConnectionDescriptor::default()).await.unwrap();
        assert!(options.auth.is_none());
        assert!(options.connect_with_no_primary);
        assert!(!options.tls.enabled);
    }
}
