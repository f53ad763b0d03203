//! Authentication strategies and the credentials each one carries.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A sensitive string (password or passphrase).
///
/// `Debug` and `Display` never print the value; use [`Secret::expose`] at the
/// point the value is actually needed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Credential family used to authenticate against the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthStrategy {
    #[default]
    None,
    Mongodb,
    Ldap,
    X509,
    Kerberos,
}

impl AuthStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Mongodb => "MONGODB",
            Self::Ldap => "LDAP",
            Self::X509 => "X509",
            Self::Kerberos => "KERBEROS",
        }
    }
}

impl fmt::Display for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mechanism names accepted in the `authMechanism` query option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMechanism {
    #[serde(rename = "SCRAM-SHA-1")]
    ScramSha1,
    #[serde(rename = "SCRAM-SHA-256")]
    ScramSha256,
    #[serde(rename = "PLAIN")]
    Plain,
    #[serde(rename = "MONGODB-X509")]
    MongodbX509,
    #[serde(rename = "GSSAPI")]
    Gssapi,
}

impl AuthMechanism {
    pub const ALL: [AuthMechanism; 5] = [
        Self::ScramSha1,
        Self::ScramSha256,
        Self::Plain,
        Self::MongodbX509,
        Self::Gssapi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScramSha1 => "SCRAM-SHA-1",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::Plain => "PLAIN",
            Self::MongodbX509 => "MONGODB-X509",
            Self::Gssapi => "GSSAPI",
        }
    }

    /// Strategy implied by this mechanism.
    pub fn strategy(&self) -> AuthStrategy {
        match self {
            Self::ScramSha1 | Self::ScramSha256 => AuthStrategy::Mongodb,
            Self::Plain => AuthStrategy::Ldap,
            Self::MongodbX509 => AuthStrategy::X509,
            Self::Gssapi => AuthStrategy::Kerberos,
        }
    }
}

impl FromStr for AuthMechanism {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                Error::validation(
                    "authMechanism",
                    "expected one of SCRAM-SHA-1, SCRAM-SHA-256, PLAIN, MONGODB-X509, GSSAPI",
                )
            })
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default Kerberos service name used when none is configured.
pub const DEFAULT_KERBEROS_SERVICE_NAME: &str = "mongodb";

/// Credentials for exactly one [`AuthStrategy`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    #[default]
    None,
    /// Username/password checked by the server (SCRAM).
    Mongodb {
        username: String,
        password: Secret,
        /// Explicit SCRAM variant; `None` lets the server negotiate.
        mechanism: Option<AuthMechanism>,
    },
    /// Directory-backed username/password (SASL PLAIN).
    Ldap { username: String, password: Secret },
    /// Client certificate; the username is the certificate subject DN.
    X509 { username: String },
    /// Kerberos ticket or principal/password (GSSAPI).
    Kerberos {
        principal: String,
        password: Option<Secret>,
        service_name: Option<String>,
        service_realm: Option<String>,
        canonicalize_hostname: bool,
    },
}

impl Credentials {
    pub fn strategy(&self) -> AuthStrategy {
        match self {
            Self::None => AuthStrategy::None,
            Self::Mongodb { .. } => AuthStrategy::Mongodb,
            Self::Ldap { .. } => AuthStrategy::Ldap,
            Self::X509 { .. } => AuthStrategy::X509,
            Self::Kerberos { .. } => AuthStrategy::Kerberos,
        }
    }

    /// Mechanism name the driver receives for these credentials.
    pub fn mechanism(&self) -> Option<AuthMechanism> {
        match self {
            Self::None => None,
            Self::Mongodb { mechanism, .. } => *mechanism,
            Self::Ldap { .. } => Some(AuthMechanism::Plain),
            Self::X509 { .. } => Some(AuthMechanism::MongodbX509),
            Self::Kerberos { .. } => Some(AuthMechanism::Gssapi),
        }
    }

    /// Identity sent to the server, if any.
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Mongodb { username, .. } | Self::Ldap { username, .. } => Some(username),
            Self::X509 { username } => Some(username),
            Self::Kerberos { principal, .. } => Some(principal),
        }
    }

    pub fn password(&self) -> Option<&Secret> {
        match self {
            Self::Mongodb { password, .. } | Self::Ldap { password, .. } => Some(password),
            Self::Kerberos { password, .. } => password.as_ref(),
            Self::None | Self::X509 { .. } => None,
        }
    }

    /// `authMechanismProperties` pairs, in emission order.
    pub fn mechanism_properties(&self) -> Vec<(&'static str, String)> {
        let mut props = Vec::new();
        if let Self::Kerberos {
            service_name,
            service_realm,
            canonicalize_hostname,
            ..
        } = self
        {
            if let Some(name) = service_name
                && name != DEFAULT_KERBEROS_SERVICE_NAME
            {
                props.push(("SERVICE_NAME", name.clone()));
            }
            if let Some(realm) = service_realm {
                props.push(("SERVICE_REALM", realm.clone()));
            }
            if *canonicalize_hostname {
                props.push(("CANONICALIZE_HOST_NAME", "true".to_string()));
            }
        }
        props
    }

    /// The same credentials with an explicit default service name unset.
    pub(crate) fn canonical(&self) -> Cow<'_, Self> {
        match self {
            Self::Kerberos {
                service_name: Some(name),
                ..
            } if name == DEFAULT_KERBEROS_SERVICE_NAME => {
                let mut owned = self.clone();
                if let Self::Kerberos { service_name, .. } = &mut owned {
                    *service_name = None;
                }
                Cow::Owned(owned)
            }
            _ => Cow::Borrowed(self),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let required = |field: &str, value: &str| {
            if value.is_empty() {
                Err(Error::validation(field, "field is required"))
            } else {
                Ok(())
            }
        };

        match self {
            Self::None => Ok(()),
            Self::Mongodb {
                username,
                password,
                mechanism,
            } => {
                required("mongodbUsername", username)?;
                required("mongodbPassword", password.expose())?;
                match mechanism {
                    None | Some(AuthMechanism::ScramSha1) | Some(AuthMechanism::ScramSha256) => {
                        Ok(())
                    }
                    Some(_) => Err(Error::validation(
                        "authMechanism",
                        "MONGODB authentication only supports SCRAM-SHA-1 and SCRAM-SHA-256",
                    )),
                }
            }
            Self::Ldap { username, password } => {
                required("ldapUsername", username)?;
                required("ldapPassword", password.expose())
            }
            Self::X509 { username } => required("x509Username", username),
            Self::Kerberos {
                principal,
                service_name,
                ..
            } => {
                required("kerberosPrincipal", principal)?;
                if service_name.as_deref().is_some_and(str::is_empty) {
                    return Err(Error::validation(
                        "kerberosServiceName",
                        "must not be empty",
                    ));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{:?}", secret), "Secret(****)");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_mechanism_parse_rejects_unknown() {
        assert_eq!(
            "scram-sha-256".parse::<AuthMechanism>().unwrap(),
            AuthMechanism::ScramSha256
        );
        let err = "DOGS".parse::<AuthMechanism>().unwrap_err();
        assert_eq!(err.field(), Some("authMechanism"));
    }

    #[test]
    fn test_mechanism_strategy_mapping() {
        assert_eq!(AuthMechanism::Plain.strategy(), AuthStrategy::Ldap);
        assert_eq!(AuthMechanism::Gssapi.strategy(), AuthStrategy::Kerberos);
        assert_eq!(AuthMechanism::ScramSha1.strategy(), AuthStrategy::Mongodb);
    }

    #[test]
    fn test_mongodb_requires_password() {
        let creds = Credentials::Mongodb {
            username: "arlo".into(),
            password: Secret::new(""),
            mechanism: None,
        };
        let err = creds.validate().unwrap_err();
        assert_eq!(err.field(), Some("mongodbPassword"));
        assert!(err.to_string().contains("field is required"));
    }

    #[test]
    fn test_kerberos_only_requires_principal() {
        let creds = Credentials::Kerberos {
            principal: "lucas@kerb.mongodb.parts".into(),
            password: None,
            service_name: None,
            service_realm: None,
            canonicalize_hostname: false,
        };
        assert!(creds.validate().is_ok());
        assert_eq!(creds.mechanism(), Some(AuthMechanism::Gssapi));
    }

    #[test]
    fn test_kerberos_mechanism_properties_order() {
        let creds = Credentials::Kerberos {
            principal: "p".into(),
            password: None,
            service_name: Some("other".into()),
            service_realm: Some("blah".into()),
            canonicalize_hostname: true,
        };
        let props = creds.mechanism_properties();
        assert_eq!(
            props,
            vec![
                ("SERVICE_NAME", "other".to_string()),
                ("SERVICE_REALM", "blah".to_string()),
                ("CANONICALIZE_HOST_NAME", "true".to_string()),
            ]
        );
    }
}
