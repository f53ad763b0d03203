//! Flat camelCase attribute objects: construction and storage-safe export.
//!
//! Attribute objects are the shape connection profiles are stored in. They
//! predate the URI form and still carry legacy `snake_case` keys in older
//! profiles; those are folded into their camelCase names once, before
//! deserialization.
//!
//! Password and passphrase fields never pass through serde. They are pulled
//! out of the object first, so deserialization errors cannot echo them and
//! [`ConnectionDescriptor::to_attributes`] cannot emit them.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::auth::{AuthMechanism, AuthStrategy, Credentials, Secret};
use crate::model::options::{
    Compressor, ConnectionOptions, ReadConcernLevel, ReadPreference, TagSet, UuidRepresentation,
    WriteConcernW,
};
use crate::model::ssh::{DEFAULT_SSH_PORT, SshTunnelAuth, SshTunnelConfig, SshTunnelMethod};
use crate::model::ssl::{SslConfig, SslMethod};
use crate::model::{ConnectionDescriptor, DEFAULT_HOSTNAME, DEFAULT_PORT, HostPort};

/// Attribute keys holding secrets.
pub const SECRET_FIELDS: [&str; 6] = [
    "mongodbPassword",
    "ldapPassword",
    "kerberosPassword",
    "sslPass",
    "sshTunnelPassword",
    "sshTunnelPassphrase",
];

/// Credential attribute keys, grouped by the strategy they belong to.
const CREDENTIAL_FIELDS: [(AuthStrategy, &[&str]); 4] = [
    (
        AuthStrategy::Mongodb,
        &["mongodbUsername", "mongodbPassword", "mongodbDatabaseName"],
    ),
    (AuthStrategy::Ldap, &["ldapUsername", "ldapPassword"]),
    (AuthStrategy::X509, &["x509Username"]),
    (
        AuthStrategy::Kerberos,
        &[
            "kerberosPrincipal",
            "kerberosPassword",
            "kerberosServiceName",
            "kerberosServiceRealm",
            "kerberosCanonicalizeHostname",
        ],
    ),
];

/// Legacy keys whose camelCase name is not the mechanical conversion.
const LEGACY_RENAMES: [(&str, &str); 4] = [
    ("ssl_ca", "sslCA"),
    ("ssl_certificate", "sslCert"),
    ("ssl_private_key", "sslKey"),
    ("ssl_private_key_password", "sslPass"),
];

/// A number, or a string holding one. Stored profiles carry ports both ways.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

impl NumberOrString {
    fn to_port(&self, field: &str) -> Result<u16> {
        let value = match self {
            Self::Number(n) => u16::try_from(*n).ok(),
            Self::Text(s) => s.trim().parse::<u16>().ok(),
        };
        match value {
            Some(port) if port > 0 => Ok(port),
            _ => Err(Error::validation(
                field,
                "expected an integer between 1 and 65535",
            )),
        }
    }
}

/// `sslCA` is stored as a single path or a list of paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<PathBuf> {
        match self {
            Self::One(path) => vec![path],
            Self::Many(paths) => paths,
        }
    }

    fn from_vec(mut paths: Vec<PathBuf>) -> Option<Self> {
        match paths.len() {
            0 => None,
            1 => paths.pop().map(Self::One),
            _ => Some(Self::Many(paths)),
        }
    }
}

/// One `readPreferenceTags` entry: `[key, value]` pairs, or the legacy
/// `"k:v,k:v"` text older profiles carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredTagSet {
    Pairs(TagSet),
    Text(String),
}

impl StoredTagSet {
    fn into_tag_set(self) -> Result<TagSet> {
        match self {
            Self::Pairs(pairs) => Ok(pairs),
            Self::Text(raw) => parse_tag_set(&raw),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Attributes {
    hostname: Option<String>,
    port: Option<NumberOrString>,
    hosts: Vec<HostPort>,
    is_srv_record: Option<bool>,
    ns: Option<String>,

    #[serde(alias = "authentication")]
    auth_strategy: Option<String>,
    auth_mechanism: Option<String>,
    auth_source: Option<String>,
    mongodb_username: Option<String>,
    mongodb_database_name: Option<String>,
    ldap_username: Option<String>,
    x509_username: Option<String>,
    kerberos_principal: Option<String>,
    kerberos_service_name: Option<String>,
    kerberos_service_realm: Option<String>,
    kerberos_canonicalize_hostname: Option<bool>,

    ssl: Option<String>,
    #[serde(rename = "sslCA")]
    ssl_ca: Option<OneOrMany>,
    ssl_cert: Option<PathBuf>,
    ssl_key: Option<PathBuf>,

    ssh_tunnel: Option<String>,
    ssh_tunnel_hostname: Option<String>,
    ssh_tunnel_port: Option<NumberOrString>,
    ssh_tunnel_username: Option<String>,
    ssh_tunnel_identity_file: Option<PathBuf>,
    ssh_tunnel_bind_to_local_port: Option<NumberOrString>,

    replica_set: Option<String>,
    read_preference: Option<String>,
    read_preference_tags: Vec<StoredTagSet>,
    max_staleness_seconds: Option<u32>,
    read_concern_level: Option<String>,
    w: Option<WriteConcernW>,
    #[serde(rename = "wTimeoutMS")]
    w_timeout_ms: Option<u64>,
    journal: Option<bool>,
    min_pool_size: Option<u32>,
    max_pool_size: Option<u32>,
    wait_queue_multiple: Option<u32>,
    #[serde(rename = "waitQueueTimeoutMS")]
    wait_queue_timeout_ms: Option<u64>,
    #[serde(rename = "connectTimeoutMS")]
    connect_timeout_ms: Option<u64>,
    #[serde(rename = "socketTimeoutMS")]
    socket_timeout_ms: Option<u64>,
    #[serde(rename = "serverSelectionTimeoutMS")]
    server_selection_timeout_ms: Option<u64>,
    server_selection_try_once: Option<bool>,
    #[serde(rename = "heartbeatFrequencyMS")]
    heartbeat_frequency_ms: Option<u64>,
    #[serde(rename = "localThresholdMS")]
    local_threshold_ms: Option<u64>,
    #[serde(rename = "maxIdleTimeMS")]
    max_idle_time_ms: Option<u64>,
    compressors: Vec<String>,
    zlib_compression_level: Option<i8>,
    #[serde(rename = "appname")]
    app_name: Option<String>,
    retry_writes: Option<bool>,
    uuid_representation: Option<String>,
    direct_connection: Option<bool>,

    extra_options: Map<String, Value>,
    promote_values: Option<bool>,
}

/// Secrets pulled out of an attribute object before deserialization.
#[derive(Default)]
struct Secrets(HashMap<&'static str, Secret>);

impl Secrets {
    fn take(object: &mut Map<String, Value>) -> Result<Self> {
        let mut secrets = HashMap::new();
        for field in SECRET_FIELDS {
            match object.remove(field) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) if s.is_empty() => {}
                Some(Value::String(s)) => {
                    secrets.insert(field, Secret::from(s));
                }
                Some(_) => return Err(Error::validation(field, "expected a string")),
            }
        }
        Ok(Self(secrets))
    }

    fn get(&mut self, field: &str) -> Option<Secret> {
        self.0.remove(field)
    }

    fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }
}

/// Convert one legacy key to camelCase.
fn camel_case(key: &str) -> String {
    if let Some((_, renamed)) = LEGACY_RENAMES.iter().find(|(legacy, _)| *legacy == key) {
        return (*renamed).to_string();
    }
    let mut out = String::with_capacity(key.len());
    for (i, part) in key.split('_').filter(|p| !p.is_empty()).enumerate() {
        if i == 0 {
            out.push_str(part);
        } else {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Fold legacy `snake_case` keys into their camelCase names.
///
/// A legacy value only moves when it is non-empty and the camelCase key is
/// absent; the legacy key is dropped either way.
fn normalize_legacy_keys(object: &mut Map<String, Value>) {
    let legacy: Vec<String> = object.keys().filter(|k| k.contains('_')).cloned().collect();
    for key in legacy {
        let Some(value) = object.remove(&key) else {
            continue;
        };
        let camel = camel_case(&key);
        let target_blank = object.get(&camel).is_none_or(is_blank);
        if !is_blank(&value) && target_blank {
            debug!(legacy = %key, field = %camel, "Normalized legacy attribute");
            object.insert(camel, value);
        }
    }
}

/// Treat empty strings as absent.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn owned(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn parse_tag_set(raw: &str) -> Result<TagSet> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|pair| {
            pair.split_once(':')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| {
                    Error::validation("readPreferenceTags", "expected key:value pairs")
                })
        })
        .collect()
}

impl Attributes {
    fn credential_present(&self, secrets: &Secrets, field: &str) -> bool {
        match field {
            "mongodbUsername" => present(&self.mongodb_username).is_some(),
            "mongodbDatabaseName" => present(&self.mongodb_database_name).is_some(),
            "ldapUsername" => present(&self.ldap_username).is_some(),
            "x509Username" => present(&self.x509_username).is_some(),
            "kerberosPrincipal" => present(&self.kerberos_principal).is_some(),
            "kerberosServiceName" => present(&self.kerberos_service_name).is_some(),
            "kerberosServiceRealm" => present(&self.kerberos_service_realm).is_some(),
            "kerberosCanonicalizeHostname" => self.kerberos_canonicalize_hostname.is_some(),
            secret => secrets.contains(secret),
        }
    }

    /// Explicit strategy, or the first credential group with a populated field.
    fn strategy(&self, secrets: &Secrets) -> Result<(AuthStrategy, Option<AuthMechanism>)> {
        let Some(raw) = present(&self.auth_strategy) else {
            let inferred = CREDENTIAL_FIELDS
                .iter()
                .find(|(_, fields)| fields.iter().any(|f| self.credential_present(secrets, f)))
                .map(|(strategy, _)| *strategy)
                .unwrap_or_default();
            return Ok((inferred, None));
        };
        match raw.to_ascii_uppercase().as_str() {
            "NONE" => Ok((AuthStrategy::None, None)),
            "MONGODB" => Ok((AuthStrategy::Mongodb, None)),
            "SCRAM-SHA-256" => Ok((AuthStrategy::Mongodb, Some(AuthMechanism::ScramSha256))),
            "LDAP" => Ok((AuthStrategy::Ldap, None)),
            "X509" => Ok((AuthStrategy::X509, None)),
            "KERBEROS" => Ok((AuthStrategy::Kerberos, None)),
            _ => Err(Error::validation(
                "authStrategy",
                "expected one of NONE, MONGODB, SCRAM-SHA-256, LDAP, X509, KERBEROS",
            )),
        }
    }

    fn check_strategy_fields(&self, secrets: &Secrets, strategy: AuthStrategy) -> Result<()> {
        let required: &[&str] = match strategy {
            AuthStrategy::Mongodb => &["mongodbUsername", "mongodbPassword"],
            AuthStrategy::Ldap => &["ldapUsername", "ldapPassword"],
            AuthStrategy::X509 => &["x509Username"],
            AuthStrategy::Kerberos => &["kerberosPrincipal"],
            AuthStrategy::None => &[],
        };
        if let Some(missing) = required
            .iter()
            .find(|f| !self.credential_present(secrets, f))
        {
            return Err(Error::validation(*missing, "field is required"));
        }

        for (owner, fields) in CREDENTIAL_FIELDS {
            if owner == strategy {
                continue;
            }
            if let Some(field) = fields.iter().find(|f| self.credential_present(secrets, f)) {
                return Err(Error::validation(
                    *field,
                    format!("field does not apply to {}", strategy),
                ));
            }
        }
        Ok(())
    }

    fn credentials(
        &mut self,
        secrets: &mut Secrets,
        strategy: AuthStrategy,
        strategy_mechanism: Option<AuthMechanism>,
    ) -> Result<Credentials> {
        let mechanism = match present(&self.auth_mechanism) {
            Some(raw) => Some(raw.parse::<AuthMechanism>()?),
            None => strategy_mechanism,
        };
        Ok(match strategy {
            AuthStrategy::None => Credentials::None,
            AuthStrategy::Mongodb => Credentials::Mongodb {
                username: owned(self.mongodb_username.take()).unwrap_or_default(),
                password: secrets.get("mongodbPassword").unwrap_or_else(|| Secret::new("")),
                mechanism,
            },
            AuthStrategy::Ldap => Credentials::Ldap {
                username: owned(self.ldap_username.take()).unwrap_or_default(),
                password: secrets.get("ldapPassword").unwrap_or_else(|| Secret::new("")),
            },
            AuthStrategy::X509 => Credentials::X509 {
                username: owned(self.x509_username.take()).unwrap_or_default(),
            },
            AuthStrategy::Kerberos => Credentials::Kerberos {
                principal: owned(self.kerberos_principal.take()).unwrap_or_default(),
                password: secrets.get("kerberosPassword"),
                service_name: owned(self.kerberos_service_name.take()),
                service_realm: owned(self.kerberos_service_realm.take()),
                canonicalize_hostname: self.kerberos_canonicalize_hostname.unwrap_or(false),
            },
        })
    }

    /// Without an `ssl` key, Atlas hosts get SYSTEMCA and everything else NONE.
    fn ssl(&mut self, secrets: &mut Secrets, hosts: &[HostPort]) -> Result<SslConfig> {
        let method = match present(&self.ssl) {
            Some(raw) => raw.parse::<SslMethod>()?,
            None if hosts.iter().any(HostPort::is_atlas) => SslMethod::SystemCa,
            None => SslMethod::None,
        };
        Ok(SslConfig {
            method,
            ca: self.ssl_ca.take().map(OneOrMany::into_vec).unwrap_or_default(),
            cert: self.ssl_cert.take(),
            key: self.ssl_key.take(),
            key_passphrase: secrets.get("sslPass"),
        })
    }

    fn ssh_tunnel(&mut self, secrets: &mut Secrets) -> Result<Option<SshTunnelConfig>> {
        let method = match present(&self.ssh_tunnel) {
            Some(raw) => raw.parse::<SshTunnelMethod>()?,
            None => SshTunnelMethod::None,
        };
        let auth = match method {
            SshTunnelMethod::None => return Ok(None),
            SshTunnelMethod::UserPassword => SshTunnelAuth::Password(
                secrets
                    .get("sshTunnelPassword")
                    .unwrap_or_else(|| Secret::new("")),
            ),
            SshTunnelMethod::IdentityFile => SshTunnelAuth::IdentityFile {
                path: self.ssh_tunnel_identity_file.take().unwrap_or_default(),
                passphrase: secrets.get("sshTunnelPassphrase"),
            },
        };
        let port = match &self.ssh_tunnel_port {
            Some(port) => port.to_port("sshTunnelPort")?,
            None => DEFAULT_SSH_PORT,
        };
        let bind_to_local_port = self
            .ssh_tunnel_bind_to_local_port
            .as_ref()
            .map(|port| port.to_port("sshTunnelBindToLocalPort"))
            .transpose()?;
        Ok(Some(SshTunnelConfig {
            hostname: owned(self.ssh_tunnel_hostname.take()).unwrap_or_default(),
            port,
            username: owned(self.ssh_tunnel_username.take()).unwrap_or_default(),
            auth,
            bind_to_local_port,
        }))
    }

    fn options(&mut self) -> Result<ConnectionOptions> {
        Ok(ConnectionOptions {
            replica_set: owned(self.replica_set.take()),
            read_preference: match present(&self.read_preference) {
                Some(raw) => raw.parse()?,
                None => ReadPreference::Primary,
            },
            read_preference_tags: std::mem::take(&mut self.read_preference_tags)
                .into_iter()
                .map(StoredTagSet::into_tag_set)
                .collect::<Result<_>>()?,
            max_staleness_seconds: self.max_staleness_seconds,
            read_concern_level: present(&self.read_concern_level)
                .map(str::parse::<ReadConcernLevel>)
                .transpose()?,
            w: self.w.take(),
            w_timeout_ms: self.w_timeout_ms,
            journal: self.journal,
            min_pool_size: self.min_pool_size,
            max_pool_size: self.max_pool_size,
            wait_queue_multiple: self.wait_queue_multiple,
            wait_queue_timeout_ms: self.wait_queue_timeout_ms,
            connect_timeout_ms: self.connect_timeout_ms,
            socket_timeout_ms: self.socket_timeout_ms,
            server_selection_timeout_ms: self.server_selection_timeout_ms,
            server_selection_try_once: self.server_selection_try_once,
            heartbeat_frequency_ms: self.heartbeat_frequency_ms,
            local_threshold_ms: self.local_threshold_ms,
            max_idle_time_ms: self.max_idle_time_ms,
            compressors: self
                .compressors
                .iter()
                .map(|c| c.parse::<Compressor>())
                .collect::<Result<_>>()?,
            zlib_compression_level: self.zlib_compression_level,
            app_name: owned(self.app_name.take()),
            retry_writes: self.retry_writes,
            uuid_representation: present(&self.uuid_representation)
                .map(str::parse::<UuidRepresentation>)
                .transpose()?,
            direct_connection: self.direct_connection,
        })
    }

    fn hosts(&mut self) -> Result<Vec<HostPort>> {
        if !self.hosts.is_empty() {
            return Ok(std::mem::take(&mut self.hosts));
        }
        let port = match &self.port {
            Some(port) => port.to_port("port")?,
            None => DEFAULT_PORT,
        };
        let host = owned(self.hostname.take()).unwrap_or_else(|| DEFAULT_HOSTNAME.to_string());
        Ok(vec![HostPort::new(host, port)])
    }

    fn from_descriptor(descriptor: &ConnectionDescriptor) -> Self {
        let mut attrs = Self::default();

        match descriptor.hosts.as_slice() {
            [single] => {
                attrs.hostname = Some(single.host.clone());
                attrs.port = Some(NumberOrString::Number(u64::from(single.port)));
            }
            hosts => attrs.hosts = hosts.to_vec(),
        }
        attrs.is_srv_record = descriptor.is_srv_record.then_some(true);
        attrs.ns = descriptor.database.clone();

        let strategy = descriptor.auth_strategy();
        attrs.auth_strategy = Some(strategy.as_str().to_string());
        match &descriptor.credentials {
            Credentials::None => attrs.auth_source = descriptor.auth_source.clone(),
            Credentials::Mongodb {
                username,
                mechanism,
                ..
            } => {
                attrs.mongodb_username = Some(username.clone());
                attrs.mongodb_database_name = descriptor.auth_source.clone();
                attrs.auth_mechanism = mechanism.map(|m| m.as_str().to_string());
            }
            Credentials::Ldap { username, .. } => attrs.ldap_username = Some(username.clone()),
            Credentials::X509 { username } => attrs.x509_username = Some(username.clone()),
            Credentials::Kerberos {
                principal,
                service_name,
                service_realm,
                canonicalize_hostname,
                ..
            } => {
                attrs.kerberos_principal = Some(principal.clone());
                attrs.kerberos_service_name = service_name.clone();
                attrs.kerberos_service_realm = service_realm.clone();
                attrs.kerberos_canonicalize_hostname = canonicalize_hostname.then_some(true);
            }
        }

        attrs.ssl = Some(descriptor.ssl.method.as_str().to_string());
        attrs.ssl_ca = OneOrMany::from_vec(descriptor.ssl.ca.clone());
        attrs.ssl_cert = descriptor.ssl.cert.clone();
        attrs.ssl_key = descriptor.ssl.key.clone();

        attrs.ssh_tunnel = Some(descriptor.ssh_tunnel_method().as_str().to_string());
        if let Some(tunnel) = &descriptor.ssh_tunnel {
            attrs.ssh_tunnel_hostname = Some(tunnel.hostname.clone());
            attrs.ssh_tunnel_port = Some(NumberOrString::Number(u64::from(tunnel.port)));
            attrs.ssh_tunnel_username = Some(tunnel.username.clone());
            if let SshTunnelAuth::IdentityFile { path, .. } = &tunnel.auth {
                attrs.ssh_tunnel_identity_file = Some(path.clone());
            }
            attrs.ssh_tunnel_bind_to_local_port = tunnel
                .bind_to_local_port
                .map(|port| NumberOrString::Number(u64::from(port)));
        }

        let options = &descriptor.options;
        attrs.replica_set = options.replica_set.clone();
        attrs.read_preference = Some(options.read_preference.as_str().to_string());
        attrs.read_preference_tags = options
            .read_preference_tags
            .iter()
            .cloned()
            .map(StoredTagSet::Pairs)
            .collect();
        attrs.max_staleness_seconds = options.max_staleness_seconds;
        attrs.read_concern_level = options.read_concern_level.map(|l| l.as_str().to_string());
        attrs.w = options.w.clone();
        attrs.w_timeout_ms = options.w_timeout_ms;
        attrs.journal = options.journal;
        attrs.min_pool_size = options.min_pool_size;
        attrs.max_pool_size = options.max_pool_size;
        attrs.wait_queue_multiple = options.wait_queue_multiple;
        attrs.wait_queue_timeout_ms = options.wait_queue_timeout_ms;
        attrs.connect_timeout_ms = options.connect_timeout_ms;
        attrs.socket_timeout_ms = options.socket_timeout_ms;
        attrs.server_selection_timeout_ms = options.server_selection_timeout_ms;
        attrs.server_selection_try_once = options.server_selection_try_once;
        attrs.heartbeat_frequency_ms = options.heartbeat_frequency_ms;
        attrs.local_threshold_ms = options.local_threshold_ms;
        attrs.max_idle_time_ms = options.max_idle_time_ms;
        attrs.compressors = options
            .compressors
            .iter()
            .map(|c| c.as_str().to_string())
            .collect();
        attrs.zlib_compression_level = options.zlib_compression_level;
        attrs.app_name = options.app_name.clone();
        attrs.retry_writes = options.retry_writes;
        attrs.uuid_representation = options.uuid_representation.map(|u| u.as_str().to_string());
        attrs.direct_connection = options.direct_connection;

        attrs.extra_options = descriptor.extra_options.clone();
        attrs.promote_values = descriptor.promote_values;
        attrs
    }
}

/// Drop nulls and empty collections from a serialized attribute object.
fn prune(value: Value) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .filter(|(_, v)| match v {
                    Value::Null => false,
                    Value::Array(items) => !items.is_empty(),
                    Value::Object(map) => !map.is_empty(),
                    _ => true,
                })
                .collect(),
        ),
        other => other,
    }
}

impl ConnectionDescriptor {
    /// Build and validate a descriptor from a stored attribute object.
    ///
    /// Missing fields take their defaults (`localhost:27017`, `primary`,
    /// no TLS, no tunnel). When `authStrategy` is absent it is inferred from
    /// whichever credential fields are populated. Required credential fields
    /// are checked before fields that belong to a different strategy.
    pub fn from_attributes(attributes: Value) -> Result<Self> {
        let Value::Object(mut object) = attributes else {
            return Err(Error::validation("attributes", "expected a JSON object"));
        };
        normalize_legacy_keys(&mut object);
        let mut secrets = Secrets::take(&mut object)?;

        let mut attrs: Attributes = serde_json::from_value(Value::Object(object))
            .map_err(|e| Error::validation("attributes", e.to_string()))?;

        let (strategy, strategy_mechanism) = attrs.strategy(&secrets)?;
        attrs.check_strategy_fields(&secrets, strategy)?;

        let auth_source = owned(attrs.mongodb_database_name.take()).or(owned(attrs.auth_source.take()));
        let credentials = attrs.credentials(&mut secrets, strategy, strategy_mechanism)?;

        let hosts = attrs.hosts()?;
        let ssl = attrs.ssl(&mut secrets, &hosts)?;
        let descriptor = ConnectionDescriptor {
            hosts,
            is_srv_record: attrs.is_srv_record.unwrap_or(false),
            database: owned(attrs.ns.take()),
            auth_source,
            credentials,
            ssl,
            ssh_tunnel: attrs.ssh_tunnel(&mut secrets)?,
            options: attrs.options()?,
            extra_options: std::mem::take(&mut attrs.extra_options),
            promote_values: attrs.promote_values,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Attribute object safe to persist: every password and passphrase is omitted.
    pub fn to_attributes(&self) -> Value {
        let attrs = Attributes::from_descriptor(self);
        prune(serde_json::to_value(attrs).unwrap_or_default())
    }
}
