//! Connection string parser.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::debug;

use super::encoding::decode;
use super::srv::{self, SrvResolver, TXT_ALLOWED_OPTIONS};
use super::{SCHEME, SRV_SCHEME};
use crate::error::{Error, Result};
use crate::model::{
    AuthMechanism, AuthStrategy, Compressor, ConnectionDescriptor, ConnectionOptions, Credentials,
    EXTERNAL_AUTH_SOURCE, HostPort, ReadConcernLevel, Secret, SslConfig, SslMethod, TagSet,
    UuidRepresentation, WriteConcernW, DEFAULT_PORT,
};

/// Every recognised query option, by canonical name.
const KNOWN_OPTIONS: &[&str] = &[
    "appname",
    "authMechanism",
    "authMechanismProperties",
    "authSource",
    "compressors",
    "connectTimeoutMS",
    "directConnection",
    "gssapiServiceName",
    "heartbeatFrequencyMS",
    "journal",
    "localThresholdMS",
    "maxIdleTimeMS",
    "maxPoolSize",
    "maxStalenessSeconds",
    "minPoolSize",
    "readConcernLevel",
    "readPreference",
    "readPreferenceTags",
    "replicaSet",
    "retryWrites",
    "serverSelectionTimeoutMS",
    "serverSelectionTryOnce",
    "socketTimeoutMS",
    "ssl",
    "tlsAllowInvalidCertificates",
    "tlsCAFile",
    "tlsCertificateFile",
    "tlsCertificateKeyFile",
    "tlsCertificateKeyFilePassword",
    "uuidRepresentation",
    "w",
    "waitQueueMultiple",
    "waitQueueTimeoutMS",
    "wTimeoutMS",
    "zlibCompressionLevel",
];

const ALIASES: [(&str, &str); 3] = [("j", "journal"), ("wtimeout", "wTimeoutMS"), ("tls", "ssl")];

/// Options that may appear more than once, each occurrence adding a value.
const REPEATABLE: [&str; 2] = ["readPreferenceTags", "tlsCAFile"];


fn canonical_key(key: &str) -> Option<&'static str> {
    ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(key))
        .map(|(_, canonical)| *canonical)
        .or_else(|| {
            KNOWN_OPTIONS
                .iter()
                .find(|known| known.eq_ignore_ascii_case(key))
                .copied()
        })
}

/// Raw query values keyed by canonical option name, still percent-encoded.
#[derive(Debug, Default)]
struct QueryOptions {
    values: BTreeMap<&'static str, Vec<String>>,
}

impl QueryOptions {
    fn parse(query: &str) -> Result<Self> {
        let mut options = Self::default();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (raw_key, raw_value) = pair
                .split_once('=')
                .ok_or_else(|| Error::parse("query options must be key=value pairs"))?;
            let key = decode("option name", raw_key)?;
            let canonical = canonical_key(&key)
                .ok_or_else(|| Error::validation(key.clone(), "unrecognized option"))?;
            options.insert(canonical, raw_value.to_string())?;
        }
        Ok(options)
    }

    fn insert(&mut self, key: &'static str, raw: String) -> Result<()> {
        let values = self.values.entry(key).or_default();
        if REPEATABLE.contains(&key) {
            values.push(raw);
        } else if values.is_empty() {
            values.push(raw);
        } else if values[0] != raw {
            return Err(Error::validation(key, "specified more than once with different values"));
        }
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Fill options from an SRV TXT record; explicit options win.
    fn merge_txt(&mut self, host: &str, record: &str) -> Result<()> {
        for pair in record.split('&').filter(|p| !p.is_empty()) {
            let (raw_key, raw_value) = pair
                .split_once('=')
                .ok_or_else(|| Error::dns(host, "TXT record is not a list of key=value pairs"))?;
            let key = TXT_ALLOWED_OPTIONS
                .iter()
                .find(|allowed| allowed.eq_ignore_ascii_case(raw_key))
                .and_then(|allowed| canonical_key(allowed))
                .ok_or_else(|| {
                    Error::dns(host, "TXT record may only set authSource and replicaSet")
                })?;
            if self.contains(key) {
                debug!(option = key, "Explicit option overrides TXT record");
                continue;
            }
            self.insert(key, raw_value.to_string())?;
        }
        Ok(())
    }

    fn raw(&mut self, key: &str) -> Option<String> {
        self.values.remove(key).and_then(|mut v| v.pop())
    }

    fn raw_all(&mut self, key: &str) -> Vec<String> {
        self.values.remove(key).unwrap_or_default()
    }

    fn string(&mut self, key: &str) -> Result<Option<String>> {
        self.raw(key).map(|raw| decode(key, &raw)).transpose()
    }

    fn number<T: std::str::FromStr>(&mut self, key: &str) -> Result<Option<T>> {
        self.string(key)?
            .map(|value| {
                value
                    .parse::<T>()
                    .map_err(|_| Error::validation(key, "expected a non-negative integer"))
            })
            .transpose()
    }

    fn boolean(&mut self, key: &str) -> Result<Option<bool>> {
        self.string(key)?
            .map(|value| match value.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(Error::validation(key, "expected true or false")),
            })
            .transpose()
    }

    fn parsed<T>(&mut self, key: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr<Err = Error>,
    {
        self.string(key)?.map(|value| value.parse::<T>()).transpose()
    }
}

/// TLS request as written in the `ssl` / `tls` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SslFlag {
    On,
    Off,
    Prefer,
}

fn parse_ssl_flag(value: &str) -> Result<SslFlag> {
    match value {
        "true" | "1" => Ok(SslFlag::On),
        "false" | "0" => Ok(SslFlag::Off),
        "prefer" => Ok(SslFlag::Prefer),
        _ => Err(Error::validation("ssl", "expected true, false or prefer")),
    }
}

struct Authority {
    username: Option<String>,
    password: Option<String>,
    hosts: Vec<HostPort>,
}

fn parse_userinfo(userinfo: &str) -> Result<(String, Option<String>)> {
    if userinfo.contains('@') {
        return Err(Error::parse(
            "username and password must have '@' percent-encoded",
        ));
    }
    let (user, password) = match userinfo.split_once(':') {
        Some((user, password)) => (user, Some(password)),
        None => (userinfo, None),
    };
    if password.is_some_and(|p| p.contains(':')) {
        return Err(Error::parse("password must have ':' percent-encoded"));
    }
    if user.is_empty() {
        return Err(Error::parse("username must not be empty"));
    }
    Ok((
        decode("username", user)?,
        password.map(|p| decode("password", p)).transpose()?,
    ))
}

fn parse_port(raw: &str) -> Result<u16> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::parse("port must be a number"));
    }
    match raw.parse::<u32>() {
        Ok(port) if (1..=u32::from(u16::MAX)).contains(&port) => Ok(port as u16),
        _ => Err(Error::validation(
            "port",
            "expected an integer between 1 and 65535",
        )),
    }
}

/// Parse one seed. The returned flag reports whether a port was written.
fn parse_host(raw: &str) -> Result<(HostPort, bool)> {
    if raw.is_empty() {
        return Err(Error::parse("host list contains an empty entry"));
    }

    let (host, port) = if let Some(rest) = raw.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| Error::parse("unterminated IPv6 address"))?;
        match after {
            "" => (host.to_string(), None),
            _ => match after.strip_prefix(':') {
                Some(port) => (host.to_string(), Some(port)),
                None => return Err(Error::parse("unexpected characters after IPv6 address")),
            },
        }
    } else {
        match raw.rsplit_once(':') {
            Some((host, _)) if host.contains(':') => {
                return Err(Error::parse("IPv6 addresses must be enclosed in brackets"));
            }
            Some((host, port)) => (decode("host", host)?, Some(port)),
            None => (decode("host", raw)?, None),
        }
    };

    if host.is_empty() {
        return Err(Error::parse("host must not be empty"));
    }
    let explicit = port.is_some();
    let port = port.map(parse_port).transpose()?.unwrap_or(DEFAULT_PORT);
    Ok((HostPort::new(host, port), explicit))
}

fn parse_authority(authority: &str, is_srv: bool) -> Result<Authority> {
    let (userinfo, host_list) = match authority.rsplit_once('@') {
        Some((userinfo, hosts)) => (Some(userinfo), hosts),
        None => (None, authority),
    };
    let (username, password) = match userinfo {
        Some(userinfo) => {
            let (user, password) = parse_userinfo(userinfo)?;
            (Some(user), password)
        }
        None => (None, None),
    };

    if host_list.is_empty() {
        return Err(Error::parse("at least one host is required"));
    }
    let entries: Vec<&str> = host_list.split(',').collect();
    if is_srv && entries.len() > 1 {
        return Err(Error::parse(
            "mongodb+srv connection strings take exactly one hostname",
        ));
    }

    let mut hosts = Vec::with_capacity(entries.len());
    for entry in entries {
        let (host, explicit_port) = parse_host(entry)?;
        if is_srv && explicit_port {
            return Err(Error::parse(
                "mongodb+srv connection strings must not specify a port",
            ));
        }
        hosts.push(host);
    }

    Ok(Authority {
        username,
        password,
        hosts,
    })
}

/// Split `k:v,k:v` on raw separators, decoding each token.
fn parse_pairs(field: &str, raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair
                .split_once(':')
                .ok_or_else(|| Error::validation(field, "expected key:value pairs"))?;
            Ok((decode(field, k)?, decode(field, v)?))
        })
        .collect()
}

fn parse_tags(raw: &[String]) -> Result<Vec<TagSet>> {
    let mut sets = Vec::new();
    for value in raw {
        for group in value.split(';') {
            sets.push(parse_pairs("readPreferenceTags", group)?);
        }
    }
    Ok(sets)
}

fn parse_compressors(raw: &str) -> Result<std::collections::BTreeSet<Compressor>> {
    raw.split(',')
        .map(|token| decode("compressors", token)?.parse::<Compressor>())
        .collect()
}

fn parse_options(query: &mut QueryOptions) -> Result<ConnectionOptions> {
    let zlib_compression_level = query
        .string("zlibCompressionLevel")?
        .map(|value| {
            value.parse::<i8>().map_err(|_| {
                Error::validation(
                    "zlibCompressionLevel",
                    "expected an integer between -1 and 9",
                )
            })
        })
        .transpose()?;

    Ok(ConnectionOptions {
        replica_set: query.string("replicaSet")?,
        read_preference: query.parsed("readPreference")?.unwrap_or_default(),
        read_preference_tags: parse_tags(&query.raw_all("readPreferenceTags"))?,
        max_staleness_seconds: query.number("maxStalenessSeconds")?,
        read_concern_level: query.parsed::<ReadConcernLevel>("readConcernLevel")?,
        w: query.string("w")?.map(|w| WriteConcernW::parse(&w)),
        w_timeout_ms: query.number("wTimeoutMS")?,
        journal: query.boolean("journal")?,
        min_pool_size: query.number("minPoolSize")?,
        max_pool_size: query.number("maxPoolSize")?,
        wait_queue_multiple: query.number("waitQueueMultiple")?,
        wait_queue_timeout_ms: query.number("waitQueueTimeoutMS")?,
        connect_timeout_ms: query.number("connectTimeoutMS")?,
        socket_timeout_ms: query.number("socketTimeoutMS")?,
        server_selection_timeout_ms: query.number("serverSelectionTimeoutMS")?,
        server_selection_try_once: query.boolean("serverSelectionTryOnce")?,
        heartbeat_frequency_ms: query.number("heartbeatFrequencyMS")?,
        local_threshold_ms: query.number("localThresholdMS")?,
        max_idle_time_ms: query.number("maxIdleTimeMS")?,
        compressors: query
            .raw("compressors")
            .map(|raw| parse_compressors(&raw))
            .transpose()?
            .unwrap_or_default(),
        zlib_compression_level,
        app_name: query.string("appname")?,
        // Anything but the literal "true" disables retryable writes.
        retry_writes: query.string("retryWrites")?.map(|value| value == "true"),
        uuid_representation: query.parsed::<UuidRepresentation>("uuidRepresentation")?,
        direct_connection: query.boolean("directConnection")?,
    })
}

fn parse_credentials(
    query: &mut QueryOptions,
    username: Option<String>,
    password: Option<String>,
) -> Result<Credentials> {
    let mechanism = query.parsed::<AuthMechanism>("authMechanism")?;
    let gssapi_service_name = query.string("gssapiServiceName")?;
    let properties = query
        .raw("authMechanismProperties")
        .map(|raw| parse_pairs("authMechanismProperties", &raw))
        .transpose()?;

    if mechanism != Some(AuthMechanism::Gssapi) {
        if gssapi_service_name.is_some() {
            return Err(Error::validation("gssapiServiceName", "only applies to GSSAPI"));
        }
        if properties.is_some() {
            return Err(Error::validation(
                "authMechanismProperties",
                "only applies to GSSAPI",
            ));
        }
    }

    let password = password.map(Secret::from);
    let credentials = match (mechanism, username) {
        (None, None) => {
            if password.is_some() {
                return Err(Error::parse("password given without a username"));
            }
            Credentials::None
        }
        (
            Some(
                mechanism @ (AuthMechanism::ScramSha1
                | AuthMechanism::ScramSha256
                | AuthMechanism::Plain
                | AuthMechanism::MongodbX509),
            ),
            None,
        ) => {
            return Err(Error::validation(
                "username",
                format!("is required by {}", mechanism),
            ));
        }
        (None | Some(AuthMechanism::ScramSha1 | AuthMechanism::ScramSha256), Some(username)) => {
            Credentials::Mongodb {
                username,
                password: password.unwrap_or_else(|| Secret::new("")),
                mechanism,
            }
        }
        (Some(AuthMechanism::Plain), Some(username)) => Credentials::Ldap {
            username,
            password: password.unwrap_or_else(|| Secret::new("")),
        },
        (Some(AuthMechanism::MongodbX509), Some(username)) => {
            if password.is_some() {
                return Err(Error::validation("password", "does not apply to X509"));
            }
            Credentials::X509 { username }
        }
        (Some(AuthMechanism::Gssapi), principal) => {
            let mut service_name = gssapi_service_name;
            let mut service_realm = None;
            let mut canonicalize_hostname = false;
            for (key, value) in properties.unwrap_or_default() {
                match key.as_str() {
                    "SERVICE_NAME" => {
                        if service_name.as_ref().is_some_and(|name| *name != value) {
                            return Err(Error::validation(
                                "gssapiServiceName",
                                "conflicts with SERVICE_NAME",
                            ));
                        }
                        service_name = Some(value);
                    }
                    "SERVICE_REALM" => service_realm = Some(value),
                    "CANONICALIZE_HOST_NAME" => {
                        canonicalize_hostname = match value.as_str() {
                            "true" => true,
                            "false" => false,
                            _ => {
                                return Err(Error::validation(
                                    "authMechanismProperties",
                                    "CANONICALIZE_HOST_NAME expects true or false",
                                ));
                            }
                        }
                    }
                    _ => {
                        return Err(Error::validation(
                            "authMechanismProperties",
                            "expected SERVICE_NAME, SERVICE_REALM or CANONICALIZE_HOST_NAME",
                        ));
                    }
                }
            }
            Credentials::Kerberos {
                principal: principal.unwrap_or_default(),
                password: password.filter(|p| !p.expose().is_empty()),
                service_name,
                service_realm,
                canonicalize_hostname,
            }
        }
    };
    Ok(credentials)
}

fn parse_ssl(query: &mut QueryOptions, hosts: &[HostPort], is_srv: bool) -> Result<SslConfig> {
    let flag = query
        .string("ssl")?
        .map(|value| parse_ssl_flag(&value))
        .transpose()?;
    let allow_invalid = query.boolean("tlsAllowInvalidCertificates")?;
    let ca = query
        .raw_all("tlsCAFile")
        .iter()
        .map(|raw| decode("tlsCAFile", raw).map(PathBuf::from))
        .collect::<Result<Vec<_>>>()?;
    let cert = query.string("tlsCertificateFile")?.map(PathBuf::from);
    let key = query.string("tlsCertificateKeyFile")?.map(PathBuf::from);
    let key_passphrase = query
        .string("tlsCertificateKeyFilePassword")?
        .map(Secret::from);

    let has_files = !ca.is_empty() || cert.is_some() || key.is_some();
    if flag == Some(SslFlag::Off) && (has_files || allow_invalid == Some(true)) {
        return Err(Error::validation(
            "ssl",
            "false conflicts with the TLS options also given",
        ));
    }

    let is_atlas = hosts.iter().any(HostPort::is_atlas);

    let method = if allow_invalid == Some(true) {
        SslMethod::Unvalidated
    } else if cert.is_some() || key.is_some() {
        SslMethod::All
    } else if !ca.is_empty() {
        SslMethod::Server
    } else {
        match flag {
            Some(SslFlag::On) => SslMethod::SystemCa,
            Some(SslFlag::Prefer) => SslMethod::IfAvailable,
            Some(SslFlag::Off) => SslMethod::None,
            None if is_srv || is_atlas => SslMethod::SystemCa,
            None => SslMethod::None,
        }
    };

    Ok(SslConfig {
        method,
        ca,
        cert,
        key,
        key_passphrase,
    })
}

/// Parse a connection string into a validated descriptor.
///
/// `mongodb+srv` strings are checked for shape first and only then resolved
/// through `resolver`; plain strings never touch it.
pub async fn parse(uri: &str, resolver: &dyn SrvResolver) -> Result<ConnectionDescriptor> {
    let (is_srv, rest) = if let Some(rest) = uri.strip_prefix(SRV_SCHEME) {
        (true, rest)
    } else if let Some(rest) = uri.strip_prefix(SCHEME) {
        (false, rest)
    } else {
        return Err(Error::parse(
            "expected a connection string starting with mongodb:// or mongodb+srv://",
        ));
    };

    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let (authority, remainder) = rest.split_at(authority_end);
    let Authority {
        username,
        password,
        hosts,
    } = parse_authority(authority, is_srv)?;

    let (path, query) = match remainder.split_once('?') {
        Some((path, query)) => (path, query),
        None => (remainder, ""),
    };
    let database = match path.strip_prefix('/').unwrap_or(path) {
        "" => None,
        raw => Some(decode("database", raw)?),
    };

    let mut query = QueryOptions::parse(query)?;

    if is_srv
        && let Some(seed) = hosts.first()
        && let Some(record) = srv::resolve(&seed.host, resolver).await?
    {
        query.merge_txt(&seed.host, &record)?;
    }

    let credentials = parse_credentials(&mut query, username, password)?;
    let ssl = parse_ssl(&mut query, &hosts, is_srv)?;

    let auth_source = query.string("authSource")?;
    let strategy = credentials.strategy();
    let auth_source = match strategy {
        AuthStrategy::Ldap | AuthStrategy::X509 | AuthStrategy::Kerberos => {
            if auth_source
                .as_deref()
                .is_some_and(|source| source != EXTERNAL_AUTH_SOURCE)
            {
                return Err(Error::validation(
                    "authSource",
                    format!("must be $external for {}", strategy),
                ));
            }
            None
        }
        AuthStrategy::Mongodb | AuthStrategy::None => auth_source,
    };

    let options = parse_options(&mut query)?;

    let descriptor = ConnectionDescriptor {
        hosts,
        is_srv_record: is_srv,
        database,
        auth_source,
        credentials,
        ssl,
        ssh_tunnel: None,
        options,
        extra_options: serde_json::Map::new(),
        promote_values: None,
    };
    descriptor.validate()?;
    debug!(
        strategy = %descriptor.auth_strategy(),
        ssl = %descriptor.ssl.method,
        srv = descriptor.is_srv_record,
        "Parsed connection string"
    );
    Ok(descriptor)
}
