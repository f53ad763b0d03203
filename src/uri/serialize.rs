//! Canonical connection string output.
//!
//! Option order is fixed: `replicaSet`, `readPreference`, `appname`,
//! `authSource`, `authMechanism`, `authMechanismProperties`, `compressors`,
//! `zlibCompressionLevel`, then every other option sorted by key, then `ssl`.
//! `readPreference` and `ssl` are always written; everything else only when set.

use std::collections::BTreeMap;

use super::encoding::{encode_component, encode_query_value};
use super::{SCHEME, SRV_SCHEME};
use crate::model::{
    ADMIN_AUTH_SOURCE, ConnectionDescriptor, Credentials, EXTERNAL_AUTH_SOURCE, HostPort,
    SslMethod,
};

fn userinfo(credentials: &Credentials) -> Option<String> {
    match credentials {
        Credentials::None => None,
        Credentials::Mongodb {
            username, password, ..
        }
        | Credentials::Ldap { username, password } => Some(format!(
            "{}:{}@",
            encode_component(username),
            encode_component(password.expose())
        )),
        Credentials::X509 { username } => Some(format!("{}@", encode_component(username))),
        Credentials::Kerberos {
            principal,
            password,
            ..
        } => Some(format!(
            "{}:{}@",
            encode_component(principal),
            password
                .as_ref()
                .map(|p| encode_component(p.expose()))
                .unwrap_or_default()
        )),
    }
}

fn host(seed: &HostPort, is_srv: bool) -> String {
    let name = if seed.host.contains(':') {
        format!("[{}]", seed.host)
    } else {
        encode_component(&seed.host)
    };
    if is_srv {
        name
    } else {
        format!("{}:{}", name, seed.port)
    }
}

fn pairs<'a>(items: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    items
        .into_iter()
        .map(|(k, v)| format!("{}:{}", encode_query_value(k), encode_query_value(v)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Serialize `descriptor` into its canonical connection string.
///
/// Total for any descriptor that passed validation.
pub fn serialize(descriptor: &ConnectionDescriptor) -> String {
    let mut out = String::from(if descriptor.is_srv_record {
        SRV_SCHEME
    } else {
        SCHEME
    });

    if let Some(userinfo) = userinfo(&descriptor.credentials) {
        out.push_str(&userinfo);
    }
    let hosts: Vec<String> = descriptor
        .hosts
        .iter()
        .map(|seed| host(seed, descriptor.is_srv_record))
        .collect();
    out.push_str(&hosts.join(","));

    out.push('/');
    if let Some(database) = &descriptor.database {
        out.push_str(&encode_component(database));
    }
    out.push('?');

    let options = &descriptor.options;
    let mut params: Vec<(&'static str, String)> = Vec::new();

    if let Some(replica_set) = &options.replica_set {
        params.push(("replicaSet", encode_query_value(replica_set)));
    }
    params.push(("readPreference", options.read_preference.to_string()));
    if let Some(app_name) = &options.app_name {
        params.push(("appname", encode_query_value(app_name)));
    }

    let auth_source = match &descriptor.credentials {
        Credentials::Mongodb { .. } => Some(
            descriptor
                .auth_source
                .as_deref()
                .unwrap_or(ADMIN_AUTH_SOURCE),
        ),
        Credentials::None => descriptor.auth_source.as_deref(),
        Credentials::Ldap { .. } | Credentials::Kerberos { .. } => Some(EXTERNAL_AUTH_SOURCE),
        Credentials::X509 { .. } => None,
    };
    if let Some(source) = auth_source {
        params.push(("authSource", encode_query_value(source)));
    }
    if let Some(mechanism) = descriptor.credentials.mechanism() {
        params.push(("authMechanism", mechanism.to_string()));
    }
    let properties = descriptor.credentials.mechanism_properties();
    if !properties.is_empty() {
        params.push((
            "authMechanismProperties",
            pairs(properties.iter().map(|(k, v)| (*k, v.as_str()))),
        ));
    }
    if !options.compressors.is_empty() {
        let names: Vec<&str> = options.compressors.iter().map(|c| c.as_str()).collect();
        params.push(("compressors", names.join(",")));
    }
    if let Some(level) = options.zlib_compression_level {
        params.push(("zlibCompressionLevel", level.to_string()));
    }

    let mut rest: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
    let mut put = |key: &'static str, value: Option<String>| {
        if let Some(value) = value {
            rest.entry(key).or_default().push(value);
        }
    };

    put("connectTimeoutMS", options.connect_timeout_ms.map(|v| v.to_string()));
    put("directConnection", options.direct_connection.map(|v| v.to_string()));
    put("heartbeatFrequencyMS", options.heartbeat_frequency_ms.map(|v| v.to_string()));
    put("journal", options.journal.map(|v| v.to_string()));
    put("localThresholdMS", options.local_threshold_ms.map(|v| v.to_string()));
    put("maxIdleTimeMS", options.max_idle_time_ms.map(|v| v.to_string()));
    put("maxPoolSize", options.max_pool_size.map(|v| v.to_string()));
    put("maxStalenessSeconds", options.max_staleness_seconds.map(|v| v.to_string()));
    put("minPoolSize", options.min_pool_size.map(|v| v.to_string()));
    put("readConcernLevel", options.read_concern_level.map(|v| v.as_str().to_string()));
    if !options.read_preference_tags.is_empty() {
        let groups: Vec<String> = options
            .read_preference_tags
            .iter()
            .map(|set| pairs(set.iter().map(|(k, v)| (k.as_str(), v.as_str()))))
            .collect();
        put("readPreferenceTags", Some(groups.join(";")));
    }
    put("retryWrites", options.retry_writes.map(|v| v.to_string()));
    put(
        "serverSelectionTimeoutMS",
        options.server_selection_timeout_ms.map(|v| v.to_string()),
    );
    put(
        "serverSelectionTryOnce",
        options.server_selection_try_once.map(|v| v.to_string()),
    );
    put("socketTimeoutMS", options.socket_timeout_ms.map(|v| v.to_string()));
    put("uuidRepresentation", options.uuid_representation.map(|v| v.as_str().to_string()));
    put("w", options.w.as_ref().map(|w| encode_query_value(&w.to_string())));
    put("waitQueueMultiple", options.wait_queue_multiple.map(|v| v.to_string()));
    put("waitQueueTimeoutMS", options.wait_queue_timeout_ms.map(|v| v.to_string()));
    put("wTimeoutMS", options.w_timeout_ms.map(|v| v.to_string()));

    let ssl = &descriptor.ssl;
    if ssl.method == SslMethod::Unvalidated {
        put("tlsAllowInvalidCertificates", Some("true".to_string()));
    }
    for ca in &ssl.ca {
        put("tlsCAFile", Some(encode_query_value(&ca.to_string_lossy())));
    }
    put(
        "tlsCertificateFile",
        ssl.cert.as_ref().map(|p| encode_query_value(&p.to_string_lossy())),
    );
    put(
        "tlsCertificateKeyFile",
        ssl.key.as_ref().map(|p| encode_query_value(&p.to_string_lossy())),
    );
    put(
        "tlsCertificateKeyFilePassword",
        ssl.key_passphrase
            .as_ref()
            .map(|p| encode_query_value(p.expose())),
    );

    for (key, values) in rest {
        for value in values {
            params.push((key, value));
        }
    }

    let ssl_flag = match ssl.method {
        SslMethod::None => "false",
        SslMethod::IfAvailable => "prefer",
        SslMethod::SystemCa | SslMethod::Unvalidated | SslMethod::Server | SslMethod::All => {
            "true"
        }
    };
    params.push(("ssl", ssl_flag.to_string()));

    let query: Vec<String> = params
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    out.push_str(&query.join("&"));
    out
}
