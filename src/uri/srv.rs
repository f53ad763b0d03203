//! Service-discovery lookups for `mongodb+srv` connection strings.
//!
//! Resolution is delegated to an injected [`SrvResolver`] so parsing can be
//! exercised without a network. [`SystemResolver`] (feature `dns`) reads the
//! host's resolver configuration.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::HostPort;

/// Query options a TXT record may supply.
pub const TXT_ALLOWED_OPTIONS: [&str; 2] = ["authSource", "replicaSet"];

/// DNS capability used for SRV connection strings.
///
/// Implementations return `Ok` with an empty list when the name has no
/// records of that type; `Err` is reserved for resolution failures.
#[async_trait]
pub trait SrvResolver: Send + Sync {
    /// Resolve SRV records for a fully-qualified service name.
    async fn lookup_srv(&self, name: &str) -> std::result::Result<Vec<HostPort>, String>;

    /// Resolve TXT records, one string per record with its chunks concatenated.
    async fn lookup_txt(&self, name: &str) -> std::result::Result<Vec<String>, String>;
}

/// Resolver that refuses every lookup. Plain `mongodb://` strings never call it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResolver;

#[async_trait]
impl SrvResolver for NoResolver {
    async fn lookup_srv(&self, _name: &str) -> std::result::Result<Vec<HostPort>, String> {
        Err("no DNS resolver is configured".to_string())
    }

    async fn lookup_txt(&self, _name: &str) -> std::result::Result<Vec<String>, String> {
        Err("no DNS resolver is configured".to_string())
    }
}

#[cfg(feature = "dns")]
pub use system::SystemResolver;

#[cfg(feature = "dns")]
mod system {
    use async_trait::async_trait;
    use hickory_resolver::TokioAsyncResolver;
    use hickory_resolver::error::{ResolveError, ResolveErrorKind};

    use super::SrvResolver;
    use crate::error::{Error, Result};
    use crate::model::HostPort;

    /// Resolver backed by the operating system's DNS configuration.
    pub struct SystemResolver {
        inner: TokioAsyncResolver,
    }

    impl SystemResolver {
        pub fn from_system_conf() -> Result<Self> {
            let inner = TokioAsyncResolver::tokio_from_system_conf()
                .map_err(|e| Error::Config(format!("failed to load resolver configuration: {}", e)))?;
            Ok(Self { inner })
        }
    }

    fn is_empty_answer(err: &ResolveError) -> bool {
        matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. })
    }

    #[async_trait]
    impl SrvResolver for SystemResolver {
        async fn lookup_srv(&self, name: &str) -> std::result::Result<Vec<HostPort>, String> {
            match self.inner.srv_lookup(name).await {
                Ok(lookup) => Ok(lookup
                    .iter()
                    .map(|srv| {
                        let target = srv.target().to_utf8();
                        HostPort::new(target.trim_end_matches('.'), srv.port())
                    })
                    .collect()),
                Err(e) if is_empty_answer(&e) => Ok(Vec::new()),
                Err(e) => Err(e.to_string()),
            }
        }

        async fn lookup_txt(&self, name: &str) -> std::result::Result<Vec<String>, String> {
            match self.inner.txt_lookup(name).await {
                Ok(lookup) => Ok(lookup
                    .iter()
                    .map(|txt| {
                        txt.txt_data()
                            .iter()
                            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                            .collect::<String>()
                    })
                    .collect()),
                Err(e) if is_empty_answer(&e) => Ok(Vec::new()),
                Err(e) => Err(e.to_string()),
            }
        }
    }
}

/// Resolve `host` as an SRV seed and return its TXT record, if any.
///
/// An SRV answer with no targets is an error; the hosts themselves are left
/// for the driver to re-resolve at connect time.
pub(crate) async fn resolve(host: &str, resolver: &dyn SrvResolver) -> Result<Option<String>> {
    let service = format!("_mongodb._tcp.{}", host);
    let targets = resolver
        .lookup_srv(&service)
        .await
        .map_err(|message| Error::dns(host, message))?;
    if targets.is_empty() {
        return Err(Error::dns(host, "no SRV records found"));
    }
    debug!(host = %host, targets = targets.len(), "Resolved SRV records");

    let mut records = resolver
        .lookup_txt(host)
        .await
        .map_err(|message| Error::dns(host, message))?;
    match records.len() {
        0 => Ok(None),
        1 => Ok(records.pop()),
        _ => Err(Error::dns(host, "multiple TXT records found")),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory resolver recording how often it was called.
    #[derive(Default)]
    pub(crate) struct StaticResolver {
        pub srv: Vec<HostPort>,
        pub txt: Vec<String>,
        pub fail: Option<String>,
        pub calls: AtomicUsize,
        pub names: Mutex<Vec<String>>,
    }

    impl StaticResolver {
        pub(crate) fn with_hosts(hosts: &[&str]) -> Self {
            Self {
                srv: hosts.iter().map(|h| HostPort::new(*h, 27017)).collect(),
                ..Default::default()
            }
        }

        pub(crate) fn txt(mut self, record: &str) -> Self {
            self.txt.push(record.to_string());
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SrvResolver for StaticResolver {
        async fn lookup_srv(&self, name: &str) -> std::result::Result<Vec<HostPort>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.names.lock().unwrap().push(name.to_string());
            match &self.fail {
                Some(message) => Err(message.clone()),
                None => Ok(self.srv.clone()),
            }
        }

        async fn lookup_txt(&self, name: &str) -> std::result::Result<Vec<String>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.names.lock().unwrap().push(name.to_string());
            Ok(self.txt.clone())
        }
    }

    #[tokio::test]
    async fn test_resolve_uses_service_name() {
        let resolver = StaticResolver::with_hosts(&["a.example.com"]).txt("replicaSet=rs0");
        let txt = resolve("cluster0.example.com", &resolver).await.unwrap();
        assert_eq!(txt.as_deref(), Some("replicaSet=rs0"));
        assert_eq!(
            resolver.names.lock().unwrap().as_slice(),
            ["_mongodb._tcp.cluster0.example.com", "cluster0.example.com"]
        );
    }

    #[tokio::test]
    async fn test_empty_srv_answer_is_dns_error() {
        let resolver = StaticResolver::default();
        let err = resolve("cluster0.example.com", &resolver).await.unwrap_err();
        assert!(matches!(err, Error::DnsResolution { .. }));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_dns_error() {
        let resolver = StaticResolver {
            fail: Some("NXDOMAIN".into()),
            ..Default::default()
        };
        let err = resolve("missing.example.com", &resolver).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to resolve missing.example.com: NXDOMAIN"
        );
    }

    #[tokio::test]
    async fn test_multiple_txt_records_rejected() {
        let resolver = StaticResolver::with_hosts(&["a.example.com"])
            .txt("replicaSet=rs0")
            .txt("authSource=admin");
        assert!(resolve("cluster0.example.com", &resolver).await.is_err());
    }

    #[tokio::test]
    async fn test_no_resolver_fails() {
        let err = resolve("cluster0.example.com", &NoResolver).await.unwrap_err();
        assert!(matches!(err, Error::DnsResolution { .. }));
    }
}
