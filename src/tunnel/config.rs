//! Tunnel timing configuration.
//!
//! Each value comes from its environment variable, falling back to a built-in
//! default when the variable is unset or unparseable.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SSH_TUNNEL_READY_TIMEOUT` | 20s | SSH connect, handshake and authentication |
//! | `SSH_TUNNEL_FORWARD_TIMEOUT` | 10s | Opening each forwarded channel |
//! | `SSH_TUNNEL_KEEPALIVE` | 30s | SSH keepalive interval |
//! | `SSH_TUNNEL_COMPRESSION` | false | Request zlib on the SSH transport |
//! | `SSH_TUNNEL_BIND_ADDRESS` | 127.0.0.1 | Address of the local listener |

use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use russh::client;
use tracing::warn;

pub(crate) const DEFAULT_READY_TIMEOUT_SECS: u64 = 20;

pub(crate) const DEFAULT_FORWARD_TIMEOUT_SECS: u64 = 10;

pub(crate) const DEFAULT_KEEPALIVE_SECS: u64 = 30;

pub(crate) const DEFAULT_COMPRESSION: bool = false;

pub(crate) const DEFAULT_BIND_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Keepalives left unanswered before the session is considered dead.
const KEEPALIVE_MAX: usize = 3;

pub(crate) const READY_TIMEOUT_ENV_VAR: &str = "SSH_TUNNEL_READY_TIMEOUT";

pub(crate) const FORWARD_TIMEOUT_ENV_VAR: &str = "SSH_TUNNEL_FORWARD_TIMEOUT";

pub(crate) const KEEPALIVE_ENV_VAR: &str = "SSH_TUNNEL_KEEPALIVE";

pub(crate) const COMPRESSION_ENV_VAR: &str = "SSH_TUNNEL_COMPRESSION";

pub(crate) const BIND_ADDRESS_ENV_VAR: &str = "SSH_TUNNEL_BIND_ADDRESS";

fn resolve_secs(var: &str, default: u64) -> u64 {
    if let Ok(value) = env::var(var)
        && let Ok(secs) = value.parse::<u64>()
    {
        return secs;
    }

    default
}

/// Resolve the SSH ready timeout with priority: env var -> default
pub(crate) fn resolve_ready_timeout() -> u64 {
    resolve_secs(READY_TIMEOUT_ENV_VAR, DEFAULT_READY_TIMEOUT_SECS)
}

/// Resolve the forwarded-channel timeout with priority: env var -> default
pub(crate) fn resolve_forward_timeout() -> u64 {
    resolve_secs(FORWARD_TIMEOUT_ENV_VAR, DEFAULT_FORWARD_TIMEOUT_SECS)
}

/// Resolve the keepalive interval with priority: env var -> default
pub(crate) fn resolve_keepalive() -> u64 {
    resolve_secs(KEEPALIVE_ENV_VAR, DEFAULT_KEEPALIVE_SECS)
}

/// Resolve compression with priority: env var -> default.
///
/// The environment value enables compression only for `true` (any case) or `1`.
pub(crate) fn resolve_compression() -> bool {
    if let Ok(value) = env::var(COMPRESSION_ENV_VAR) {
        return value.eq_ignore_ascii_case("true") || value == "1";
    }

    DEFAULT_COMPRESSION
}

/// Resolve the listener address with priority: env var -> default
pub(crate) fn resolve_bind_address() -> IpAddr {
    if let Ok(value) = env::var(BIND_ADDRESS_ENV_VAR) {
        match value.trim().parse::<IpAddr>() {
            Ok(addr) => return addr,
            Err(_) => warn!(value = %value, "Ignoring invalid {}", BIND_ADDRESS_ENV_VAR),
        }
    }

    DEFAULT_BIND_ADDRESS
}

/// Timing and transport options for one tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelOptions {
    /// Bound on SSH connect, handshake and authentication.
    pub ready_timeout: Duration,
    /// Bound on opening a forwarded channel, both the startup check and
    /// every accepted connection.
    pub forward_timeout: Duration,
    pub keepalive_interval: Duration,
    pub compress: bool,
    /// Local address the listener binds.
    pub bind_address: IpAddr,
}

impl TunnelOptions {
    /// Options from the environment, falling back to built-in defaults.
    pub fn from_env() -> Self {
        Self {
            ready_timeout: Duration::from_secs(resolve_ready_timeout()),
            forward_timeout: Duration::from_secs(resolve_forward_timeout()),
            keepalive_interval: Duration::from_secs(resolve_keepalive()),
            compress: resolve_compression(),
            bind_address: resolve_bind_address(),
        }
    }
}

impl Default for TunnelOptions {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(DEFAULT_READY_TIMEOUT_SECS),
            forward_timeout: Duration::from_secs(DEFAULT_FORWARD_TIMEOUT_SECS),
            keepalive_interval: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            compress: DEFAULT_COMPRESSION,
            bind_address: DEFAULT_BIND_ADDRESS,
        }
    }
}

/// SSH client configuration for a tunnel session.
///
/// The session has no inactivity timeout: it lives exactly as long as the
/// tunnel does, and keepalives detect a dead jump host.
pub(crate) fn build_client_config(options: &TunnelOptions) -> Arc<client::Config> {
    let compression = if options.compress {
        (&[russh::compression::ZLIB, russh::compression::NONE][..]).into()
    } else {
        (&[russh::compression::NONE][..]).into()
    };

    let preferred = russh::Preferred {
        compression,
        ..Default::default()
    };

    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(options.keepalive_interval),
        keepalive_max: KEEPALIVE_MAX,
        preferred,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex as StdMutex;

    /// Serializes tests that touch process-wide environment variables.
    static ENV_TEST_MUTEX: Lazy<StdMutex<()>> = Lazy::new(|| StdMutex::new(()));

    /// # Safety
    /// Caller must hold `ENV_TEST_MUTEX`.
    unsafe fn set_env(key: &str, value: &str) {
        unsafe { env::set_var(key, value) };
    }

    /// # Safety
    /// Caller must hold `ENV_TEST_MUTEX`.
    unsafe fn remove_env(key: &str) {
        unsafe { env::remove_var(key) };
    }

    mod ready_timeout {
        use super::*;

        #[test]
        fn test_uses_env_var() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(READY_TIMEOUT_ENV_VAR, "45");
            }
            let result = resolve_ready_timeout();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(READY_TIMEOUT_ENV_VAR);
            }
            assert_eq!(result, 45);
        }

        #[test]
        fn test_ignores_invalid_env_var() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(READY_TIMEOUT_ENV_VAR, "-3");
            }
            let result = resolve_ready_timeout();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(READY_TIMEOUT_ENV_VAR);
            }
            assert_eq!(result, DEFAULT_READY_TIMEOUT_SECS);
        }
    }

    mod forward_timeout {
        use super::*;

        #[test]
        fn test_uses_default_when_env_unset() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(FORWARD_TIMEOUT_ENV_VAR);
            }
            assert_eq!(resolve_forward_timeout(), DEFAULT_FORWARD_TIMEOUT_SECS);
        }

        #[test]
        fn test_uses_env_var() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(FORWARD_TIMEOUT_ENV_VAR, "3");
            }
            let result = resolve_forward_timeout();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(FORWARD_TIMEOUT_ENV_VAR);
            }
            assert_eq!(result, 3);
        }
    }

    mod keepalive {
        use super::*;

        #[test]
        fn test_ignores_non_numeric_env_var() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(KEEPALIVE_ENV_VAR, "often");
            }
            let result = resolve_keepalive();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(KEEPALIVE_ENV_VAR);
            }
            assert_eq!(result, DEFAULT_KEEPALIVE_SECS);
        }
    }

    mod compression {
        use super::*;

        #[test]
        fn test_env_var_mixed_case_true() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(COMPRESSION_ENV_VAR, "TrUe");
            }
            let result = resolve_compression();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(COMPRESSION_ENV_VAR);
            }
            assert!(result);
        }

        #[test]
        fn test_env_var_one() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(COMPRESSION_ENV_VAR, "1");
            }
            let result = resolve_compression();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(COMPRESSION_ENV_VAR);
            }
            assert!(result);
        }

        #[test]
        fn test_env_var_random_value_is_false() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(COMPRESSION_ENV_VAR, "yes");
            }
            let result = resolve_compression();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(COMPRESSION_ENV_VAR);
            }
            assert!(!result);
        }

        #[test]
        fn test_default_is_off() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(COMPRESSION_ENV_VAR);
            }
            assert!(!resolve_compression());
        }
    }

    mod bind_address {
        use super::*;

        #[test]
        fn test_defaults_to_loopback() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(BIND_ADDRESS_ENV_VAR);
            }
            assert_eq!(resolve_bind_address(), DEFAULT_BIND_ADDRESS);
        }

        #[test]
        fn test_uses_env_var() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(BIND_ADDRESS_ENV_VAR, "::1");
            }
            let result = resolve_bind_address();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(BIND_ADDRESS_ENV_VAR);
            }
            assert_eq!(result, "::1".parse::<IpAddr>().unwrap());
        }

        #[test]
        fn test_ignores_invalid_env_var() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(BIND_ADDRESS_ENV_VAR, "localhost:9");
            }
            let result = resolve_bind_address();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(BIND_ADDRESS_ENV_VAR);
            }
            assert_eq!(result, DEFAULT_BIND_ADDRESS);
        }
    }

    mod options {
        use super::*;

        #[test]
        fn test_from_env_reads_every_variable() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(READY_TIMEOUT_ENV_VAR, "2");
                set_env(FORWARD_TIMEOUT_ENV_VAR, "1");
                set_env(KEEPALIVE_ENV_VAR, "15");
                set_env(COMPRESSION_ENV_VAR, "1");
                set_env(BIND_ADDRESS_ENV_VAR, "0.0.0.0");
            }
            let options = TunnelOptions::from_env();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(READY_TIMEOUT_ENV_VAR);
                remove_env(FORWARD_TIMEOUT_ENV_VAR);
                remove_env(KEEPALIVE_ENV_VAR);
                remove_env(COMPRESSION_ENV_VAR);
                remove_env(BIND_ADDRESS_ENV_VAR);
            }
            assert_eq!(
                options,
                TunnelOptions {
                    ready_timeout: Duration::from_secs(2),
                    forward_timeout: Duration::from_secs(1),
                    keepalive_interval: Duration::from_secs(15),
                    compress: true,
                    bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                }
            );
        }

        #[test]
        fn test_client_config_has_no_inactivity_timeout() {
            let options = TunnelOptions {
                keepalive_interval: Duration::from_secs(12),
                ..Default::default()
            };
            let config = build_client_config(&options);
            assert_eq!(config.inactivity_timeout, None);
            assert_eq!(config.keepalive_interval, Some(Duration::from_secs(12)));
            assert_eq!(config.keepalive_max, KEEPALIVE_MAX);
        }
    }
}
