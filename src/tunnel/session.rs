//! SSH session to the jump host.
//!
//! [`TunnelClientHandler`] accepts every host key, like
//! `StrictHostKeyChecking=no` in OpenSSH.

use async_trait::async_trait;
use russh::{Channel, Disconnect, client, keys};
use tracing::{debug, warn};

use crate::model::{HostPort, SshTunnelConfig};

use super::auth;
use super::config::{TunnelOptions, build_client_config};
use super::forward::Duplex;

/// russh client handler for tunnel sessions.
pub struct TunnelClientHandler;

impl client::Handler for TunnelClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// What a tunnel needs from an authenticated session.
///
/// Every method takes `&self`; channel opens and teardown may run
/// concurrently from different tasks.
#[async_trait]
pub(crate) trait Session: Send + Sync + 'static {
    /// Open a forwarded channel to `target`.
    async fn open_channel(&self, target: &HostPort) -> Result<Box<dyn Duplex>, String>;

    /// Open and release one channel to check that `target` is reachable.
    async fn check_reachable(&self, target: &HostPort) -> Result<(), String> {
        self.open_channel(target).await.map(drop)
    }

    /// End the session. Must not fail when the peer is already gone.
    async fn disconnect(&self);
}

/// Session backed by a russh client handle.
pub(crate) struct SshSession {
    handle: client::Handle<TunnelClientHandler>,
}

impl SshSession {
    pub(crate) fn new(handle: client::Handle<TunnelClientHandler>) -> Self {
        Self { handle }
    }

    async fn direct_tcpip(&self, target: &HostPort) -> Result<Channel<client::Msg>, String> {
        self.handle
            .channel_open_direct_tcpip(target.host.as_str(), u32::from(target.port), "127.0.0.1", 0)
            .await
            .map_err(|e| format!("failed to open forwarded channel to {}: {}", target, e))
    }
}

#[async_trait]
impl Session for SshSession {
    async fn open_channel(&self, target: &HostPort) -> Result<Box<dyn Duplex>, String> {
        let channel = self.direct_tcpip(target).await?;
        Ok(Box::new(channel.into_stream()))
    }

    async fn check_reachable(&self, target: &HostPort) -> Result<(), String> {
        let channel = self.direct_tcpip(target).await?;
        if let Err(e) = channel.close().await {
            debug!("Closing reachability channel failed: {}", e);
        }
        Ok(())
    }

    async fn disconnect(&self) {
        disconnect(&self.handle).await;
    }
}

/// End a session, logging rather than failing when the peer is already gone.
async fn disconnect(handle: &client::Handle<TunnelClientHandler>) {
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "tunnel closed", "en")
        .await
    {
        debug!("SSH disconnect failed: {}", e);
    }
}

/// Open an authenticated session to the jump host.
///
/// Errors are plain messages; the caller maps them onto the tunnel error
/// variants. A rejected credential disconnects before returning.
pub(crate) async fn connect(
    config: &SshTunnelConfig,
    options: &TunnelOptions,
) -> Result<SshSession, String> {
    let client_config = build_client_config(options);
    let address = (config.hostname.as_str(), config.port);

    let mut handle = client::connect(client_config, address, TunnelClientHandler)
        .await
        .map_err(|e| {
            format!(
                "failed to connect to {}:{}: {}",
                config.hostname, config.port, e
            )
        })?;
    debug!(host = %config.hostname, port = config.port, "SSH transport established");

    let strategy = auth::for_credential(&config.auth);
    match strategy.authenticate(&mut handle, &config.username).await {
        Ok(true) => {
            debug!(username = %config.username, method = %config.method(), "SSH authenticated");
            Ok(SshSession::new(handle))
        }
        Ok(false) => {
            disconnect(&handle).await;
            Err(format!(
                "{} authentication rejected for {}",
                strategy.name(),
                config.username
            ))
        }
        Err(e) => {
            warn!(username = %config.username, "SSH authentication failed: {}", e);
            disconnect(&handle).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<TunnelClientHandler>();
    }

    #[test]
    fn test_ssh_session_is_shareable() {
        fn assert_session<T: Session>() {}
        assert_session::<SshSession>();
    }
}
