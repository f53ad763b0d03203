//! Local listener that bridges each accepted connection to its own
//! `direct-tcpip` channel (RFC 4254) on the tunnel session.
//!
//! Data flows in both directions with `tokio::io::copy`; `tokio::select!`
//! ends the bridge as soon as either side closes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::model::HostPort;

use super::session::Session;

/// Byte stream carrying one forwarded connection.
pub(crate) trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Duplex for T {}

/// Opens the remote end of a forwarded connection.
#[async_trait]
pub(crate) trait ForwardTarget: Send + Sync + 'static {
    async fn open(&self) -> Result<Box<dyn Duplex>, String>;
}

/// Channels to `target` over a shared session, each open bounded by `timeout`.
pub(crate) struct SessionForward {
    session: Arc<dyn Session>,
    target: HostPort,
    timeout: Duration,
}

impl SessionForward {
    pub(crate) fn new(session: Arc<dyn Session>, target: HostPort, timeout: Duration) -> Self {
        Self {
            session,
            target,
            timeout,
        }
    }
}

#[async_trait]
impl ForwardTarget for SessionForward {
    async fn open(&self) -> Result<Box<dyn Duplex>, String> {
        match tokio::time::timeout(self.timeout, self.session.open_channel(&self.target)).await {
            Ok(result) => result,
            Err(_) => Err(format!(
                "timed out after {:?} opening a channel to {}",
                self.timeout, self.target
            )),
        }
    }
}

/// Accept connections until `shutdown` fires, one bridging task per connection.
///
/// Bridges already running are left to drain on their own.
pub(crate) async fn serve<T: ForwardTarget>(
    listener: TcpListener,
    target: Arc<T>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Forwarding listener stopped");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((local_stream, peer)) => {
                    debug!(%peer, "Accepted forwarded connection");
                    let target = target.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge(local_stream, target.as_ref()).await {
                            debug!(%peer, "Forwarded connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    break;
                }
            }
        }
    }
}

async fn bridge<T: ForwardTarget>(local_stream: TcpStream, target: &T) -> Result<(), String> {
    let remote_stream = target.open().await?;

    let (mut local_read, mut local_write) = tokio::io::split(local_stream);
    let (mut remote_read, mut remote_write) = tokio::io::split(remote_stream);

    let local_to_remote = tokio::io::copy(&mut local_read, &mut remote_write);
    let remote_to_local = tokio::io::copy(&mut remote_read, &mut local_write);

    tokio::select! {
        result = local_to_remote => {
            if let Err(e) = result {
                debug!("Local to remote copy ended: {}", e);
            }
        }
        result = remote_to_local => {
            if let Err(e) = result {
                debug!("Remote to local copy ended: {}", e);
            }
        }
    }

    debug!("Forwarded connection closed");
    Ok(())
}
