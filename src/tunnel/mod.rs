//! SSH tunnel manager.
//!
//! An [`SshTunnel`] authenticates to a jump host, proves the database host is
//! reachable through it, then listens on a local port (loopback unless
//! `SSH_TUNNEL_BIND_ADDRESS` says otherwise). Every connection
//! accepted there is bridged to its own forwarded channel.
//!
//! # State machine
//!
//! ```text
//! Idle -> Connecting -> Forwarding -> Listening -> Closing -> Closed
//!            \______________\_____________\
//!                                          -> Failed
//! ```
//!
//! `open` only returns a tunnel that reached `Listening`. Any failure on the
//! way releases what was acquired so far (session, listener) before the error
//! is returned.

pub mod auth;
mod config;
mod forward;
mod session;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{HostPort, SshTunnelConfig};

use self::forward::SessionForward;
use self::session::Session;

pub use config::TunnelOptions;
pub use session::TunnelClientHandler;

/// Lifecycle of an [`SshTunnel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Idle,
    Connecting,
    Forwarding,
    Listening,
    Closing,
    Closed,
    Failed,
}

impl TunnelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Forwarding => "FORWARDING",
            Self::Listening => "LISTENING",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn transition(state: &watch::Sender<TunnelState>, next: TunnelState) {
    let previous = state.send_replace(next);
    debug!(from = %previous, to = %next, "SSH tunnel state changed");
}

/// Publish `Failed`, release the session and hand back `err`.
async fn fail(
    state: &watch::Sender<TunnelState>,
    session: Option<&dyn Session>,
    err: Error,
) -> Error {
    if let Some(session) = session {
        session.disconnect().await;
    }
    warn!(error = %err, "SSH tunnel failed");
    transition(state, TunnelState::Failed);
    err
}

/// A running SSH tunnel.
///
/// Dropping the tunnel stops the listener; [`SshTunnel::close`] also ends the
/// SSH session.
pub struct SshTunnel {
    local_addr: SocketAddr,
    session: Arc<dyn Session>,
    shutdown: CancellationToken,
    state: watch::Sender<TunnelState>,
    closed: AtomicBool,
}

impl SshTunnel {
    /// Open a tunnel through `config`'s jump host to `target`.
    ///
    /// The local listener binds `options.bind_address` on
    /// `config.bind_to_local_port`, or on a free port when that is unset.
    pub async fn open(
        config: &SshTunnelConfig,
        target: &HostPort,
        options: &TunnelOptions,
    ) -> Result<Self> {
        let (state, _) = watch::channel(TunnelState::Idle);

        transition(&state, TunnelState::Connecting);
        debug!(host = %config.hostname, port = config.port, "Connecting to SSH host");
        let session = match tokio::time::timeout(
            options.ready_timeout,
            session::connect(config, options),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(message)) => {
                return Err(fail(&state, None, Error::TunnelStartup(message)).await);
            }
            Err(_) => {
                let err = Error::TunnelTimeout(options.ready_timeout, "connecting to the SSH host");
                return Err(fail(&state, None, err).await);
            }
        };

        let tunnel = Self::establish(
            Arc::new(session),
            target,
            config.bind_to_local_port,
            options,
            state,
        )
        .await?;
        info!(local_addr = %tunnel.local_addr, ssh_host = %config.hostname, "SSH tunnel listening");
        Ok(tunnel)
    }

    /// Check `target` through an authenticated session, then bind and serve
    /// the local listener. The session is disconnected on any failure.
    async fn establish(
        session: Arc<dyn Session>,
        target: &HostPort,
        bind_port: Option<u16>,
        options: &TunnelOptions,
        state: watch::Sender<TunnelState>,
    ) -> Result<Self> {
        transition(&state, TunnelState::Forwarding);
        match tokio::time::timeout(options.forward_timeout, session.check_reachable(target)).await {
            Ok(Ok(())) => {}
            Ok(Err(message)) => {
                let err = Error::TunnelStartup(message);
                return Err(fail(&state, Some(session.as_ref()), err).await);
            }
            Err(_) => {
                let err =
                    Error::TunnelTimeout(options.forward_timeout, "opening the forwarded channel");
                return Err(fail(&state, Some(session.as_ref()), err).await);
            }
        }

        let bind_addr = SocketAddr::new(options.bind_address, bind_port.unwrap_or(0));
        let bound = match TcpListener::bind(bind_addr).await {
            Ok(listener) => listener.local_addr().map(|addr| (listener, addr)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                let err = Error::TunnelListen {
                    addr: bind_addr,
                    source,
                };
                return Err(fail(&state, Some(session.as_ref()), err).await);
            }
        };

        let shutdown = CancellationToken::new();
        let forward = SessionForward::new(session.clone(), target.clone(), options.forward_timeout);
        tokio::spawn(forward::serve(listener, Arc::new(forward), shutdown.clone()));

        transition(&state, TunnelState::Listening);
        Ok(Self {
            local_addr,
            session,
            shutdown,
            state,
            closed: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn state(&self) -> TunnelState {
        *self.state.borrow()
    }

    /// Watch state changes, e.g. to learn when the tunnel closes.
    pub fn subscribe(&self) -> watch::Receiver<TunnelState> {
        self.state.subscribe()
    }

    /// Stop accepting connections and end the SSH session.
    ///
    /// Idempotent. Connections already bridged are cut when the session ends;
    /// channel opens still in flight do not delay it.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        transition(&self.state, TunnelState::Closing);
        self.shutdown.cancel();
        self.session.disconnect().await;
        transition(&self.state, TunnelState::Closed);
        info!(local_addr = %self.local_addr, "SSH tunnel closed");
    }
}

impl fmt::Debug for SshTunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshTunnel")
            .field("local_addr", &self.local_addr)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
