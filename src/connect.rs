//! Connect orchestrator.
//!
//! A connect attempt is a fixed three-stage pipeline:
//!
//! 1. [`Stage::CreateSshTunnel`] - skipped when the descriptor has no tunnel
//! 2. [`Stage::BuildDriverOptions`]
//! 3. [`Stage::ConnectToMongoDb`] - the driver dials the tunnel's local
//!    address when a tunnel exists, the original seed list otherwise
//!
//! A tunnel opened in stage 1 is closed before any later failure is returned,
//! and again (idempotently) when the connected client reports it has closed.
//! There are no retries here; that policy belongs to the caller.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::driver::{self, DriverOptions};
use crate::error::{BoxError, Error, Result};
use crate::model::{ConnectionDescriptor, HostPort, SshTunnelConfig};
use crate::tunnel::{SshTunnel, TunnelOptions};

/// What the driver is asked to connect to.
#[derive(Clone)]
pub struct DriverTarget {
    /// Connection string, including credentials.
    pub url: String,
    pub options: DriverOptions,
}

impl fmt::Debug for DriverTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverTarget")
            .field("url", &"****")
            .field("options", &self.options)
            .finish()
    }
}

/// A connected client plus an optional signal fired when it closes.
pub struct DriverSession<C> {
    pub client: C,
    /// Resolves (or is dropped) when the client's connection closes.
    pub closed: Option<oneshot::Receiver<()>>,
}

impl<C> DriverSession<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            closed: None,
        }
    }

    pub fn with_close_signal(mut self, closed: oneshot::Receiver<()>) -> Self {
        self.closed = Some(closed);
        self
    }
}

/// The database client library.
#[async_trait]
pub trait Driver: Send + Sync {
    type Client: Send;

    /// Make exactly one connection attempt.
    async fn connect(
        &self,
        target: &DriverTarget,
    ) -> std::result::Result<DriverSession<Self::Client>, BoxError>;
}

/// The externally observable surface of a tunnel.
#[async_trait]
pub trait Tunnel: Send + Sync + 'static {
    fn local_addr(&self) -> SocketAddr;

    fn local_port(&self) -> u16 {
        self.local_addr().port()
    }

    /// Idempotent.
    async fn close(&self);
}

#[async_trait]
impl Tunnel for SshTunnel {
    fn local_addr(&self) -> SocketAddr {
        SshTunnel::local_addr(self)
    }

    async fn close(&self) {
        SshTunnel::close(self).await
    }
}

/// Opens the tunnel for stage 1.
#[async_trait]
pub trait TunnelOpener: Send + Sync {
    type Tunnel: Tunnel;

    async fn open(&self, config: &SshTunnelConfig, target: &HostPort) -> Result<Self::Tunnel>;
}

/// Opens real [`SshTunnel`]s.
#[derive(Debug, Clone, Default)]
pub struct SshTunnelOpener {
    options: TunnelOptions,
}

impl SshTunnelOpener {
    pub fn new(options: TunnelOptions) -> Self {
        Self { options }
    }

    /// Timing options from `SSH_TUNNEL_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(TunnelOptions::from_env())
    }
}

#[async_trait]
impl TunnelOpener for SshTunnelOpener {
    type Tunnel = SshTunnel;

    async fn open(&self, config: &SshTunnelConfig, target: &HostPort) -> Result<SshTunnel> {
        SshTunnel::open(config, target, &self.options).await
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CreateSshTunnel,
    BuildDriverOptions,
    ConnectToMongoDb,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateSshTunnel => "Create SSH Tunnel",
            Self::BuildDriverOptions => "Build Driver Options",
            Self::ConnectToMongoDb => "Connect to MongoDB",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Skipped,
    Complete,
    Error,
}

/// Receives stage transitions as they happen.
pub trait ProgressListener: Send + Sync {
    fn on_stage(&self, stage: Stage, status: StageStatus);
}

impl<F> ProgressListener for F
where
    F: Fn(Stage, StageStatus) + Send + Sync,
{
    fn on_stage(&self, stage: Stage, status: StageStatus) {
        self(stage, status)
    }
}

/// A live client and the tunnel it rides, if any.
pub struct Connection<C, T: Tunnel> {
    pub client: C,
    pub target: DriverTarget,
    tunnel: Option<Arc<T>>,
}

impl<C, T: Tunnel> Connection<C, T> {
    pub fn tunnel(&self) -> Option<&T> {
        self.tunnel.as_deref()
    }

    /// Close the tunnel, if any. The client is the caller's to shut down.
    pub async fn close_tunnel(&self) {
        if let Some(tunnel) = &self.tunnel {
            tunnel.close().await;
        }
    }
}

/// Runs connect attempts for one driver.
pub struct Connector<D, O = SshTunnelOpener> {
    driver: D,
    opener: O,
    progress: Option<Arc<dyn ProgressListener>>,
}

impl<D: Driver> Connector<D> {
    /// Connector with tunnel timings taken from the environment.
    pub fn new(driver: D) -> Self {
        Self::with_opener(driver, SshTunnelOpener::from_env())
    }
}

impl<D: Driver, O: TunnelOpener> Connector<D, O> {
    pub fn with_opener(driver: D, opener: O) -> Self {
        Self {
            driver,
            opener,
            progress: None,
        }
    }

    pub fn with_progress(mut self, listener: impl ProgressListener + 'static) -> Self {
        self.progress = Some(Arc::new(listener));
        self
    }

    fn report(&self, stage: Stage, status: StageStatus) {
        debug!(stage = stage.as_str(), ?status, "Connect stage");
        if let Some(progress) = &self.progress {
            progress.on_stage(stage, status);
        }
    }

    async fn rollback(tunnel: Option<&Arc<O::Tunnel>>) {
        if let Some(tunnel) = tunnel {
            debug!(local_addr = %tunnel.local_addr(), "Closing SSH tunnel after failed connect");
            tunnel.close().await;
        }
    }

    /// Run one connect attempt for `descriptor`.
    ///
    /// The descriptor is validated first. Errors come back unchanged from the
    /// stage that produced them; driver failures are wrapped in
    /// [`Error::Connect`].
    pub async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Connection<D::Client, O::Tunnel>> {
        descriptor.validate()?;

        let tunnel = match &descriptor.ssh_tunnel {
            None => {
                self.report(Stage::CreateSshTunnel, StageStatus::Skipped);
                None
            }
            Some(config) => {
                self.report(Stage::CreateSshTunnel, StageStatus::Pending);
                let target = descriptor.hosts.first().cloned().unwrap_or_default();
                match self.opener.open(config, &target).await {
                    Ok(tunnel) => {
                        self.report(Stage::CreateSshTunnel, StageStatus::Complete);
                        Some(Arc::new(tunnel))
                    }
                    Err(e) => {
                        self.report(Stage::CreateSshTunnel, StageStatus::Error);
                        return Err(e);
                    }
                }
            }
        };

        self.report(Stage::BuildDriverOptions, StageStatus::Pending);
        let options = match driver::build(descriptor).await {
            Ok(options) => {
                self.report(Stage::BuildDriverOptions, StageStatus::Complete);
                options
            }
            Err(e) => {
                self.report(Stage::BuildDriverOptions, StageStatus::Error);
                Self::rollback(tunnel.as_ref()).await;
                return Err(e);
            }
        };

        let url = match &tunnel {
            Some(tunnel) => descriptor.driver_url_with_tunnel(tunnel.local_addr()),
            None => descriptor.driver_url(),
        };
        let target = DriverTarget { url, options };

        self.report(Stage::ConnectToMongoDb, StageStatus::Pending);
        let session = match self.driver.connect(&target).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Driver connect failed: {}", e);
                self.report(Stage::ConnectToMongoDb, StageStatus::Error);
                Self::rollback(tunnel.as_ref()).await;
                return Err(Error::connect(e));
            }
        };
        self.report(Stage::ConnectToMongoDb, StageStatus::Complete);

        let DriverSession { client, closed } = session;
        if let (Some(tunnel), Some(closed)) = (&tunnel, closed) {
            let tunnel = tunnel.clone();
            tokio::spawn(async move {
                let _ = closed.await;
                debug!("Client closed, shutting down SSH tunnel");
                tunnel.close().await;
            });
        }

        info!(tunnelled = tunnel.is_some(), "Connected");
        Ok(Connection {
            client,
            target,
            tunnel,
        })
    }
}
