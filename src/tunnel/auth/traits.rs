//! Authentication strategy trait.

use async_trait::async_trait;
use russh::client;

use crate::tunnel::session::TunnelClientHandler;

/// One way of authenticating a tunnel session to the jump host.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Attempt to authenticate.
    ///
    /// * `Ok(true)` - accepted
    /// * `Ok(false)` - credential rejected by the server
    /// * `Err(message)` - the attempt itself failed; the message never
    ///   contains the credential
    async fn authenticate(
        &self,
        handle: &mut client::Handle<TunnelClientHandler>,
        username: &str,
    ) -> Result<bool, String>;

    /// Strategy name for logging.
    fn name(&self) -> &'static str;
}
