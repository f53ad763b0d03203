//! Identity file authentication to the jump host.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use russh::{client, keys};
use tracing::debug;

use crate::model::Secret;
use crate::tunnel::session::TunnelClientHandler;

use super::traits::AuthStrategy;

/// Public key authentication with a private key read from disk.
///
/// Encrypted keys are decrypted with the configured passphrase.
pub struct KeyAuth {
    key_path: PathBuf,
    passphrase: Option<Secret>,
}

impl KeyAuth {
    pub fn new(key_path: impl Into<PathBuf>, passphrase: Option<Secret>) -> Self {
        Self {
            key_path: key_path.into(),
            passphrase,
        }
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<TunnelClientHandler>,
        username: &str,
    ) -> Result<bool, String> {
        let passphrase = self.passphrase.as_ref().map(Secret::expose);
        let key_pair = keys::load_secret_key(&self.key_path, passphrase).map_err(|e| {
            format!(
                "failed to load private key from {}: {}",
                self.key_path.display(),
                e
            )
        })?;

        // RSA keys sign with the strongest hash the server advertises.
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!("Using RSA hash algorithm for key auth: {:?}", hash_alg);

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg);

        let result = handle
            .authenticate_publickey(username, key_with_hash)
            .await
            .map_err(|e| format!("key authentication failed: {}", e))?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "key"
    }
}
