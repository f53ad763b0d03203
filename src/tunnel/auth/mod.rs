//! Authentication strategies for the tunnel's SSH session.
//!
//! - [`PasswordAuth`]: `USER_PASSWORD` tunnels
//! - [`KeyAuth`]: `IDENTITY_FILE` tunnels, with an optional passphrase

mod key;
mod password;
mod traits;

pub use key::KeyAuth;
pub use password::PasswordAuth;
pub use traits::AuthStrategy;

use crate::model::SshTunnelAuth;

/// Strategy for the configured tunnel credential.
pub fn for_credential(auth: &SshTunnelAuth) -> Box<dyn AuthStrategy> {
    match auth {
        SshTunnelAuth::Password(password) => Box::new(PasswordAuth::new(password.clone())),
        SshTunnelAuth::IdentityFile { path, passphrase } => {
            Box::new(KeyAuth::new(path.clone(), passphrase.clone()))
        }
    }
}
