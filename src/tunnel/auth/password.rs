//! Password authentication to the jump host.

use async_trait::async_trait;
use russh::client;

use crate::model::Secret;
use crate::tunnel::session::TunnelClientHandler;

use super::traits::AuthStrategy;

pub struct PasswordAuth {
    password: Secret,
}

impl PasswordAuth {
    pub fn new(password: impl Into<Secret>) -> Self {
        Self {
            password: password.into(),
        }
    }
}

#[async_trait]
impl AuthStrategy for PasswordAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<TunnelClientHandler>,
        username: &str,
    ) -> Result<bool, String> {
        let result = handle
            .authenticate_password(username, self.password.expose())
            .await
            .map_err(|e| format!("password authentication failed: {}", e))?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "password"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_auth_name() {
        assert_eq!(PasswordAuth::new("secret").name(), "password");
    }

    #[test]
    fn test_password_auth_keeps_value() {
        let auth = PasswordAuth::new(String::from("my-password"));
        assert_eq!(auth.password.expose(), "my-password");
    }
}
