use std::net::SocketAddr;

use subtle::ConstantTimeEq;
use thiserror::Error;

/// Decides whether a connecting session may run a command.
pub trait Authenticator: Send + Sync {
    fn authorize(
        &self,
        peer: SocketAddr,
        credential: Option<&str>,
    ) -> Result<(), AuthError>;

    /// Whether sessions must present a credential at all.
    fn requires_credential(&self) -> bool { true }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("an auth token is required")]
    MissingCredential,
    #[error("invalid auth token")]
    InvalidCredential,
}

/// Accepts every session.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn authorize(
        &self,
        _peer: SocketAddr,
        _credential: Option<&str>,
    ) -> Result<(), AuthError> {
        Ok(())
    }

    fn requires_credential(&self) -> bool { false }
}

/// Requires the session to present one shared token.
pub struct SharedToken {
    token: String,
}

impl SharedToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl Authenticator for SharedToken {
    fn authorize(
        &self,
        _peer: SocketAddr,
        credential: Option<&str>,
    ) -> Result<(), AuthError> {
        let given = credential.ok_or(AuthError::MissingCredential)?;
        if bool::from(given.as_bytes().ct_eq(self.token.as_bytes())) {
            Ok(())
        } else {
            Err(AuthError::InvalidCredential)
        }
    }
}
