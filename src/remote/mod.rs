//! Remote session bridge.
//!
//! Each inbound TCP connection carries one command line plus its input and
//! is dispatched exactly like a local invocation, concurrently with other
//! sessions. See [`protocol`] for the wire format.

mod auth;
mod client;
pub mod protocol;
mod server;
mod session;

use std::{fmt, io, net::SocketAddr, sync::Arc, time::Duration};

pub use auth::{AllowAll, AuthError, Authenticator, SharedToken};
pub use client::{SessionOutput, connect, run_session};
pub use server::{Bridge, serve};
use thiserror::Error;

use crate::cmd::mode::ListenRequest;

pub const DEFAULT_PORT: u16 = 2222;
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_SESSIONS: usize = 64;

/// Listener settings with defaults applied.
#[derive(Clone)]
pub struct BridgeConfig {
    pub addr: SocketAddr,
    /// `None` lets sessions run without a deadline.
    pub session_timeout: Option<Duration>,
    pub max_sessions: usize,
    pub authenticator: Arc<dyn Authenticator>,
}

impl BridgeConfig {
    /// Apply defaults to the options given on the command line.
    ///
    /// An explicit `--auth-token` wins over `env_token`; with neither, every
    /// session is accepted.
    pub fn from_request(
        request: ListenRequest,
        env_token: Option<String>,
    ) -> Self {
        let addr = request
            .addr
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)));
        let session_timeout = match request.session_timeout {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(DEFAULT_SESSION_TIMEOUT),
        };
        let max_sessions =
            request.max_sessions.unwrap_or(DEFAULT_MAX_SESSIONS).max(1);
        let authenticator: Arc<dyn Authenticator> = match request
            .auth_token
            .or(env_token)
            .filter(|token| !token.is_empty())
        {
            Some(token) => Arc::new(SharedToken::new(token)),
            None => Arc::new(AllowAll),
        };
        Self {
            addr,
            session_timeout,
            max_sessions,
            authenticator,
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("addr", &self.addr)
            .field("session_timeout", &self.session_timeout)
            .field("max_sessions", &self.max_sessions)
            .field(
                "requires_credential",
                &self.authenticator.requires_credential(),
            )
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session I/O failed")]
    Io(#[from] io::Error),
    #[error("session did not send a command line")]
    MissingCommand,
    #[error("command line exceeds {0} bytes")]
    CommandTooLong(usize),
    #[error("session input exceeds {0} bytes")]
    InputTooLarge(u64),
    #[error("command line is not valid UTF-8")]
    Utf8,
    #[error("command line and credential must each be a single line")]
    InvalidCommand,
    #[error("session rejected: {0}")]
    Rejected(#[from] AuthError),
    #[error("session timed out")]
    TimedOut,
    #[error("session worker failed")]
    Worker(#[from] tokio::task::JoinError),
    #[error("protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BridgeConfig::from_request(ListenRequest::default(), None);
        assert_eq!(config.addr.port(), DEFAULT_PORT);
        assert_eq!(config.session_timeout, Some(DEFAULT_SESSION_TIMEOUT));
        assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
        assert!(!config.authenticator.requires_credential());
    }

    #[test]
    fn zero_timeout_disables_the_deadline() {
        let config = BridgeConfig::from_request(
            ListenRequest {
                session_timeout: Some(0),
                max_sessions: Some(0),
                ..ListenRequest::default()
            },
            None,
        );
        assert_eq!(config.session_timeout, None);
        assert_eq!(config.max_sessions, 1);
    }

    #[test]
    fn token_from_flag_or_environment() {
        let peer = SocketAddr::from(([127, 0, 0, 1], 9));
        let config = BridgeConfig::from_request(
            ListenRequest {
                auth_token: Some("flag".to_owned()),
                ..ListenRequest::default()
            },
            Some("env".to_owned()),
        );
        assert!(config.authenticator.authorize(peer, Some("flag")).is_ok());
        assert!(config.authenticator.authorize(peer, Some("env")).is_err());

        let config = BridgeConfig::from_request(
            ListenRequest::default(),
            Some("env".to_owned()),
        );
        assert!(config.authenticator.authorize(peer, Some("env")).is_ok());
        assert!(config.authenticator.authorize(peer, None).is_err());

        let config = BridgeConfig::from_request(
            ListenRequest::default(),
            Some(String::new()),
        );
        assert!(config.authenticator.authorize(peer, None).is_ok());
    }
}
