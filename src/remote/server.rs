use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, runtime::Runtime, sync::Semaphore};
use tracing::{debug, error, info, warn};

use super::{
    BridgeConfig,
    session::{self, Shared},
};
use crate::cmd::router::Dispatcher;

/// Accepts sessions and runs each one as an independent invocation.
pub struct Bridge {
    shared: Arc<Shared>,
    limiter: Arc<Semaphore>,
}

impl Bridge {
    pub fn new(config: &BridgeConfig, dispatcher: Dispatcher) -> Self {
        Self {
            shared: Arc::new(Shared {
                dispatcher,
                authenticator: Arc::clone(&config.authenticator),
                session_timeout: config.session_timeout,
            }),
            limiter: Arc::new(Semaphore::new(config.max_sessions)),
        }
    }

    /// Accept connections until the listener fails permanently.
    ///
    /// A failing session never stops the loop; once `max_sessions` are in
    /// flight, new connections wait in the listen backlog.
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        loop {
            let permit = Arc::clone(&self.limiter)
                .acquire_owned()
                .await
                .context("session limiter closed")?;
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        session::handle(stream, peer, shared).await;
                        drop(permit);
                    });
                }
                Err(err) => {
                    error!(error = %err, "failed to accept connection");
                }
            }
        }
    }
}

/// Bind `config.addr` and serve sessions until the process is stopped.
pub fn serve(config: BridgeConfig, dispatcher: Dispatcher) -> Result<()> {
    let runtime = Runtime::new()?;
    runtime.block_on(async move {
        let listener = TcpListener::bind(config.addr)
            .await
            .with_context(|| format!("Failed to listen on {}", config.addr))?;
        let local = listener.local_addr()?;
        if !config.authenticator.requires_credential() {
            warn!(
                %local,
                "no auth token configured; any client that can connect may \
                 use the store's identities"
            );
        }
        info!(
            %local,
            max_sessions = config.max_sessions,
            timeout = ?config.session_timeout,
            "listening for sessions"
        );
        println!("Listening on {local}");
        Bridge::new(&config, dispatcher).run(listener).await
    })
}
