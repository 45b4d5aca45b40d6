use std::{fmt, sync::Arc};

use clap::CommandFactory;
use tracing::debug;

use super::{
    Cli,
    list_keys::{self, ListError},
    mode::{ConfigError, ListRequest, Mode, SignRequest, VerifyRequest},
    sign::{self, SignError},
    streams::Streams,
    verify::{self, VerifyError},
};
use crate::{
    error::Error,
    store::{Identities, IdentityProvider, StoreError},
    tsa::{HttpTimestampAuthority, TimestampAuthority},
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Streams plus the identities loaded for one invocation.
///
/// A context is built per dispatch and never shared between invocations.
pub struct InvocationContext<'a> {
    pub streams: Streams<'a>,
    pub identities: Identities,
}

/// The signing, verification and listing collaborators.
pub trait Operations: Send + Sync {
    fn sign(
        &self,
        request: &SignRequest,
        ctx: &mut InvocationContext<'_>,
    ) -> Result<(), SignError>;

    fn verify(
        &self,
        request: &VerifyRequest,
        ctx: &mut InvocationContext<'_>,
    ) -> Result<(), VerifyError>;

    fn list_keys(
        &self,
        request: &ListRequest,
        ctx: &mut InvocationContext<'_>,
    ) -> Result<(), ListError>;
}

/// The collaborators shipped with certsign.
pub struct BuiltinOperations {
    timestamp: Arc<dyn TimestampAuthority>,
}

impl BuiltinOperations {
    pub fn new(timestamp: Arc<dyn TimestampAuthority>) -> Self {
        Self { timestamp }
    }
}

impl Default for BuiltinOperations {
    fn default() -> Self {
        Self::new(Arc::new(HttpTimestampAuthority::default()))
    }
}

impl Operations for BuiltinOperations {
    fn sign(
        &self,
        request: &SignRequest,
        ctx: &mut InvocationContext<'_>,
    ) -> Result<(), SignError> {
        sign::sign(request, ctx, self.timestamp.as_ref())
    }

    fn verify(
        &self,
        request: &VerifyRequest,
        ctx: &mut InvocationContext<'_>,
    ) -> Result<(), VerifyError> {
        verify::verify(request, ctx)
    }

    fn list_keys(
        &self,
        request: &ListRequest,
        ctx: &mut InvocationContext<'_>,
    ) -> Result<(), ListError> {
        list_keys::list_keys(request, ctx)
    }
}

/// Routes a resolved mode to its operation.
#[derive(Clone)]
pub struct Dispatcher {
    provider: IdentityProvider,
    operations: Arc<dyn Operations>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(provider: IdentityProvider) -> Self {
        Self::with_operations(provider, Arc::new(BuiltinOperations::default()))
    }

    pub fn with_operations(
        provider: IdentityProvider,
        operations: Arc<dyn Operations>,
    ) -> Self {
        Self { provider, operations }
    }

    /// Perform `mode` once against `streams`.
    ///
    /// Operations that touch identities load them first; a store failure
    /// ends the invocation before the operation starts.
    pub fn dispatch(
        &self,
        mode: Mode,
        mut streams: Streams<'_>,
    ) -> Result<(), Error> {
        match mode {
            Mode::Help => {
                let help = Cli::command().render_help();
                write!(streams.output, "{help}")?;
                streams.flush()?;
            }
            Mode::Version => {
                writeln!(streams.output, "{VERSION}")?;
                streams.flush()?;
            }
            // The listener and the relay client are run by the process entry
            // point, never from inside a dispatch.
            Mode::Listen(_) => {
                return Err(ConfigError::NotAllowedInSession(
                    "--listening-server",
                )
                .into());
            }
            Mode::Connect(_) => {
                return Err(ConfigError::NotAllowedInSession("--connect").into());
            }
            Mode::Sign(request) => {
                let mut ctx = self.context(streams)?;
                self.operations.sign(&request, &mut ctx)?;
                ctx.streams.flush()?;
            }
            Mode::Verify(request) => {
                let mut ctx = self.context(streams)?;
                self.operations.verify(&request, &mut ctx)?;
                ctx.streams.flush()?;
            }
            Mode::ListKeys(request) => {
                let mut ctx = self.context(streams)?;
                self.operations.list_keys(&request, &mut ctx)?;
                ctx.streams.flush()?;
            }
        }
        Ok(())
    }

    fn context<'a>(
        &self,
        streams: Streams<'a>,
    ) -> Result<InvocationContext<'a>, StoreError> {
        let identities = self.provider.load()?;
        debug!(count = identities.len(), "invocation context ready");
        Ok(InvocationContext { streams, identities })
    }
}
