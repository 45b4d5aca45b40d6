use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

pub mod cmd;
pub mod error;
pub mod logging;
pub mod remote;
pub mod signature;
pub mod store;
pub mod tsa;

#[cfg(test)]
pub(crate) mod testing;

pub use cmd::{
    Cli,
    router::{Dispatcher, InvocationContext, Operations},
    streams::Streams,
};
pub use error::Error;

/// Entrypoint shared by the binary and integration tests.
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.listening_server);
    cli.exec()
}
