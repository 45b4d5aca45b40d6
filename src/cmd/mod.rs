use std::{
    env, io, iter, net::SocketAddr, path::PathBuf, process::ExitCode,
};

use anyhow::Result;
use clap::{Parser, ValueEnum};

pub mod list_keys;
pub mod mode;
pub mod router;
pub mod sign;
pub mod streams;
pub mod verify;
pub mod words;

use self::{
    mode::{ConfigError, Mode},
    router::Dispatcher,
    streams::Streams,
};
use crate::{
    error::Error,
    remote::{self, BridgeConfig},
    store::{Certificate, IdentityProvider, default_store_path},
};

pub const BIN_NAME: &str = "certsign";
pub const STORE_ENV: &str = "CERTSIGN_STORE";
pub const AUTH_TOKEN_ENV: &str = "CERTSIGN_AUTH_TOKEN";

/// certsign command-line interface definition.
///
/// The same grammar is used for the process's own arguments and for the
/// command line carried by each remote session.
#[derive(Debug, Default, Parser)]
#[command(
    name = BIN_NAME,
    about = "Sign and verify data with certificates from a credential store",
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct Cli {
    /// print this help message
    #[arg(short = 'h', long, help_heading = "Modes")]
    pub help: bool,

    /// print the version number
    #[arg(short = 'v', long, help_heading = "Modes")]
    pub version: bool,

    /// make a signature
    #[arg(short = 's', long, help_heading = "Modes")]
    pub sign: bool,

    /// verify a signature
    #[arg(long, help_heading = "Modes")]
    pub verify: bool,

    /// show keys
    #[arg(long = "list-keys", help_heading = "Modes")]
    pub list_keys: bool,

    /// accept signing sessions over the network
    #[arg(short = 'l', long = "listening-server", help_heading = "Modes")]
    pub listening_server: bool,

    /// run the command given after `--` on the bridge at ADDR (HOST[:PORT])
    #[arg(long, value_name = "ADDR", help_heading = "Modes")]
    pub connect: Option<String>,

    /// use USER-ID to sign
    #[arg(short = 'u', long = "local-user", value_name = "USER-ID")]
    pub local_user: Option<String>,

    /// make a detached signature
    #[arg(short = 'b', long = "detach-sign")]
    pub detach_sign: bool,

    /// create ascii armored output
    #[arg(short = 'a', long)]
    pub armor: bool,

    /// write special status strings to the file descriptor n (1 or 2)
    #[arg(
        long = "status-fd",
        value_name = "n",
        allow_negative_numbers = true
    )]
    pub status_fd: Option<i32>,

    /// select how to display key IDs
    #[arg(long = "keyid-format", value_enum, value_name = "{long}")]
    pub keyid_format: Option<KeyIdFormat>,

    /// URL of the timestamp authority to use for timestamping
    #[arg(short = 't', long = "timestamp-authority", value_name = "url")]
    pub timestamp_authority: Option<String>,

    /// -3 is the same as -2. -2 includes all certs except root. -1 includes
    /// all certs. 0 includes no certs. 1 includes leaf cert. >1 includes n
    /// from the leaf. Default -2.
    #[arg(
        long = "include-certs",
        value_name = "n",
        allow_negative_numbers = true
    )]
    pub include_certs: Option<i32>,

    /// address to accept sessions on [default: 0.0.0.0:2222]
    #[arg(long = "listen-addr", value_name = "ADDR", help_heading = "Listener")]
    pub listen_addr: Option<SocketAddr>,

    /// seconds before a session is abandoned, 0 for no limit [default: 300]
    #[arg(
        long = "session-timeout",
        value_name = "SECS",
        help_heading = "Listener"
    )]
    pub session_timeout: Option<u64>,

    /// maximum number of concurrent sessions [default: 64]
    #[arg(long = "max-sessions", value_name = "N", help_heading = "Listener")]
    pub max_sessions: Option<usize>,

    /// token sessions must present (also read from CERTSIGN_AUTH_TOKEN)
    #[arg(long = "auth-token", value_name = "TOKEN", help_heading = "Listener")]
    pub auth_token: Option<String>,

    /// credential store file (also read from CERTSIGN_STORE)
    #[arg(long, value_name = "PATH", help_heading = "Host")]
    pub store: Option<PathBuf>,

    /// enable debug logging
    #[arg(long, help_heading = "Host")]
    pub verbose: bool,

    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// command line for --connect
    #[arg(last = true, value_name = "REMOTE-ARGS")]
    pub remote_args: Vec<String>,
}

/// How key IDs are displayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum KeyIdFormat {
    /// the last 16 hex digits of the fingerprint
    #[default]
    Long,
}

impl KeyIdFormat {
    pub fn render(self, cert: &Certificate) -> String {
        match self {
            KeyIdFormat::Long => cert.long_key_id(),
        }
    }
}

impl Cli {
    /// Run as a local invocation wired to the process's standard streams.
    ///
    /// The exit code is the remote session's status under `--connect`.
    pub fn exec(self) -> Result<ExitCode> {
        let mode = mode::resolve(&self)?;
        let dispatcher = Dispatcher::new(IdentityProvider::from_path(
            self.store_path(),
        ));

        match mode {
            Mode::Listen(request) => {
                let config = BridgeConfig::from_request(
                    request,
                    env::var(AUTH_TOKEN_ENV).ok(),
                );
                remote::serve(config, dispatcher)?;
                Ok(ExitCode::SUCCESS)
            }
            Mode::Connect(request) => {
                remote::connect(request, env::var(AUTH_TOKEN_ENV).ok())
            }
            mode => {
                let mut input = io::stdin().lock();
                let mut output = io::stdout().lock();
                let mut error = io::stderr();
                let streams =
                    Streams::new(&mut input, &mut output, &mut error);
                dispatcher.dispatch(mode, streams)?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }

    /// Parse a remote session's command line with the local grammar.
    pub fn parse_session(line: &str) -> Result<Self, ConfigError> {
        let words = words::split_command_line(line)?;
        let args = iter::once(BIN_NAME).chain(words.iter().map(String::as_str));
        Self::try_parse_from(args).map_err(|err| {
            ConfigError::Parse(err.to_string().trim_end().to_owned())
        })
    }

    fn store_path(&self) -> PathBuf {
        self.store
            .clone()
            .or_else(|| env::var_os(STORE_ENV).map(PathBuf::from))
            .unwrap_or_else(default_store_path)
    }
}

/// Run one remote session's command line against `dispatcher`.
///
/// The option set is parsed fresh from `line`; nothing from the host
/// process's own arguments or from earlier sessions carries over.
pub fn run_session_command(
    dispatcher: &Dispatcher,
    line: &str,
    streams: Streams<'_>,
) -> Result<(), Error> {
    let cli = Cli::parse_session(line)?;
    let mode = mode::resolve_session(&cli)?;
    dispatcher.dispatch(mode, streams)
}
