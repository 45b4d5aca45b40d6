//! Mode resolution.
//!
//! Every invocation selects exactly one mode. Which options each mode
//! requires or tolerates is recorded once in [`MODE_TABLE`]; resolution walks
//! the table and returns the first violation it finds.

use std::{
    fmt, fs,
    io::{self, Read},
    net::SocketAddr,
    path::PathBuf,
};

use thiserror::Error;

use super::{
    Cli, KeyIdFormat, sign::IncludeCerts, streams::StatusTarget,
};

/// Timestamp authority used when `--timestamp-authority` is not given.
const DEFAULT_TSA: Option<&str> = option_env!("CERTSIGN_DEFAULT_TSA");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeFlag {
    Sign,
    Verify,
    ListKeys,
    Listen,
    Connect,
}

impl ModeFlag {
    const ALL: [ModeFlag; 5] = [
        ModeFlag::Sign,
        ModeFlag::Verify,
        ModeFlag::ListKeys,
        ModeFlag::Listen,
        ModeFlag::Connect,
    ];

    fn is_set(self, cli: &Cli) -> bool {
        match self {
            ModeFlag::Sign => cli.sign,
            ModeFlag::Verify => cli.verify,
            ModeFlag::ListKeys => cli.list_keys,
            ModeFlag::Listen => cli.listening_server,
            ModeFlag::Connect => cli.connect.is_some(),
        }
    }

    fn rule(self) -> &'static ModeRule { &MODE_TABLE[self as usize] }
}

impl fmt::Display for ModeFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModeFlag::Sign => "sign",
            ModeFlag::Verify => "verify",
            ModeFlag::ListKeys => "list-keys",
            ModeFlag::Listen => "listening-server",
            ModeFlag::Connect => "connect",
        })
    }
}

/// Mode-specific parameters, in the order violations are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    LocalUser,
    DetachSign,
    Armor,
    StatusFd,
    TimestampAuthority,
    IncludeCerts,
    Files,
    ListenAddr,
    SessionTimeout,
    MaxSessions,
    AuthToken,
    RemoteCommand,
}

impl Param {
    const ORDER: [Param; 12] = [
        Param::LocalUser,
        Param::DetachSign,
        Param::Armor,
        Param::StatusFd,
        Param::TimestampAuthority,
        Param::IncludeCerts,
        Param::Files,
        Param::ListenAddr,
        Param::SessionTimeout,
        Param::MaxSessions,
        Param::AuthToken,
        Param::RemoteCommand,
    ];

    fn is_supplied(self, cli: &Cli) -> bool {
        match self {
            Param::LocalUser => {
                cli.local_user.as_deref().is_some_and(|user| !user.is_empty())
            }
            Param::DetachSign => cli.detach_sign,
            Param::Armor => cli.armor,
            Param::StatusFd => cli.status_fd.is_some(),
            Param::TimestampAuthority => cli.timestamp_authority.is_some(),
            Param::IncludeCerts => cli.include_certs.is_some(),
            Param::Files => !cli.files.is_empty(),
            Param::ListenAddr => cli.listen_addr.is_some(),
            Param::SessionTimeout => cli.session_timeout.is_some(),
            Param::MaxSessions => cli.max_sessions.is_some(),
            Param::AuthToken => cli.auth_token.is_some(),
            Param::RemoteCommand => !cli.remote_args.is_empty(),
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Param::LocalUser => "local-user",
            Param::DetachSign => "detach-sign",
            Param::Armor => "armor",
            Param::StatusFd => "status-fd",
            Param::TimestampAuthority => "timestamp-authority",
            Param::IncludeCerts => "include-certs",
            Param::Files => "file arguments",
            Param::ListenAddr => "listen-addr",
            Param::SessionTimeout => "session-timeout",
            Param::MaxSessions => "max-sessions",
            Param::AuthToken => "auth-token",
            Param::RemoteCommand => "remote command",
        })
    }
}

/// One row of the mode table.
#[derive(Debug)]
struct ModeRule {
    flag: ModeFlag,
    requires: &'static [Param],
    allows: &'static [Param],
    max_files: usize,
}

/// Indexed by [`ModeFlag`] discriminant.
static MODE_TABLE: [ModeRule; 5] = [
    ModeRule {
        flag: ModeFlag::Sign,
        requires: &[Param::LocalUser],
        allows: &[
            Param::LocalUser,
            Param::DetachSign,
            Param::Armor,
            Param::StatusFd,
            Param::TimestampAuthority,
            Param::IncludeCerts,
            Param::Files,
        ],
        max_files: 1,
    },
    ModeRule {
        flag: ModeFlag::Verify,
        requires: &[],
        allows: &[Param::StatusFd, Param::Files],
        max_files: 2,
    },
    ModeRule {
        flag: ModeFlag::ListKeys,
        requires: &[],
        allows: &[],
        max_files: 0,
    },
    ModeRule {
        flag: ModeFlag::Listen,
        requires: &[],
        allows: &[
            Param::ListenAddr,
            Param::SessionTimeout,
            Param::MaxSessions,
            Param::AuthToken,
        ],
        max_files: 0,
    },
    ModeRule {
        flag: ModeFlag::Connect,
        requires: &[Param::RemoteCommand],
        allows: &[Param::AuthToken, Param::RemoteCommand],
        max_files: 0,
    },
];

impl ModeRule {
    fn check(&self, cli: &Cli) -> Result<(), ConfigError> {
        if let Some(param) =
            self.requires.iter().find(|param| !param.is_supplied(cli))
        {
            return Err(ConfigError::Missing {
                param: *param,
                mode: self.flag,
            });
        }
        if let Some(param) = Param::ORDER.into_iter().find(|param| {
            param.is_supplied(cli) && !self.allows.contains(param)
        }) {
            return Err(ConfigError::Forbidden {
                param,
                mode: self.flag,
            });
        }
        if cli.files.len() > self.max_files {
            return Err(ConfigError::TooManyFiles {
                mode: self.flag,
                max: self.max_files,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("specify --help, --sign, --verify, or --list-keys")]
    NoMode,
    #[error(
        "{first} and {second} cannot be combined; specify --help, --sign, \
         --verify, or --list-keys"
    )]
    ConflictingModes { first: ModeFlag, second: ModeFlag },
    #[error("{param} is required for {mode}")]
    Missing { param: Param, mode: ModeFlag },
    #[error("{param} cannot be specified for {mode}")]
    Forbidden { param: Param, mode: ModeFlag },
    #[error("too many file arguments for {mode} (at most {max})")]
    TooManyFiles { mode: ModeFlag, max: usize },
    #[error("unsupported status-fd {0}; use 1 (output) or 2 (error)")]
    UnsupportedStatusFd(i32),
    #[error("unsupported include-certs {0}; use -3 or greater")]
    UnsupportedIncludeCerts(i32),
    #[error("the input stream cannot supply both signature and content")]
    InputUsedTwice,
    #[error("{0} cannot be used in a remote session")]
    NotAllowedInSession(&'static str),
    #[error("{0}")]
    Parse(String),
}

/// Where an operation reads its data from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Input,
    File(PathBuf),
}

impl Source {
    fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            Source::Input
        } else {
            Source::File(PathBuf::from(arg))
        }
    }

    /// Read the whole source, taking `input` for [`Source::Input`].
    pub fn read(&self, input: &mut dyn Read) -> io::Result<Vec<u8>> {
        match self {
            Source::Input => {
                let mut data = Vec::new();
                input.read_to_end(&mut data)?;
                Ok(data)
            }
            Source::File(path) => fs::read(path),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Input => f.write_str("input stream"),
            Source::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    pub user_id: String,
    pub detach: bool,
    pub armor: bool,
    pub status: StatusTarget,
    pub timestamp_authority: Option<String>,
    pub include_certs: IncludeCerts,
    pub message: Source,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRequest {
    pub status: StatusTarget,
    pub signature: Source,
    /// Content for a detached signature.
    pub content: Option<Source>,
    pub keyid_format: KeyIdFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub keyid_format: KeyIdFormat,
}

/// Listener options exactly as given; defaults are applied by the bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenRequest {
    pub addr: Option<SocketAddr>,
    pub session_timeout: Option<u64>,
    pub max_sessions: Option<usize>,
    pub auth_token: Option<String>,
}

/// A command line to run on a remote bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// `HOST:PORT`, or a bare host for the default port.
    pub addr: String,
    pub auth_token: Option<String>,
    /// Arguments given after `--`, quoted back into one line when sent.
    pub command: Vec<String>,
}

/// The single operation an invocation performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Help,
    Version,
    Sign(SignRequest),
    Verify(VerifyRequest),
    ListKeys(ListRequest),
    Listen(ListenRequest),
    Connect(ConnectRequest),
}

/// Resolve the mode selected by a parsed command line.
pub fn resolve(cli: &Cli) -> Result<Mode, ConfigError> {
    if cli.help {
        return Ok(Mode::Help);
    }
    if cli.version {
        return Ok(Mode::Version);
    }

    let mut selected =
        ModeFlag::ALL.into_iter().filter(|flag| flag.is_set(cli));
    let flag = selected.next().ok_or(ConfigError::NoMode)?;
    if let Some(second) = selected.next() {
        return Err(ConfigError::ConflictingModes { first: flag, second });
    }

    flag.rule().check(cli)?;
    build(flag, cli)
}

/// Resolve a command line received over a remote session.
///
/// Sessions may not start another listener, relay to another bridge,
/// override host settings, or name host files; `-` (the session's own input)
/// is the only file argument.
pub fn resolve_session(cli: &Cli) -> Result<Mode, ConfigError> {
    let mode = resolve(cli)?;
    match mode {
        Mode::Help | Mode::Version => Ok(mode),
        Mode::Listen(_) => {
            Err(ConfigError::NotAllowedInSession("--listening-server"))
        }
        Mode::Connect(_) => Err(ConfigError::NotAllowedInSession("--connect")),
        _ if cli.store.is_some() => {
            Err(ConfigError::NotAllowedInSession("--store"))
        }
        _ if cli.verbose => Err(ConfigError::NotAllowedInSession("--verbose")),
        _ if cli.files.iter().any(|arg| arg != "-") => {
            Err(ConfigError::NotAllowedInSession("file arguments"))
        }
        _ => Ok(mode),
    }
}

fn build(flag: ModeFlag, cli: &Cli) -> Result<Mode, ConfigError> {
    let keyid_format = cli.keyid_format.unwrap_or_default();
    match flag {
        ModeFlag::Sign => {
            let user_id =
                cli.local_user.clone().ok_or(ConfigError::Missing {
                    param: Param::LocalUser,
                    mode: flag,
                })?;
            let timestamp_authority = cli
                .timestamp_authority
                .clone()
                .or_else(|| DEFAULT_TSA.map(str::to_owned))
                .filter(|url| !url.is_empty());
            Ok(Mode::Sign(SignRequest {
                user_id,
                detach: cli.detach_sign,
                armor: cli.armor,
                status: StatusTarget::from_fd(cli.status_fd)?,
                timestamp_authority,
                include_certs: IncludeCerts::new(
                    cli.include_certs.unwrap_or(IncludeCerts::DEFAULT),
                )?,
                message: cli
                    .files
                    .first()
                    .map_or(Source::Input, |arg| Source::from_arg(arg)),
            }))
        }
        ModeFlag::Verify => {
            let signature = cli
                .files
                .first()
                .map_or(Source::Input, |arg| Source::from_arg(arg));
            let content = cli.files.get(1).map(|arg| Source::from_arg(arg));
            if signature == Source::Input && content == Some(Source::Input) {
                return Err(ConfigError::InputUsedTwice);
            }
            Ok(Mode::Verify(VerifyRequest {
                status: StatusTarget::from_fd(cli.status_fd)?,
                signature,
                content,
                keyid_format,
            }))
        }
        ModeFlag::ListKeys => Ok(Mode::ListKeys(ListRequest { keyid_format })),
        ModeFlag::Listen => Ok(Mode::Listen(ListenRequest {
            addr: cli.listen_addr,
            session_timeout: cli.session_timeout,
            max_sessions: cli.max_sessions,
            auth_token: cli.auth_token.clone(),
        })),
        ModeFlag::Connect => Ok(Mode::Connect(ConnectRequest {
            addr: cli.connect.clone().unwrap_or_default(),
            auth_token: cli.auth_token.clone(),
            command: cli.remote_args.clone(),
        })),
    }
}
