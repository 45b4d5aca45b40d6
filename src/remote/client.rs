use std::{
    io::{self, IsTerminal, Read, Write},
    process::ExitCode,
};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{TcpStream, ToSocketAddrs},
    runtime::Runtime,
};
use tracing::{debug, info};

use super::{
    DEFAULT_PORT, SessionError,
    protocol::{self, AUTH_PREFIX, Frame},
};
use crate::cmd::{mode::ConnectRequest, words};

/// Everything a session produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOutput {
    pub output: Vec<u8>,
    pub error: Vec<u8>,
    pub status: i32,
}

impl SessionOutput {
    pub fn success(&self) -> bool { self.status == 0 }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    pub fn error_text(&self) -> String {
        String::from_utf8_lossy(&self.error).into_owned()
    }
}

/// Run `command` on the bridge at `addr`, feeding it `input`.
///
/// Input is sent while the result is being read, so a server that answers
/// early (for example when rejecting the credential) is still heard.
pub async fn run_session(
    addr: impl ToSocketAddrs,
    credential: Option<&str>,
    command: &str,
    input: &[u8],
) -> Result<SessionOutput, SessionError> {
    let single_line = |s: &str| !s.contains(['\n', '\r']);
    if !single_line(command) || !credential.is_none_or(single_line) {
        return Err(SessionError::InvalidCommand);
    }
    let mut header = String::new();
    if let Some(token) = credential {
        header.push_str(AUTH_PREFIX);
        header.push_str(token);
        header.push('\n');
    }
    header.push_str(command);
    header.push('\n');

    let stream = TcpStream::connect(addr).await?;
    let (read_half, mut write_half) = stream.into_split();

    let send = async {
        write_half.write_all(header.as_bytes()).await?;
        write_half.write_all(input).await?;
        write_half.shutdown().await
    };
    let receive = async {
        let mut reader = BufReader::new(read_half);
        let mut result = SessionOutput::default();
        loop {
            match protocol::read_frame(&mut reader).await? {
                Frame::Output(data) => result.output.extend(data),
                Frame::Error(data) => result.error.extend(data),
                Frame::Exit(status) => {
                    result.status = status;
                    return Ok::<_, SessionError>(result);
                }
            }
        }
    };

    let (sent, received) = tokio::join!(send, receive);
    if let Err(err) = sent {
        debug!(error = %err, "session closed before all input was sent");
    }
    received
}

/// Run `request` on a remote bridge, relaying the process's standard streams.
///
/// Standard input is sent only when it is not a terminal. The exit code is
/// the session's status, or failure when it does not fit one.
pub fn connect(
    request: ConnectRequest,
    env_token: Option<String>,
) -> Result<ExitCode> {
    let target = with_default_port(&request.addr);
    let command =
        words::join_command_line(request.command.iter().map(String::as_str))?;
    let credential = request.auth_token.or(env_token).filter(|t| !t.is_empty());

    let mut input = Vec::new();
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        stdin
            .lock()
            .read_to_end(&mut input)
            .context("Failed to read standard input")?;
    }

    info!(target = %target, "connecting");
    let runtime = Runtime::new()?;
    let result = runtime
        .block_on(run_session(
            target.as_str(),
            credential.as_deref(),
            &command,
            &input,
        ))
        .with_context(|| format!("Session with {target} failed"))?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&result.output)?;
    stdout.flush()?;
    io::stderr().write_all(&result.error)?;
    Ok(u8::try_from(result.status).map_or(ExitCode::FAILURE, ExitCode::from))
}

fn with_default_port(addr: &str) -> String {
    if addr.contains(':') {
        addr.to_owned()
    } else {
        format!("{addr}:{DEFAULT_PORT}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_hosts_use_the_default_port() {
        assert_eq!(with_default_port("signer.example"), "signer.example:2222");
        assert_eq!(with_default_port("127.0.0.1:9000"), "127.0.0.1:9000");
        assert_eq!(with_default_port("[::1]:9000"), "[::1]:9000");
    }
}
