use std::{
    io::{Cursor, Write},
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use tokio::{
    io::{
        self, AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader,
    },
    net::TcpStream,
    task,
    time::timeout,
};
use tracing::{debug, info, warn};

use super::{
    Authenticator, SessionError,
    protocol::{self, Frame, MAX_INPUT_LEN},
};
use crate::cmd::{router::Dispatcher, run_session_command, streams::Streams};

/// How long a rejected client may keep sending before the socket closes.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// State shared by every session a bridge accepts.
pub(crate) struct Shared {
    pub dispatcher: Dispatcher,
    pub authenticator: Arc<dyn Authenticator>,
    pub session_timeout: Option<Duration>,
}

/// Captured result of one invocation.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct SessionRun {
    output: Vec<u8>,
    error: Vec<u8>,
    status: i32,
}

impl SessionRun {
    /// Run `command` with its own buffers; blocking.
    pub fn execute(dispatcher: &Dispatcher, command: &str, input: Vec<u8>) -> Self {
        let mut input = Cursor::new(input);
        let mut output = Vec::new();
        let mut error = Vec::new();
        let result = run_session_command(
            dispatcher,
            command,
            Streams::new(&mut input, &mut output, &mut error),
        );
        let status = match result {
            Ok(()) => 0,
            Err(err) => {
                let _ = writeln!(error, "certsign: {}", err.report());
                1
            }
        };
        Self { output, error, status }
    }

    fn failed(err: &SessionError) -> Self {
        Self {
            output: Vec::new(),
            error: format!("certsign: {err}\n").into_bytes(),
            status: 1,
        }
    }

    fn into_frames(self) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(3);
        if !self.output.is_empty() {
            frames.push(Frame::Output(self.output));
        }
        if !self.error.is_empty() {
            frames.push(Frame::Error(self.error));
        }
        frames.push(Frame::Exit(self.status));
        frames
    }
}

/// Serve one connection to completion. Never fails; problems are reported
/// to the client and logged.
pub(crate) async fn handle(stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let session = run(&mut reader, peer, &shared);
    let outcome = match shared.session_timeout {
        Some(limit) => timeout(limit, session)
            .await
            .unwrap_or(Err(SessionError::TimedOut)),
        None => session.await,
    };
    let result = match outcome {
        Ok(run) => {
            info!(%peer, status = run.status, "session finished");
            run
        }
        Err(err) => {
            warn!(%peer, error = %err, "session failed");
            SessionRun::failed(&err)
        }
    };

    for frame in result.into_frames() {
        if let Err(err) = protocol::write_frame(&mut write_half, &frame).await {
            debug!(%peer, error = %err, "client went away");
            return;
        }
    }
    if write_half.shutdown().await.is_ok() {
        drain(&mut reader).await;
    }
}

async fn run<R>(
    reader: &mut R,
    peer: SocketAddr,
    shared: &Shared,
) -> Result<SessionRun, SessionError>
where
    R: AsyncBufRead + Unpin,
{
    let header = protocol::read_header(reader).await?;
    shared.authenticator.authorize(peer, header.credential.as_deref())?;
    let input = protocol::read_input(reader).await?;
    info!(%peer, command = %header.command, "session started");

    let dispatcher = shared.dispatcher.clone();
    let run = task::spawn_blocking(move || {
        SessionRun::execute(&dispatcher, &header.command, input)
    })
    .await?;
    Ok(run)
}

/// Discard whatever the client is still sending so closing the socket does
/// not reset the connection before it reads the frames.
async fn drain<R>(reader: &mut R)
where
    R: AsyncRead + Unpin,
{
    let mut rest = reader.take(MAX_INPUT_LEN);
    let _ = timeout(DRAIN_GRACE, io::copy(&mut rest, &mut io::sink())).await;
}
