//! Session wire format.
//!
//! The client sends, in order:
//!
//! 1. an optional `AUTH <token>` line,
//! 2. the command line, in the same syntax as local arguments,
//! 3. the input bytes, terminated by closing its write half.
//!
//! Lines end in `\n` (a trailing `\r` is dropped). The server answers with
//! frames of `[tag: u8][len: u32 BE][payload]`: tag 1 carries output, tag 2
//! error output, and tag 0 ends the session with a big-endian `i32` status.

use std::borrow::Cow;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite,
    AsyncWriteExt,
};

use super::SessionError;

pub const MAX_COMMAND_LEN: usize = 8 * 1024;
pub const MAX_INPUT_LEN: u64 = 64 * 1024 * 1024;
/// Largest frame a client accepts; covers an armored envelope of a
/// maximum-size input.
pub const MAX_FRAME_LEN: u32 = 128 * 1024 * 1024;
pub const AUTH_PREFIX: &str = "AUTH ";

const TAG_EXIT: u8 = 0;
const TAG_OUTPUT: u8 = 1;
const TAG_ERROR: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Output(Vec<u8>),
    Error(Vec<u8>),
    Exit(i32),
}

impl Frame {
    fn tag(&self) -> u8 {
        match self {
            Frame::Output(_) => TAG_OUTPUT,
            Frame::Error(_) => TAG_ERROR,
            Frame::Exit(_) => TAG_EXIT,
        }
    }

    fn payload(&self) -> Cow<'_, [u8]> {
        match self {
            Frame::Output(data) | Frame::Error(data) => Cow::Borrowed(data),
            Frame::Exit(status) => Cow::Owned(status.to_be_bytes().to_vec()),
        }
    }
}

/// The session preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub credential: Option<String>,
    pub command: String,
}

pub async fn read_header<R>(reader: &mut R) -> Result<Header, SessionError>
where
    R: AsyncBufRead + Unpin,
{
    let first = read_line(reader).await?.ok_or(SessionError::MissingCommand)?;
    match first.strip_prefix(AUTH_PREFIX) {
        Some(token) => {
            let command =
                read_line(reader).await?.ok_or(SessionError::MissingCommand)?;
            Ok(Header { credential: Some(token.to_owned()), command })
        }
        None => Ok(Header { credential: None, command: first }),
    }
}

/// Read everything up to the client's half-close.
pub async fn read_input<R>(reader: &mut R) -> Result<Vec<u8>, SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut input = Vec::new();
    (&mut *reader).take(MAX_INPUT_LEN + 1).read_to_end(&mut input).await?;
    if input.len() as u64 > MAX_INPUT_LEN {
        return Err(SessionError::InputTooLarge(MAX_INPUT_LEN));
    }
    Ok(input)
}

/// Read one line of at most [`MAX_COMMAND_LEN`] bytes; `None` at end of
/// stream.
async fn read_line<R>(reader: &mut R) -> Result<Option<String>, SessionError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(MAX_COMMAND_LEN as u64 + 1)
        .read_until(b'\n', &mut line)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    } else if line.len() > MAX_COMMAND_LEN {
        return Err(SessionError::CommandTooLong(MAX_COMMAND_LEN));
    }
    String::from_utf8(line).map(Some).map_err(|_| SessionError::Utf8)
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = frame.payload();
    let len = u32::try_from(payload.len()).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "frame too large")
    })?;
    writer.write_u8(frame.tag()).await?;
    writer.write_u32(len).await?;
    writer.write_all(&payload).await
}

pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, SessionError>
where
    R: AsyncRead + Unpin,
{
    let tag = reader.read_u8().await?;
    let len = reader.read_u32().await?;
    if len > MAX_FRAME_LEN {
        return Err(SessionError::Protocol(format!(
            "frame of {len} bytes exceeds {MAX_FRAME_LEN}"
        )));
    }
    let mut payload = vec![0; len as usize];
    reader.read_exact(&mut payload).await?;
    match tag {
        TAG_OUTPUT => Ok(Frame::Output(payload)),
        TAG_ERROR => Ok(Frame::Error(payload)),
        TAG_EXIT => {
            let status: [u8; 4] = payload.try_into().map_err(|_| {
                SessionError::Protocol("exit frame must carry 4 bytes".into())
            })?;
            Ok(Frame::Exit(i32::from_be_bytes(status)))
        }
        other => {
            Err(SessionError::Protocol(format!("unknown frame tag {other}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::BufReader;

    use super::*;

    #[tokio::test]
    async fn header_with_and_without_credential() {
        let mut reader = BufReader::new(&b"AUTH t0k\r\n--list-keys\nrest"[..]);
        let header = read_header(&mut reader).await.unwrap();
        assert_eq!(header.credential.as_deref(), Some("t0k"));
        assert_eq!(header.command, "--list-keys");
        assert_eq!(read_input(&mut reader).await.unwrap(), b"rest");

        let mut reader = BufReader::new(&b"--sign -u alice"[..]);
        let header = read_header(&mut reader).await.unwrap();
        assert_eq!(header.credential, None);
        assert_eq!(header.command, "--sign -u alice");
        assert!(read_input(&mut reader).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_session_has_no_command() {
        let mut reader = BufReader::new(&b""[..]);
        assert!(matches!(
            read_header(&mut reader).await,
            Err(SessionError::MissingCommand)
        ));
        let mut reader = BufReader::new(&b"AUTH x\n"[..]);
        assert!(matches!(
            read_header(&mut reader).await,
            Err(SessionError::MissingCommand)
        ));
    }

    #[tokio::test]
    async fn overlong_command_line() {
        let mut data = vec![b'a'; MAX_COMMAND_LEN];
        data.push(b'\n');
        let mut reader = BufReader::new(data.as_slice());
        let header = read_header(&mut reader).await.unwrap();
        assert_eq!(header.command.len(), MAX_COMMAND_LEN);

        let data = vec![b'a'; MAX_COMMAND_LEN + 1];
        let mut reader = BufReader::new(data.as_slice());
        assert!(matches!(
            read_header(&mut reader).await,
            Err(SessionError::CommandTooLong(_))
        ));
    }

    #[tokio::test]
    async fn frames() {
        let mut wire = Vec::new();
        for frame in [
            Frame::Output(b"out".to_vec()),
            Frame::Error(Vec::new()),
            Frame::Exit(-1),
        ] {
            write_frame(&mut wire, &frame).await.unwrap();
        }
        assert_eq!(&wire[..8], &[1, 0, 0, 0, 3, b'o', b'u', b't']);
        assert_eq!(&wire[wire.len() - 9..], &[0, 0, 0, 0, 4, 255, 255, 255, 255]);

        let mut reader = wire.as_slice();
        assert_eq!(
            read_frame(&mut reader).await.unwrap(),
            Frame::Output(b"out".to_vec())
        );
        assert_eq!(read_frame(&mut reader).await.unwrap(), Frame::Error(vec![]));
        assert_eq!(read_frame(&mut reader).await.unwrap(), Frame::Exit(-1));
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(SessionError::Io(_))
        ));
    }

    #[tokio::test]
    async fn malformed_frames() {
        let mut reader = &[9u8, 0, 0, 0, 0][..];
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(SessionError::Protocol(_))
        ));
        let mut reader = &[0u8, 0, 0, 0, 1, 7][..];
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(SessionError::Protocol(_))
        ));
    }
}
