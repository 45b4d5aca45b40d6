use std::io::{self, Read, Write};

use super::mode::ConfigError;

/// The input, output and error streams of one invocation.
pub struct Streams<'a> {
    pub input: &'a mut dyn Read,
    pub output: &'a mut dyn Write,
    pub error: &'a mut dyn Write,
}

impl<'a> Streams<'a> {
    pub fn new(
        input: &'a mut dyn Read,
        output: &'a mut dyn Write,
        error: &'a mut dyn Write,
    ) -> Self {
        Self { input, output, error }
    }

    /// Write a `[GNUPG:]` status line to the stream `target` selects.
    pub fn status(
        &mut self,
        target: StatusTarget,
        line: &str,
    ) -> io::Result<()> {
        let stream: &mut dyn Write = match target {
            StatusTarget::Suppressed => return Ok(()),
            StatusTarget::Output => &mut *self.output,
            StatusTarget::Error => &mut *self.error,
        };
        writeln!(stream, "[GNUPG:] {line}")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.output.flush()?;
        self.error.flush()
    }
}

/// Where `--status-fd` sends status lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusTarget {
    #[default]
    Suppressed,
    Output,
    Error,
}

impl StatusTarget {
    pub fn from_fd(fd: Option<i32>) -> Result<Self, ConfigError> {
        match fd {
            None => Ok(Self::Suppressed),
            Some(1) => Ok(Self::Output),
            Some(2) => Ok(Self::Error),
            Some(other) => Err(ConfigError::UnsupportedStatusFd(other)),
        }
    }
}
