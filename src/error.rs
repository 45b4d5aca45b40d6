use std::io;

use thiserror::Error;

use crate::{
    cmd::{
        list_keys::ListError, mode::ConfigError, sign::SignError,
        verify::VerifyError,
    },
    store::StoreError,
};

/// Anything that ends a single invocation.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sign(#[from] SignError),
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error(transparent)]
    List(#[from] ListError),
    #[error("failed to write output")]
    Io(#[from] io::Error),
}

impl Error {
    /// The error and its sources joined with `: `.
    pub fn report(&self) -> String {
        let mut report = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            report.push_str(": ");
            report.push_str(&err.to_string());
            source = err.source();
        }
        report
    }
}
