//! Credential store access.
//!
//! The dispatcher only ever sees identities through the [`CredentialStore`],
//! [`Store`] and [`Identity`] traits. [`IdentityProvider`] turns a store into
//! a freshly enumerated [`Identities`] list for a single invocation.

mod certificate;
mod file_store;
mod provider;

use std::{io, path::PathBuf};

pub use certificate::*;
use ed25519_dalek::SigningKey;
pub use file_store::{
    FileStore, IdentityRecord, StoreFile, default_store_path,
};
pub use provider::{Identities, IdentityProvider};
use thiserror::Error;

/// A private-key-backed certificate held by a credential store.
pub trait Identity: Send {
    fn certificate(&self) -> Result<Certificate, IdentityError>;

    /// Issuer certificates, nearest first, excluding the leaf.
    fn chain(&self) -> Result<Vec<Certificate>, IdentityError>;

    fn signing_key(&self) -> Result<SigningKey, IdentityError>;
}

/// An opened credential store.
pub trait Store {
    fn identities(&self) -> Result<Vec<Box<dyn Identity>>, StoreError>;
}

/// Something that can open a credential store on demand.
pub trait CredentialStore: Send + Sync {
    fn open(&self) -> Result<Box<dyn Store>, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open certificate store at {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to get identities from certificate store: {0}")]
    Enumerate(String),
}

/// Failure to retrieve one identity's material. Never fatal to a listing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),
    #[error("invalid private key: {0}")]
    InvalidKey(String),
}
