//! In-memory credential store used by unit tests.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use ed25519_dalek::SigningKey;

use crate::store::{
    Certificate, CertificateInfo, CredentialStore, Identity, IdentityError,
    KEY_USAGE_CERT_SIGN, KEY_USAGE_DIGITAL_SIGNATURE, Store, StoreError,
};

pub fn certificate(
    seed: u8,
    subject: &str,
    issuer: &str,
    key_usage: u16,
    is_ca: bool,
) -> Certificate {
    let key = SigningKey::from_bytes(&[seed; 32]);
    Certificate::new(CertificateInfo {
        serial: format!("{seed:x}"),
        subject: subject.to_owned(),
        issuer: issuer.to_owned(),
        emails: vec![format!("user{seed}@example.com")],
        not_before: "2025-01-01 00:00:00 +0000 UTC".to_owned(),
        not_after: "2030-01-01 00:00:00 +0000 UTC".to_owned(),
        algorithm: "Ed25519".to_owned(),
        key_usage,
        is_ca,
        public_key: hex::encode(key.verifying_key().to_bytes()),
    })
    .unwrap()
}

#[derive(Clone)]
pub struct MemoryIdentity {
    certificate: Result<Certificate, IdentityError>,
    chain: Vec<Certificate>,
    seed: u8,
}

impl MemoryIdentity {
    pub fn with_chain(mut self, chain: Vec<Certificate>) -> Self {
        self.chain = chain;
        self
    }
}

impl Identity for MemoryIdentity {
    fn certificate(&self) -> Result<Certificate, IdentityError> {
        self.certificate.clone()
    }

    fn chain(&self) -> Result<Vec<Certificate>, IdentityError> {
        Ok(self.chain.clone())
    }

    fn signing_key(&self) -> Result<SigningKey, IdentityError> {
        Ok(SigningKey::from_bytes(&[self.seed; 32]))
    }
}

pub fn signing_identity(seed: u8, subject: &str) -> MemoryIdentity {
    MemoryIdentity {
        certificate: Ok(certificate(
            seed,
            subject,
            "CN=Test CA",
            KEY_USAGE_DIGITAL_SIGNATURE,
            false,
        )),
        chain: Vec::new(),
        seed,
    }
}

pub fn ca_identity(seed: u8, subject: &str) -> MemoryIdentity {
    MemoryIdentity {
        certificate: Ok(certificate(
            seed,
            subject,
            subject,
            KEY_USAGE_DIGITAL_SIGNATURE | KEY_USAGE_CERT_SIGN,
            true,
        )),
        chain: Vec::new(),
        seed,
    }
}

pub fn broken_identity() -> MemoryIdentity {
    MemoryIdentity {
        certificate: Err(IdentityError::InvalidCertificate(
            "corrupt certificate".to_owned(),
        )),
        chain: Vec::new(),
        seed: 0,
    }
}

/// A store whose contents are fixed at construction.
pub struct MemoryStore {
    identities: Option<Vec<MemoryIdentity>>,
    opens: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new(identities: Vec<MemoryIdentity>) -> Self {
        Self { identities: Some(identities), opens: Arc::default() }
    }

    pub fn unavailable() -> Self {
        Self { identities: None, opens: Arc::default() }
    }

    pub fn open_count(&self) -> Arc<AtomicUsize> { self.opens.clone() }
}

impl CredentialStore for MemoryStore {
    fn open(&self) -> Result<Box<dyn Store>, StoreError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match &self.identities {
            Some(identities) => Ok(Box::new(Snapshot(identities.clone()))),
            None => Err(StoreError::Open {
                path: "memory".into(),
                source: io::Error::other("store unavailable"),
            }),
        }
    }
}

struct Snapshot(Vec<MemoryIdentity>);

impl Store for Snapshot {
    fn identities(&self) -> Result<Vec<Box<dyn Identity>>, StoreError> {
        Ok(self
            .0
            .iter()
            .cloned()
            .map(|identity| Box::new(identity) as Box<dyn Identity>)
            .collect())
    }
}
