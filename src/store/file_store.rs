use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use super::{
    Certificate, CredentialStore, Identity, IdentityError, Store, StoreError,
};

const DEFAULT_DIR: &str = ".certsign";
const DEFAULT_FILENAME: &str = "identities.json";

/// Resolve the default store location, `~/.certsign/identities.json`, or
/// `identities.json` in the working directory when there is no home.
pub fn default_store_path() -> PathBuf {
    match env::var_os("HOME") {
        Some(home) if !home.is_empty() => {
            PathBuf::from(home).join(DEFAULT_DIR).join(DEFAULT_FILENAME)
        }
        _ => PathBuf::from(DEFAULT_FILENAME),
    }
}

/// On-disk layout of a file-backed credential store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreFile {
    #[serde(default)]
    pub identities: Vec<IdentityRecord>,
}

/// One identity as persisted: base64 certificate blobs plus the hex secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub certificate: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<String>,
    pub secret_key: String,
}

impl IdentityRecord {
    pub fn new(
        certificate: &Certificate,
        chain: &[Certificate],
        key: &SigningKey,
    ) -> Self {
        Self {
            certificate: certificate.to_base64(),
            chain: chain.iter().map(Certificate::to_base64).collect(),
            secret_key: hex::encode(key.to_bytes()),
        }
    }
}

impl StoreFile {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory {}", parent.display())
                })?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// A credential store backed by a JSON file that is re-read on every open.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    pub fn path(&self) -> &Path { &self.path }
}

impl CredentialStore for FileStore {
    fn open(&self) -> Result<Box<dyn Store>, StoreError> {
        let data =
            fs::read_to_string(&self.path).map_err(|source| StoreError::Open {
                path: self.path.clone(),
                source,
            })?;
        Ok(Box::new(OpenedFileStore { data }))
    }
}

struct OpenedFileStore {
    data: String,
}

impl Store for OpenedFileStore {
    fn identities(&self) -> Result<Vec<Box<dyn Identity>>, StoreError> {
        if self.data.trim().is_empty() {
            return Ok(Vec::new());
        }
        let file: StoreFile = serde_json::from_str(&self.data)
            .map_err(|err| StoreError::Enumerate(err.to_string()))?;
        Ok(file
            .identities
            .into_iter()
            .map(|record| Box::new(FileIdentity { record }) as Box<dyn Identity>)
            .collect())
    }
}

struct FileIdentity {
    record: IdentityRecord,
}

impl Identity for FileIdentity {
    fn certificate(&self) -> Result<Certificate, IdentityError> {
        Certificate::from_base64(&self.record.certificate)
    }

    fn chain(&self) -> Result<Vec<Certificate>, IdentityError> {
        self.record
            .chain
            .iter()
            .map(|encoded| Certificate::from_base64(encoded))
            .collect()
    }

    fn signing_key(&self) -> Result<SigningKey, IdentityError> {
        let bytes = hex::decode(self.record.secret_key.trim())
            .map_err(|err| IdentityError::InvalidKey(err.to_string()))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            IdentityError::InvalidKey("secret key must be 32 bytes".to_owned())
        })?;
        let key = SigningKey::from_bytes(&bytes);
        let certified = self.certificate()?.verifying_key()?;
        if key.verifying_key() != certified {
            return Err(IdentityError::InvalidKey(
                "private key does not match certificate".to_owned(),
            ));
        }
        Ok(key)
    }
}
