use base64::{Engine as _, engine::general_purpose::STANDARD};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::IdentityError;

/// Key usage bit allowing the certified key to make digital signatures.
pub const KEY_USAGE_DIGITAL_SIGNATURE: u16 = 1 << 0;
/// Key usage bit for non-repudiation / content commitment.
pub const KEY_USAGE_CONTENT_COMMITMENT: u16 = 1 << 1;
/// Key usage bit for key encipherment.
pub const KEY_USAGE_KEY_ENCIPHERMENT: u16 = 1 << 2;
/// Key usage bit allowing the key to sign other certificates.
pub const KEY_USAGE_CERT_SIGN: u16 = 1 << 5;

const LONG_KEY_ID_LEN: usize = 16;

/// The fields carried by an encoded certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// Serial number as lowercase hex.
    pub serial: String,
    pub subject: String,
    pub issuer: String,
    #[serde(default)]
    pub emails: Vec<String>,
    pub not_before: String,
    pub not_after: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    pub key_usage: u16,
    #[serde(default)]
    pub is_ca: bool,
    /// Ed25519 public key as hex.
    pub public_key: String,
}

fn default_algorithm() -> String { "Ed25519".to_owned() }

/// A certificate together with the exact bytes it was decoded from.
///
/// The fingerprint is computed over those bytes, so a certificate read back
/// from a store or a signature keeps the fingerprint it was issued with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    info: CertificateInfo,
    raw: Vec<u8>,
}

impl Certificate {
    pub fn new(info: CertificateInfo) -> Result<Self, IdentityError> {
        let raw = serde_json::to_vec(&info).map_err(|err| {
            IdentityError::InvalidCertificate(err.to_string())
        })?;
        Ok(Self { info, raw })
    }

    pub fn from_base64(encoded: &str) -> Result<Self, IdentityError> {
        let raw = STANDARD.decode(encoded.trim()).map_err(|err| {
            IdentityError::InvalidCertificate(format!("bad base64: {err}"))
        })?;
        let info = serde_json::from_slice(&raw).map_err(|err| {
            IdentityError::InvalidCertificate(err.to_string())
        })?;
        Ok(Self { info, raw })
    }

    pub fn to_base64(&self) -> String { STANDARD.encode(&self.raw) }

    pub fn info(&self) -> &CertificateInfo { &self.info }

    /// Upper-case hex SHA-256 of the encoded certificate.
    pub fn fingerprint(&self) -> String {
        hex::encode_upper(Sha256::digest(&self.raw))
    }

    /// The last 16 hex digits of the fingerprint.
    pub fn long_key_id(&self) -> String {
        let fingerprint = self.fingerprint();
        fingerprint[fingerprint.len() - LONG_KEY_ID_LEN..].to_owned()
    }

    /// Leaf certificates whose key may make digital signatures.
    pub fn can_sign(&self) -> bool {
        self.info.key_usage & KEY_USAGE_DIGITAL_SIGNATURE != 0
            && !self.info.is_ca
    }

    pub fn is_self_signed(&self) -> bool {
        self.info.subject == self.info.issuer
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey, IdentityError> {
        let bytes = hex::decode(&self.info.public_key).map_err(|err| {
            IdentityError::InvalidCertificate(format!(
                "bad public key hex: {err}"
            ))
        })?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            IdentityError::InvalidCertificate(
                "public key must be 32 bytes".to_owned(),
            )
        })?;
        VerifyingKey::from_bytes(&bytes).map_err(|err| {
            IdentityError::InvalidCertificate(err.to_string())
        })
    }

    /// Whether `user_id` names this certificate.
    ///
    /// Accepts the fingerprint (optionally `0x`-prefixed), a key id suffix of
    /// at least 8 hex digits, an email address, or part of the subject.
    pub fn matches_user_id(&self, user_id: &str) -> bool {
        let needle = user_id.trim();
        if needle.is_empty() {
            return false;
        }

        let hex_needle = needle
            .strip_prefix("0x")
            .or_else(|| needle.strip_prefix("0X"))
            .unwrap_or(needle)
            .to_ascii_uppercase();
        let fingerprint = self.fingerprint();
        if hex_needle.len() >= 8
            && hex_needle.chars().all(|c| c.is_ascii_hexdigit())
            && fingerprint.ends_with(&hex_needle)
        {
            return true;
        }

        let email = needle.trim_start_matches('<').trim_end_matches('>');
        if self
            .info
            .emails
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(email))
        {
            return true;
        }

        self.info
            .subject
            .to_lowercase()
            .contains(&needle.to_lowercase())
    }
}
