//! Signature envelope produced by `--sign` and consumed by `--verify`.
//!
//! The envelope is JSON. With `--armor` it is wrapped as a PEM-style
//! `SIGNED MESSAGE` block; [`SignatureEnvelope::decode`] accepts either form.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const ENVELOPE_VERSION: u8 = 1;
pub const ALGORITHM: &str = "ed25519-sha256";
pub const ARMOR_LABEL: &str = "SIGNED MESSAGE";

const DOMAIN_TAG: &[u8] = b"certsign-v1\0";
const ARMOR_LINE_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEnvelope {
    pub version: u8,
    pub algorithm: String,
    /// Fingerprint of the signing certificate.
    pub signer: String,
    /// Seconds since the Unix epoch.
    pub signed_at: u64,
    /// Base64 certificates, leaf first.
    #[serde(default)]
    pub certificates: Vec<String>,
    /// Base64 message; absent for detached signatures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Base64 Ed25519 signature over [`signed_payload`].
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampToken {
    pub authority: String,
    /// Base64 token as returned by the authority.
    pub token: String,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed armor: {0}")]
    Armor(&'static str),
    #[error("invalid base64")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid signature envelope")]
    Json(#[from] serde_json::Error),
    #[error("unsupported envelope version {0}")]
    Version(u8),
}

pub fn message_digest(message: &[u8]) -> [u8; 32] {
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&Sha256::digest(message));
    digest
}

/// Bytes actually covered by the signature.
pub fn signed_payload(digest: &[u8; 32], signed_at: u64) -> Vec<u8> {
    let mut payload = Vec::with_capacity(DOMAIN_TAG.len() + 32 + 8);
    payload.extend_from_slice(DOMAIN_TAG);
    payload.extend_from_slice(digest);
    payload.extend_from_slice(&signed_at.to_be_bytes());
    payload
}

impl SignatureEnvelope {
    pub fn is_detached(&self) -> bool { self.content.is_none() }

    pub fn encode(&self, armor: bool) -> Result<Vec<u8>, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        if armor {
            Ok(armor_block(&json).into_bytes())
        } else {
            Ok(json)
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, EnvelopeError> {
        let trimmed = data.trim_ascii();
        let json = if trimmed.starts_with(b"-----BEGIN ") {
            dearmor(trimmed)?
        } else {
            trimmed.to_vec()
        };
        let envelope: Self = serde_json::from_slice(&json)?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(EnvelopeError::Version(envelope.version));
        }
        Ok(envelope)
    }

    pub fn content_bytes(&self) -> Result<Option<Vec<u8>>, EnvelopeError> {
        self.content
            .as_deref()
            .map(|content| STANDARD.decode(content))
            .transpose()
            .map_err(EnvelopeError::from)
    }

    pub fn signature_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(STANDARD.decode(&self.signature)?)
    }
}

fn armor_block(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = format!("-----BEGIN {ARMOR_LABEL}-----\n");
    for chunk in encoded.as_bytes().chunks(ARMOR_LINE_LEN) {
        // base64 output is ASCII
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&format!("-----END {ARMOR_LABEL}-----\n"));
    out
}

fn dearmor(data: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let text = std::str::from_utf8(data)
        .map_err(|_| EnvelopeError::Armor("armor is not text"))?;
    let mut lines = text.lines().map(str::trim);
    if lines.next() != Some(&format!("-----BEGIN {ARMOR_LABEL}-----")[..]) {
        return Err(EnvelopeError::Armor("unexpected header"));
    }
    let end = format!("-----END {ARMOR_LABEL}-----");
    let mut body = String::new();
    for line in lines {
        if line == end {
            return Ok(STANDARD.decode(body)?);
        }
        body.push_str(line);
    }
    Err(EnvelopeError::Armor("missing footer"))
}
