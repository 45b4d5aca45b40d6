use std::{
    io,
    time::{SystemTime, UNIX_EPOCH},
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use ed25519_dalek::Signer as _;
use thiserror::Error;
use tracing::debug;

use super::{
    mode::{ConfigError, SignRequest},
    router::InvocationContext,
};
use crate::{
    signature::{
        ALGORITHM, ENVELOPE_VERSION, SignatureEnvelope, TimestampToken,
        message_digest, signed_payload,
    },
    store::{Certificate, IdentityError},
    tsa::{TimestampAuthority, TimestampError},
};

/// OpenPGP algorithm number for EdDSA, reported in `SIG_CREATED`.
const STATUS_PK_ALGO: u8 = 22;
/// OpenPGP hash algorithm number for SHA-256.
const STATUS_HASH_ALGO: u8 = 8;

/// How much of the certificate chain to embed in a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludeCerts(i32);

impl IncludeCerts {
    pub const DEFAULT: i32 = -2;

    pub fn new(value: i32) -> Result<Self, ConfigError> {
        if value < -3 {
            return Err(ConfigError::UnsupportedIncludeCerts(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> i32 { self.0 }

    /// Select from `chain`, which starts with the leaf.
    pub fn select(self, chain: &[Certificate]) -> Vec<Certificate> {
        match self.0 {
            // no issuer-location hints exist here, so -3 behaves like -2
            -3 | -2 => chain
                .iter()
                .enumerate()
                .filter(|(index, cert)| *index == 0 || !cert.is_self_signed())
                .map(|(_, cert)| cert.clone())
                .collect(),
            -1 => chain.to_vec(),
            n => chain.iter().take(n.unsigned_abs() as usize).cloned().collect(),
        }
    }
}

impl Default for IncludeCerts {
    fn default() -> Self { Self(Self::DEFAULT) }
}

#[derive(Debug, Error)]
pub enum SignError {
    #[error("could not find identity matching specified user-id: {0}")]
    NoIdentity(String),
    #[error("failed to get identity signer")]
    Key(#[source] IdentityError),
    #[error("failed to get identity certificate chain")]
    Chain(#[source] IdentityError),
    #[error("failed to read message from {name}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to timestamp signature")]
    Timestamp(#[from] TimestampError),
    #[error("failed to encode signature")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write signature")]
    Write(#[source] io::Error),
}

/// Sign the message named by `request` with the matching identity.
pub fn sign(
    request: &SignRequest,
    ctx: &mut InvocationContext<'_>,
    timestamp_authority: &dyn TimestampAuthority,
) -> Result<(), SignError> {
    let (identity, cert) = ctx
        .identities
        .find_signer(&request.user_id)
        .ok_or_else(|| SignError::NoIdentity(request.user_id.clone()))?;
    let key = identity.signing_key().map_err(SignError::Key)?;
    let mut chain = vec![cert.clone()];
    chain.extend(identity.chain().map_err(SignError::Chain)?);
    let certificates = request
        .include_certs
        .select(&chain)
        .iter()
        .map(Certificate::to_base64)
        .collect();

    let message = request.message.read(&mut *ctx.streams.input).map_err(
        |source| SignError::Read {
            name: request.message.to_string(),
            source,
        },
    )?;

    ctx.streams
        .status(request.status, "BEGIN_SIGNING")
        .map_err(SignError::Write)?;

    let signed_at = unix_now();
    let signature =
        key.sign(&signed_payload(&message_digest(&message), signed_at));

    let timestamp = match &request.timestamp_authority {
        Some(url) => {
            let token = timestamp_authority
                .timestamp(url, &message_digest(&signature.to_bytes()))?;
            Some(TimestampToken {
                authority: url.clone(),
                token: STANDARD.encode(token),
            })
        }
        None => None,
    };

    let fingerprint = cert.fingerprint();
    let envelope = SignatureEnvelope {
        version: ENVELOPE_VERSION,
        algorithm: ALGORITHM.to_owned(),
        signer: fingerprint.clone(),
        signed_at,
        certificates,
        content: (!request.detach).then(|| STANDARD.encode(&message)),
        signature: STANDARD.encode(signature.to_bytes()),
        timestamp,
    };
    let encoded = envelope.encode(request.armor)?;
    ctx.streams
        .output
        .write_all(&encoded)
        .map_err(SignError::Write)?;

    let kind = if request.detach { 'D' } else { 'S' };
    ctx.streams
        .status(
            request.status,
            &format!(
                "SIG_CREATED {kind} {STATUS_PK_ALGO} {STATUS_HASH_ALGO} 00 \
                 {signed_at} {fingerprint}"
            ),
        )
        .map_err(SignError::Write)?;

    debug!(signer = %fingerprint, detached = request.detach, "signed message");
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
