use std::io;

use ed25519_dalek::{Signature, Verifier as _};
use thiserror::Error;
use tracing::debug;

use super::{mode::VerifyRequest, router::InvocationContext};
use crate::{
    signature::{
        ALGORITHM, EnvelopeError, SignatureEnvelope, message_digest,
        signed_payload,
    },
    store::{Certificate, Identities, IdentityError},
};

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("failed to read {name}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse signature")]
    Parse(#[from] EnvelopeError),
    #[error("detached signature requires the signed content as a second file")]
    MissingContent,
    #[error("signature is not detached but content was also given")]
    UnexpectedContent,
    #[error("certificate for signer {0} is not available")]
    UnknownSigner(String),
    #[error("invalid signer certificate")]
    Certificate(#[from] IdentityError),
    #[error("bad signature from \"{0}\"")]
    BadSignature(String),
    #[error("failed to write verification result")]
    Write(#[from] io::Error),
}

/// Verify a signature envelope against its content.
///
/// A human-readable summary goes to the error stream; status lines go to the
/// stream the request selects.
pub fn verify(
    request: &VerifyRequest,
    ctx: &mut InvocationContext<'_>,
) -> Result<(), VerifyError> {
    let read_error = |name: String| {
        move |source: io::Error| VerifyError::Read { name, source }
    };
    let data = request
        .signature
        .read(&mut *ctx.streams.input)
        .map_err(read_error(request.signature.to_string()))?;
    let envelope = SignatureEnvelope::decode(&data)?;

    let content = match (envelope.content_bytes()?, &request.content) {
        (Some(_), Some(_)) => return Err(VerifyError::UnexpectedContent),
        (Some(content), None) => content,
        (None, Some(source)) => source
            .read(&mut *ctx.streams.input)
            .map_err(read_error(source.to_string()))?,
        (None, None) => return Err(VerifyError::MissingContent),
    };

    ctx.streams.status(request.status, "NEWSIG")?;

    let (cert, trust) = signer_certificate(&envelope, &ctx.identities)?;
    let key_id = request.keyid_format.render(&cert);
    let subject = cert.info().subject.clone();
    writeln!(
        ctx.streams.error,
        "certsign: Signature made using certificate ID 0x{key_id}"
    )?;

    if !signature_matches(&envelope, &cert, &content)? {
        writeln!(ctx.streams.error, "certsign: Bad signature from \"{subject}\"")?;
        ctx.streams
            .status(request.status, &format!("BADSIG {key_id} {subject}"))?;
        return Err(VerifyError::BadSignature(subject));
    }

    writeln!(ctx.streams.error, "certsign: Good signature from \"{subject}\"")?;
    ctx.streams
        .status(request.status, &format!("GOODSIG {key_id} {subject}"))?;
    ctx.streams.status(
        request.status,
        &format!("VALIDSIG {} {}", cert.fingerprint(), envelope.signed_at),
    )?;
    if trust == Trust::Undefined {
        writeln!(
            ctx.streams.error,
            "certsign: WARNING: certificate 0x{key_id} is not in the \
             certificate store; the signer's identity is not verified"
        )?;
    }
    ctx.streams.status(request.status, trust.status_line())?;
    debug!(signer = %envelope.signer, ?trust, "signature verified");
    Ok(())
}

/// How far a good signature's certificate can be relied on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trust {
    /// The certificate is held by the local store.
    Full,
    /// The certificate came only from the envelope.
    Undefined,
}

impl Trust {
    fn status_line(self) -> &'static str {
        match self {
            Trust::Full => "TRUST_FULLY 0 shell",
            Trust::Undefined => "TRUST_UNDEFINED 0 shell",
        }
    }
}

/// The signer's certificate, from the local store or else the envelope.
///
/// Certificates carry no issuer signature, so an embedded chain proves
/// nothing; only a certificate the store holds is trusted.
fn signer_certificate(
    envelope: &SignatureEnvelope,
    identities: &Identities,
) -> Result<(Certificate, Trust), VerifyError> {
    if let Some(cert) = identities.find_certificate(&envelope.signer) {
        return Ok((cert, Trust::Full));
    }
    for encoded in &envelope.certificates {
        let cert = Certificate::from_base64(encoded)?;
        if cert.fingerprint().eq_ignore_ascii_case(&envelope.signer) {
            return Ok((cert, Trust::Undefined));
        }
    }
    Err(VerifyError::UnknownSigner(envelope.signer.clone()))
}

fn signature_matches(
    envelope: &SignatureEnvelope,
    cert: &Certificate,
    content: &[u8],
) -> Result<bool, VerifyError> {
    if envelope.algorithm != ALGORITHM {
        return Ok(false);
    }
    let key = cert.verifying_key()?;
    let Ok(signature) = Signature::from_slice(&envelope.signature_bytes()?)
    else {
        return Ok(false);
    };
    let payload = signed_payload(&message_digest(content), envelope.signed_at);
    Ok(key.verify(&payload, &signature).is_ok())
}
