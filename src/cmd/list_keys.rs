use std::io::{self, Write};

use thiserror::Error;
use tracing::warn;

use super::{KeyIdFormat, mode::ListRequest, router::InvocationContext};
use crate::store::Certificate;

#[derive(Debug, Error)]
pub enum ListError {
    #[error("failed to write key listing")]
    Write(#[from] io::Error),
}

/// List the signing-capable identities in store order.
///
/// An identity whose certificate cannot be read is reported as a warning on
/// the error stream and skipped.
pub fn list_keys(
    request: &ListRequest,
    ctx: &mut InvocationContext<'_>,
) -> Result<(), ListError> {
    let mut listed = 0;
    for (index, identity) in ctx.identities.iter().enumerate() {
        let cert = match identity.certificate() {
            Ok(cert) => cert,
            Err(err) => {
                warn!(index, error = %err, "failed to get identity certificate");
                writeln!(
                    ctx.streams.error,
                    "WARNING: failed to get identity certificate: {err}"
                )?;
                continue;
            }
        };
        if !cert.can_sign() {
            continue;
        }

        if listed > 0 {
            writeln!(ctx.streams.output)?;
        }
        write_entry(&mut *ctx.streams.output, &cert, request.keyid_format)?;
        listed += 1;
    }
    Ok(())
}

fn write_entry(
    out: &mut dyn Write,
    cert: &Certificate,
    format: KeyIdFormat,
) -> io::Result<()> {
    let info = cert.info();
    writeln!(out, "       ID: {}", cert.fingerprint())?;
    writeln!(out, "   Key ID: {}", format.render(cert))?;
    writeln!(out, "      S/N: {}", info.serial)?;
    writeln!(out, "Algorithm: {}", info.algorithm)?;
    writeln!(out, " Validity: {} - {}", info.not_before, info.not_after)?;
    writeln!(out, "   Issuer: {}", info.issuer)?;
    writeln!(out, "  Subject: {}", info.subject)?;
    writeln!(out, "   Emails: {}", info.emails.join(", "))
}

#[cfg(test)]
mod tests {
    use std::io::empty;

    use indoc::formatdoc;

    use super::*;
    use crate::{
        cmd::streams::Streams,
        store::{Identities, Identity},
        testing::{broken_identity, ca_identity, signing_identity},
    };

    fn run(identities: Identities) -> (String, String) {
        let mut input = empty();
        let mut output = Vec::new();
        let mut error = Vec::new();
        {
            let mut ctx = InvocationContext {
                streams: Streams::new(&mut input, &mut output, &mut error),
                identities,
            };
            list_keys(&ListRequest { keyid_format: KeyIdFormat::Long }, &mut ctx)
                .unwrap();
        }
        (String::from_utf8(output).unwrap(), String::from_utf8(error).unwrap())
    }

    #[test]
    fn failed_identity_is_skipped_with_a_warning() {
        let first = signing_identity(1, "CN=First");
        let third = signing_identity(3, "CN=Third");
        let first_cert = first.certificate().unwrap();
        let third_cert = third.certificate().unwrap();

        let (output, error) = run(Identities::new(vec![
            Box::new(first),
            Box::new(broken_identity()),
            Box::new(third),
        ]));

        let expected = formatdoc! {"
                   ID: {first_fpr}
               Key ID: {first_id}
                  S/N: 1
            Algorithm: Ed25519
             Validity: 2025-01-01 00:00:00 +0000 UTC - 2030-01-01 00:00:00 +0000 UTC
               Issuer: CN=Test CA
              Subject: CN=First
               Emails: user1@example.com

                   ID: {third_fpr}
               Key ID: {third_id}
                  S/N: 3
            Algorithm: Ed25519
             Validity: 2025-01-01 00:00:00 +0000 UTC - 2030-01-01 00:00:00 +0000 UTC
               Issuer: CN=Test CA
              Subject: CN=Third
               Emails: user3@example.com
            ",
            first_fpr = first_cert.fingerprint(),
            first_id = first_cert.long_key_id(),
            third_fpr = third_cert.fingerprint(),
            third_id = third_cert.long_key_id(),
        };
        similar_asserts::assert_eq!(output, expected);
        assert_eq!(
            error,
            "WARNING: failed to get identity certificate: invalid \
             certificate: corrupt certificate\n"
        );
    }

    #[test]
    fn ca_and_non_signing_certificates_are_not_listed() {
        let (output, error) = run(Identities::new(vec![
            Box::new(ca_identity(9, "CN=Root")),
            Box::new(signing_identity(2, "CN=Leaf")),
        ]));
        assert!(!output.contains("CN=Root\n"));
        assert!(output.contains("  Subject: CN=Leaf\n"));
        assert!(!output.starts_with('\n'));
        assert!(error.is_empty());
    }

    #[test]
    fn empty_store_lists_nothing() {
        let (output, error) = run(Identities::default());
        assert!(output.is_empty());
        assert!(error.is_empty());
    }
}
