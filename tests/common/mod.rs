#![allow(dead_code)]

/// Assert that two values are equal, printing the actual value first so
/// multi-line output is readable when they differ.
#[macro_export]
macro_rules! assert_actual_expected {
    ($actual:expr, $expected:expr $(,)?) => {
        match (&$actual, &$expected) {
            (actual_val, expected_val) => {
                if !(*actual_val == *expected_val) {
                    println!("Actual:\n{actual_val}");
                    similar_asserts::assert_eq!(actual: $actual, expected: $expected);
                }
            }
        }
    };
}

use std::path::{Path, PathBuf};

use assert_cmd::{Command, cargo::cargo_bin_cmd};
use certsign::store::{
    Certificate, CertificateInfo, IdentityRecord, KEY_USAGE_CERT_SIGN,
    KEY_USAGE_DIGITAL_SIGNATURE, KEY_USAGE_KEY_ENCIPHERMENT, StoreFile,
};
use ed25519_dalek::SigningKey;

/// Run the certsign binary against the store in `dir`.
pub fn run_certsign(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = cargo_bin_cmd!("certsign");
    cmd.current_dir(dir);
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("CERTSIGN_AUTH_TOKEN");
    cmd.env("CERTSIGN_STORE", store_file(dir));
    cmd.args(args);
    cmd
}

pub fn store_file(dir: &Path) -> PathBuf { dir.join("identities.json") }

pub fn key(seed: u8) -> SigningKey { SigningKey::from_bytes(&[seed; 32]) }

pub fn certificate(
    seed: u8,
    subject: &str,
    issuer: &str,
    key_usage: u16,
    is_ca: bool,
) -> Certificate {
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
        public_key: hex::encode(key(seed).verifying_key().to_bytes()),
    })
    .unwrap()
}

/// A signing identity issued by the shared test CA (seed 100).
pub fn signer(seed: u8, subject: &str) -> (Certificate, IdentityRecord) {
    let cert = certificate(
        seed,
        subject,
        "CN=Test CA",
        KEY_USAGE_DIGITAL_SIGNATURE,
        false,
    );
    let ca = certificate(
        100,
        "CN=Test CA",
        "CN=Test CA",
        KEY_USAGE_CERT_SIGN,
        true,
    );
    let record = IdentityRecord::new(&cert, &[ca], &key(seed));
    (cert, record)
}

/// An identity that cannot sign and must not be listed.
pub fn encryption_only(seed: u8, subject: &str) -> IdentityRecord {
    let cert = certificate(
        seed,
        subject,
        "CN=Test CA",
        KEY_USAGE_KEY_ENCIPHERMENT,
        false,
    );
    IdentityRecord::new(&cert, &[], &key(seed))
}

/// An identity whose certificate cannot be decoded.
pub fn corrupt(seed: u8) -> IdentityRecord {
    IdentityRecord {
        certificate: "not base64!".to_owned(),
        chain: Vec::new(),
        secret_key: hex::encode(key(seed).to_bytes()),
    }
}

/// Write `records` as the store for `dir`.
pub fn write_store(dir: &Path, records: Vec<IdentityRecord>) {
    StoreFile { identities: records }
        .save(&store_file(dir))
        .unwrap();
}
