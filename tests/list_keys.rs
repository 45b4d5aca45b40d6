mod common;

use common::*;
use indoc::formatdoc;
use tempfile::TempDir;

#[test]
fn lists_signing_identities_and_warns_about_broken_ones() {
    let temp = TempDir::new().unwrap();
    let (alice, alice_record) = signer(1, "CN=Alice");
    let (bob, bob_record) = signer(2, "CN=Bob");
    write_store(
        temp.path(),
        vec![alice_record, encryption_only(3, "CN=Carol"), corrupt(4), bob_record],
    );

    let assert = run_certsign(temp.path(), &["--list-keys"]).assert().success();
    let output = assert.get_output();
    let stdout = String::from_utf8(output.stdout.clone()).unwrap();
    let stderr = String::from_utf8(output.stderr.clone()).unwrap();

    let expected = formatdoc! {"
               ID: {alice_fpr}
           Key ID: {alice_id}
              S/N: 1
        Algorithm: Ed25519
         Validity: 2025-01-01 00:00:00 +0000 UTC - 2030-01-01 00:00:00 +0000 UTC
           Issuer: CN=Test CA
          Subject: CN=Alice
           Emails: user1@example.com

               ID: {bob_fpr}
           Key ID: {bob_id}
              S/N: 2
        Algorithm: Ed25519
         Validity: 2025-01-01 00:00:00 +0000 UTC - 2030-01-01 00:00:00 +0000 UTC
           Issuer: CN=Test CA
          Subject: CN=Bob
           Emails: user2@example.com
        ",
        alice_fpr = alice.fingerprint(),
        alice_id = alice.long_key_id(),
        bob_fpr = bob.fingerprint(),
        bob_id = bob.long_key_id(),
    };
    assert_actual_expected!(stdout, expected);
    assert!(
        stderr.starts_with("WARNING: failed to get identity certificate: "),
        "{stderr}"
    );
    assert_eq!(stderr.lines().count(), 1);
}

#[test]
fn empty_store_lists_nothing() {
    let temp = TempDir::new().unwrap();
    write_store(temp.path(), Vec::new());
    run_certsign(temp.path(), &["--list-keys", "--keyid-format", "long"])
        .assert()
        .success()
        .stdout("")
        .stderr("");
}

#[test]
fn list_keys_takes_no_other_options() {
    let temp = TempDir::new().unwrap();
    write_store(temp.path(), Vec::new());
    run_certsign(temp.path(), &["--list-keys", "--armor"])
        .assert()
        .failure()
        .stdout("");
}
