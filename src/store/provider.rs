use std::{fmt, path::PathBuf, sync::Arc};

use tracing::debug;

use super::{Certificate, CredentialStore, FileStore, Identity, StoreError};

/// Loads the identities for one invocation.
///
/// Nothing is cached: every [`IdentityProvider::load`] opens the store and
/// enumerates it again, and the resulting [`Identities`] belong to the caller.
#[derive(Clone)]
pub struct IdentityProvider {
    store: Arc<dyn CredentialStore>,
}

impl IdentityProvider {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self { Self { store } }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileStore::new(path)))
    }

    pub fn load(&self) -> Result<Identities, StoreError> {
        let store = self.store.open()?;
        let identities = store.identities()?;
        debug!(count = identities.len(), "loaded identities");
        Ok(Identities(identities))
    }
}

impl fmt::Debug for IdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityProvider").finish_non_exhaustive()
    }
}

/// The ordered identities loaded for a single invocation.
#[derive(Default)]
pub struct Identities(Vec<Box<dyn Identity>>);

impl Identities {
    pub fn new(identities: Vec<Box<dyn Identity>>) -> Self { Self(identities) }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Identity> {
        self.0.iter().map(|identity| identity.as_ref())
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// First signing-capable identity whose certificate matches `user_id`.
    pub fn find_signer(
        &self,
        user_id: &str,
    ) -> Option<(&dyn Identity, Certificate)> {
        self.iter().find_map(|identity| match identity.certificate() {
            Ok(cert) if cert.can_sign() && cert.matches_user_id(user_id) => {
                Some((identity, cert))
            }
            Ok(_) => None,
            Err(err) => {
                debug!(error = %err, "skipping identity without certificate");
                None
            }
        })
    }

    /// Certificate with the given fingerprint, if any identity holds it.
    pub fn find_certificate(&self, fingerprint: &str) -> Option<Certificate> {
        self.iter()
            .filter_map(|identity| identity.certificate().ok())
            .find(|cert| cert.fingerprint().eq_ignore_ascii_case(fingerprint))
    }
}
