mod storage;
mod writers;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::backend::{DemoBackend, DemoToken};
use crate::role::Role;

pub use storage::{FileStorage, MemoryStorage, SessionStorage, StorageError};
pub use writers::{writer_for, AdminWriter, CredentialWriter, CustomerWriter, StaffWriter};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialProfile {
    pub outlet_id: Option<String>,
    pub display_name: Option<String>,
    pub employee_id: Option<String>,
    pub session_id: Option<String>,
}

/// An issued demo identity. Immutable once fetched.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub role: Role,
    pub token: String,
    pub profile: CredentialProfile,
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(role: Role, token: impl Into<String>, profile: CredentialProfile) -> Self {
        Self {
            role,
            token: token.into(),
            profile,
            issued_at: Utc::now(),
        }
    }

    pub fn from_token(token: DemoToken) -> Self {
        Self::new(
            token.role,
            token.access_token,
            CredentialProfile {
                outlet_id: token.outlet_id,
                display_name: token.display_name,
                employee_id: token.employee_id,
                session_id: token.session_id,
            },
        )
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("role", &self.role)
            .field("token", &"<redacted>")
            .field("profile", &self.profile)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchReport {
    pub fetched: Vec<Role>,
    pub failed: Vec<(Role, String)>,
}

impl FetchReport {
    /// Only a complete report marks the demo initialized.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && Role::ALL.iter().all(|role| self.fetched.contains(role))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum VaultError {
    #[error("no credential stored for role '{0}'")]
    MissingCredential(Role),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Holds one credential per role and writes the active one into session
/// storage. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CredentialVault {
    storage: Arc<dyn SessionStorage>,
    credentials: Arc<Mutex<BTreeMap<Role, Credential>>>,
}

impl CredentialVault {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            storage,
            credentials: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn storage(&self) -> &Arc<dyn SessionStorage> {
        &self.storage
    }

    fn credentials(&self) -> MutexGuard<'_, BTreeMap<Role, Credential>> {
        self.credentials
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetch every role's credential in parallel. Failures leave that role
    /// unavailable; successes are kept either way.
    pub async fn fetch_all(&self, backend: &dyn DemoBackend) -> FetchReport {
        let results = join_all(Role::ALL.iter().map(|role| async move {
            (*role, backend.fetch_demo_token(*role).await)
        }))
        .await;

        let mut report = FetchReport::default();
        for (role, result) in results {
            match result {
                Ok(token) => {
                    self.store(Credential::from_token(token));
                    report.fetched.push(role);
                }
                Err(err) => {
                    tracing::warn!(%role, error = %err, "failed to fetch demo credential");
                    report.failed.push((role, err.to_string()));
                }
            }
        }
        report
    }

    pub fn store(&self, credential: Credential) {
        self.credentials().insert(credential.role, credential);
    }

    pub fn get(&self, role: Role) -> Option<Credential> {
        self.credentials().get(&role).cloned()
    }

    pub fn has(&self, role: Role) -> bool {
        self.credentials().contains_key(&role)
    }

    pub fn available_roles(&self) -> Vec<Role> {
        self.credentials().keys().copied().collect()
    }

    /// Write `credential` in its role's storage shape. Returns the number of
    /// keys that changed, so a repeat injection returns 0.
    pub fn inject(&self, credential: &Credential) -> Result<usize, VaultError> {
        let changed = writer_for(credential.role).write(self.storage.as_ref(), credential)?;
        if changed > 0 {
            tracing::debug!(role = %credential.role, changed, "injected demo credential");
        }
        Ok(changed)
    }

    pub fn inject_role(&self, role: Role) -> Result<usize, VaultError> {
        let credential = self.get(role).ok_or(VaultError::MissingCredential(role))?;
        self.inject(&credential)
    }

    /// Remove every key any writer owns and forget all credentials.
    pub fn clear(&self) -> Result<(), VaultError> {
        for role in Role::ALL {
            writer_for(role).erase(self.storage.as_ref())?;
        }
        self.credentials().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeBackend;

    #[tokio::test]
    async fn fetch_all_reports_partial_failure() {
        let backend = FakeBackend::new().fail_role(Role::Customer);
        let vault = CredentialVault::in_memory();

        let report = vault.fetch_all(&backend).await;
        assert!(!report.is_complete());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, Role::Customer);
        assert!(vault.has(Role::Staff));
        assert!(vault.has(Role::Admin));
        assert!(!vault.has(Role::Customer));
    }

    #[tokio::test]
    async fn fetch_all_requests_every_role_once() {
        let backend = FakeBackend::new();
        let vault = CredentialVault::in_memory();

        let report = vault.fetch_all(&backend).await;
        assert!(report.is_complete());
        assert_eq!(backend.token_requests().len(), 3);
        assert_eq!(vault.available_roles().len(), 3);
    }

    #[tokio::test]
    async fn inject_is_idempotent_and_clear_removes_everything() {
        let backend = FakeBackend::new();
        let vault = CredentialVault::in_memory();
        vault.fetch_all(&backend).await;

        assert!(vault.inject_role(Role::Staff).unwrap() > 0);
        let before = vault.storage().entries();
        assert_eq!(vault.inject_role(Role::Staff).unwrap(), 0);
        assert_eq!(vault.storage().entries(), before);

        vault.inject_role(Role::Customer).unwrap();
        vault.inject_role(Role::Admin).unwrap();
        vault.clear().unwrap();
        assert!(vault.storage().entries().is_empty());
        assert!(vault.available_roles().is_empty());
    }

    #[test]
    fn missing_credential_is_reported() {
        let vault = CredentialVault::in_memory();
        let err = vault.inject_role(Role::Admin).unwrap_err();
        assert!(matches!(err, VaultError::MissingCredential(Role::Admin)));
    }

    #[test]
    fn debug_output_redacts_token() {
        let credential = Credential::new(Role::Staff, "secret-token", CredentialProfile::default());
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }
}
