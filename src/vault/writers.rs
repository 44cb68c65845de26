//! Per-role credential writers.
//!
//! Each role's sub-application reads its session from a different set of
//! storage keys. A writer knows that shape for one role and nothing else.

use serde::Serialize;
use serde_json::json;

use super::storage::{SessionStorage, StorageError};
use super::Credential;
use crate::role::Role;

pub const STAFF_ACCESS_TOKEN: &str = "fg_staff_access_token";
pub const STAFF_DEMO_TOKEN: &str = "fg_demo_staff_token";
pub const STAFF_OUTLET_ID: &str = "fg_staff_outlet_id";

pub const ADMIN_ACCESS_TOKEN: &str = "fg_admin_access_token";
pub const CLIENT_ADMIN_ACCESS_TOKEN: &str = "fg_client_admin_access_token";
pub const ADMIN_DEMO_TOKEN: &str = "fg_demo_admin_token";
pub const ADMIN_OUTLET_ID: &str = "fg_admin_outlet_id";

pub const CUSTOMER_TOKEN: &str = "fg_customer_token";
pub const CUSTOMER_DEMO_TOKEN: &str = "fg_demo_customer_token";
pub const CUSTOMER_AUTH_STORE: &str = "foodgrid-customer-auth";

pub trait CredentialWriter: Send + Sync {
    fn role(&self) -> Role;

    /// Every storage key this writer may own.
    fn keys(&self) -> &'static [&'static str];

    /// Key/value pairs for `credential`. Owned keys left out are removed.
    fn entries(&self, credential: &Credential) -> Result<Vec<(&'static str, String)>, StorageError>;

    /// Returns how many keys actually changed.
    fn write(&self, storage: &dyn SessionStorage, credential: &Credential) -> Result<usize, StorageError> {
        let entries = self.entries(credential)?;
        let mut changed = 0;
        for (key, value) in &entries {
            if storage.set(key, value)? {
                changed += 1;
            }
        }
        for key in self.keys() {
            if !entries.iter().any(|(written, _)| written == key) && storage.remove(key)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn erase(&self, storage: &dyn SessionStorage) -> Result<usize, StorageError> {
        let mut removed = 0;
        for key in self.keys() {
            if storage.remove(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

pub struct StaffWriter;
pub struct AdminWriter;
pub struct CustomerWriter;

impl CredentialWriter for StaffWriter {
    fn role(&self) -> Role {
        Role::Staff
    }

    fn keys(&self) -> &'static [&'static str] {
        &[STAFF_ACCESS_TOKEN, STAFF_DEMO_TOKEN, STAFF_OUTLET_ID]
    }

    fn entries(&self, credential: &Credential) -> Result<Vec<(&'static str, String)>, StorageError> {
        let mut entries = vec![
            (STAFF_ACCESS_TOKEN, credential.token.clone()),
            (STAFF_DEMO_TOKEN, credential.token.clone()),
        ];
        if let Some(outlet) = &credential.profile.outlet_id {
            entries.push((STAFF_OUTLET_ID, outlet.clone()));
        }
        Ok(entries)
    }
}

impl CredentialWriter for AdminWriter {
    fn role(&self) -> Role {
        Role::Admin
    }

    fn keys(&self) -> &'static [&'static str] {
        &[
            ADMIN_ACCESS_TOKEN,
            CLIENT_ADMIN_ACCESS_TOKEN,
            ADMIN_DEMO_TOKEN,
            ADMIN_OUTLET_ID,
        ]
    }

    fn entries(&self, credential: &Credential) -> Result<Vec<(&'static str, String)>, StorageError> {
        let mut entries = vec![
            (ADMIN_ACCESS_TOKEN, credential.token.clone()),
            (CLIENT_ADMIN_ACCESS_TOKEN, credential.token.clone()),
            (ADMIN_DEMO_TOKEN, credential.token.clone()),
        ];
        if let Some(outlet) = &credential.profile.outlet_id {
            entries.push((ADMIN_OUTLET_ID, outlet.clone()));
        }
        Ok(entries)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomerAuthState<'a> {
    token: &'a str,
    user: serde_json::Value,
    is_authenticated: bool,
}

#[derive(Serialize)]
struct CustomerAuthDocument<'a> {
    state: CustomerAuthState<'a>,
    version: u32,
}

impl CredentialWriter for CustomerWriter {
    fn role(&self) -> Role {
        Role::Customer
    }

    fn keys(&self) -> &'static [&'static str] {
        &[CUSTOMER_TOKEN, CUSTOMER_DEMO_TOKEN, CUSTOMER_AUTH_STORE]
    }

    fn entries(&self, credential: &Credential) -> Result<Vec<(&'static str, String)>, StorageError> {
        let profile = &credential.profile;
        let document = CustomerAuthDocument {
            state: CustomerAuthState {
                token: &credential.token,
                user: json!({
                    "name": profile.display_name.as_deref().unwrap_or("Demo Customer"),
                    "role": Role::Customer,
                    "sessionId": profile.session_id,
                }),
                is_authenticated: true,
            },
            version: 0,
        };
        Ok(vec![
            (CUSTOMER_TOKEN, credential.token.clone()),
            (CUSTOMER_DEMO_TOKEN, credential.token.clone()),
            (CUSTOMER_AUTH_STORE, serde_json::to_string(&document)?),
        ])
    }
}

pub fn writer_for(role: Role) -> &'static dyn CredentialWriter {
    match role {
        Role::Staff => &StaffWriter,
        Role::Admin => &AdminWriter,
        Role::Customer => &CustomerWriter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::storage::MemoryStorage;
    use crate::vault::CredentialProfile;

    fn credential(role: Role, token: &str, outlet: Option<&str>) -> Credential {
        Credential::new(
            role,
            token,
            CredentialProfile {
                outlet_id: outlet.map(str::to_string),
                display_name: Some("Demo".to_string()),
                employee_id: None,
                session_id: Some("sess-1".to_string()),
            },
        )
    }

    #[test]
    fn writer_selection_matches_role() {
        for role in Role::ALL {
            assert_eq!(writer_for(role).role(), role);
        }
    }

    #[test]
    fn staff_writer_fills_token_and_outlet_keys() {
        let storage = MemoryStorage::new();
        let changed = writer_for(Role::Staff)
            .write(&storage, &credential(Role::Staff, "tok-staff", Some("outlet-9")))
            .unwrap();
        assert_eq!(changed, 3);
        assert_eq!(storage.get(STAFF_ACCESS_TOKEN).as_deref(), Some("tok-staff"));
        assert_eq!(storage.get(STAFF_DEMO_TOKEN).as_deref(), Some("tok-staff"));
        assert_eq!(storage.get(STAFF_OUTLET_ID).as_deref(), Some("outlet-9"));
    }

    #[test]
    fn admin_writer_drops_stale_outlet() {
        let storage = MemoryStorage::new();
        storage.set(ADMIN_OUTLET_ID, "old-outlet").unwrap();
        writer_for(Role::Admin)
            .write(&storage, &credential(Role::Admin, "tok-admin", None))
            .unwrap();
        assert_eq!(
            storage.get(CLIENT_ADMIN_ACCESS_TOKEN).as_deref(),
            Some("tok-admin")
        );
        assert_eq!(storage.get(ADMIN_OUTLET_ID), None);
    }

    #[test]
    fn customer_writer_builds_auth_store_document() {
        let storage = MemoryStorage::new();
        writer_for(Role::Customer)
            .write(&storage, &credential(Role::Customer, "tok-cust", None))
            .unwrap();

        let raw = storage.get(CUSTOMER_AUTH_STORE).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["state"]["token"], "tok-cust");
        assert_eq!(doc["state"]["isAuthenticated"], true);
        assert_eq!(doc["state"]["user"]["sessionId"], "sess-1");
        assert_eq!(doc["version"], 0);
    }

    #[test]
    fn rewriting_same_credential_changes_nothing() {
        let storage = MemoryStorage::new();
        let cred = credential(Role::Customer, "tok-cust", None);
        writer_for(Role::Customer).write(&storage, &cred).unwrap();
        let before = storage.entries();
        assert_eq!(writer_for(Role::Customer).write(&storage, &cred).unwrap(), 0);
        assert_eq!(storage.entries(), before);
    }
}
