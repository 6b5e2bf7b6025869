//! User account store.
//!
//! Accounts are looked up by `(name, phone)`; there is no password. The
//! store is a trait seam so the handlers can be tested without a backing
//! database.

use crate::errors::UserStoreError;
use crate::state::Role;

use async_trait::async_trait;
use common::types::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Registration request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub phone: String,
    pub role: Role,
    /// Required for operators.
    #[serde(default)]
    pub vehicle_plate: Option<String>,
}

/// A stored account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub phone: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_plate: Option<String>,
    /// Unix seconds.
    pub created_at: i64,
}

/// Account storage.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Store a new account and return its ID.
    ///
    /// # Errors
    ///
    /// `Invalid` if a required field is blank, `Conflict` if the
    /// `(name, phone)` pair is already taken.
    async fn register(&self, user: NewUser) -> Result<UserId, UserStoreError>;

    /// Look up an account by name and phone.
    ///
    /// # Errors
    ///
    /// `NotFound` if no account matches.
    async fn login(&self, name: &str, phone: &str) -> Result<UserProfile, UserStoreError>;
}

/// Process-local store keyed by `(name, phone)`.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<(String, String), UserProfile>>,
}

impl InMemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

/// Trim and check the submitted fields, producing the stored form.
fn validate(user: NewUser) -> Result<NewUser, UserStoreError> {
    let name = user.name.trim().to_string();
    let phone = user.phone.trim().to_string();

    if name.is_empty() {
        return Err(UserStoreError::Invalid("name is required".to_string()));
    }
    if phone.is_empty() {
        return Err(UserStoreError::Invalid("phone is required".to_string()));
    }

    let vehicle_plate = user
        .vehicle_plate
        .map(|plate| plate.trim().to_string())
        .filter(|plate| !plate.is_empty());

    if user.role == Role::Operator && vehicle_plate.is_none() {
        return Err(UserStoreError::Invalid(
            "vehicle plate is required for operators".to_string(),
        ));
    }

    Ok(NewUser {
        name,
        phone,
        role: user.role,
        vehicle_plate,
    })
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn register(&self, user: NewUser) -> Result<UserId, UserStoreError> {
        let user = validate(user)?;
        let key = (user.name.clone(), user.phone.clone());

        let mut users = self.users.write().await;
        if users.contains_key(&key) {
            debug!(target: "ds.users", role = user.role.as_str(), "Duplicate registration");
            return Err(UserStoreError::Conflict(
                "a user with this name and phone already exists".to_string(),
            ));
        }

        let id = UserId::new();
        let role = user.role;
        users.insert(
            key,
            UserProfile {
                id,
                name: user.name,
                phone: user.phone,
                role,
                vehicle_plate: user.vehicle_plate,
                created_at: chrono::Utc::now().timestamp(),
            },
        );

        info!(target: "ds.users", user_id = %id, role = role.as_str(), "User registered");
        Ok(id)
    }

    async fn login(&self, name: &str, phone: &str) -> Result<UserProfile, UserStoreError> {
        let key = (name.trim().to_string(), phone.trim().to_string());
        let profile = self
            .users
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(UserStoreError::NotFound)?;

        debug!(target: "ds.users", user_id = %profile.id, "User logged in");
        Ok(profile)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn operator(name: &str, phone: &str, plate: Option<&str>) -> NewUser {
        NewUser {
            name: name.to_string(),
            phone: phone.to_string(),
            role: Role::Operator,
            vehicle_plate: plate.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let store = InMemoryUserStore::new();
        let id = store
            .register(operator("Asha", "9000000001", Some("KA-01-1234")))
            .await
            .unwrap();

        let profile = store.login("Asha", "9000000001").await.unwrap();
        assert_eq!(profile.id, id);
        assert_eq!(profile.role, Role::Operator);
        assert_eq!(profile.vehicle_plate.as_deref(), Some("KA-01-1234"));
    }

    #[tokio::test]
    async fn test_login_trims_credentials() {
        let store = InMemoryUserStore::new();
        store
            .register(operator(" Asha ", "9000000001 ", Some("KA-01")))
            .await
            .unwrap();

        assert!(store.login("Asha", " 9000000001").await.is_ok());
    }

    #[tokio::test]
    async fn test_login_unknown_user() {
        let store = InMemoryUserStore::new();
        assert_eq!(
            store.login("nobody", "0").await,
            Err(UserStoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let store = InMemoryUserStore::new();
        store
            .register(operator("Asha", "9000000001", Some("KA-01")))
            .await
            .unwrap();

        let result = store
            .register(operator("Asha", "9000000001", Some("KA-02")))
            .await;
        assert!(matches!(result, Err(UserStoreError::Conflict(_))));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_operator_requires_plate() {
        let store = InMemoryUserStore::new();

        for plate in [None, Some("   ")] {
            let result = store.register(operator("Asha", "9000000001", plate)).await;
            assert!(matches!(result, Err(UserStoreError::Invalid(_))));
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_officer_without_plate() {
        let store = InMemoryUserStore::new();
        let officer = NewUser {
            name: "Ravi".to_string(),
            phone: "9000000002".to_string(),
            role: Role::Officer,
            vehicle_plate: None,
        };

        store.register(officer).await.unwrap();
        let profile = store.login("Ravi", "9000000002").await.unwrap();
        assert_eq!(profile.role, Role::Officer);
        assert!(profile.vehicle_plate.is_none());
    }

    #[tokio::test]
    async fn test_blank_fields_rejected() {
        let store = InMemoryUserStore::new();
        assert!(matches!(
            store.register(operator("", "1", Some("KA"))).await,
            Err(UserStoreError::Invalid(_))
        ));
        assert!(matches!(
            store.register(operator("Asha", " ", Some("KA"))).await,
            Err(UserStoreError::Invalid(_))
        ));
    }
}
