use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::auth::password::hash_password;
use crate::auth::user::User;

/// Typed failures of the credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username is already taken")]
    UsernameTaken,
    #[error("user not found")]
    NotFound,
    #[error("failed to hash password")]
    HashingFailed(#[source] bcrypt::BcryptError),
    #[error("credential storage unavailable")]
    Unavailable(#[from] sqlx::Error),
}

/// Durable user storage keyed by unique username. Uniqueness is enforced by
/// the storage engine itself, never by a read-then-write check, so concurrent
/// creates of one username leave exactly one record behind.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Hashes the password and persists a new user record.
    async fn create(&self, username: &str, password: &str) -> Result<User, StoreError>;

    /// Exact-match (case-sensitive) lookup.
    async fn find_by_username(&self, username: &str) -> Result<User, StoreError>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    bcrypt_cost: u32,
}

impl PgStore {
    pub fn new(pool: PgPool, bcrypt_cost: u32) -> Self {
        Self { pool, bcrypt_cost }
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn create(&self, username: &str, password: &str) -> Result<User, StoreError> {
        let password_hash =
            hash_password(password, self.bcrypt_cost).map_err(StoreError::HashingFailed)?;
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_hash)
            VALUES ($1, $2)
            RETURNING id, username, password_hash, created_at
            "#,
        )
        .bind(username)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .map_or(false, |db| db.is_unique_violation())
            {
                StoreError::UsernameTaken
            } else {
                StoreError::Unavailable(e)
            }
        })
    }

    async fn find_by_username(&self, username: &str) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        user.ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::atomic::{AtomicI64, Ordering};
#[cfg(test)]
use std::sync::Mutex;

/// In-memory store standing in for Postgres in unit tests.
#[cfg(test)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, User>>,
    next_id: AtomicI64,
    bcrypt_cost: u32,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new(bcrypt_cost: u32) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            bcrypt_cost,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create(&self, username: &str, password: &str) -> Result<User, StoreError> {
        use std::collections::hash_map::Entry;

        // hash before taking the lock
        let password_hash =
            hash_password(password, self.bcrypt_cost).map_err(StoreError::HashingFailed)?;
        let mut users = self.users.lock().expect("store lock poisoned");
        match users.entry(username.to_string()) {
            Entry::Occupied(_) => Err(StoreError::UsernameTaken),
            Entry::Vacant(slot) => {
                let user = User {
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    username: username.to_string(),
                    password_hash,
                    created_at: time::OffsetDateTime::now_utc(),
                };
                slot.insert(user.clone());
                Ok(user)
            }
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<User, StoreError> {
        let users = self.users.lock().expect("store lock poisoned");
        users.get(username).cloned().ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;

    fn make_store() -> MemoryStore {
        MemoryStore::new(4)
    }

    #[tokio::test]
    async fn create_assigns_ids_and_stores_a_hash() {
        let store = make_store();
        let user = store.create("alice", "password123").await.expect("create");
        assert_eq!(user.id, 1);
        assert_eq!(user.username, "alice");
        assert_ne!(user.password_hash, "password123");
        assert!(verify_password("password123", &user.password_hash));

        let second = store.create("bob", "password456").await.expect("create");
        assert_eq!(second.id, 2);
    }

    #[tokio::test]
    async fn duplicate_username_keeps_the_first_record() {
        let store = make_store();
        store
            .create("alice", "first-password")
            .await
            .expect("create");
        let err = store.create("alice", "second-password").await.unwrap_err();
        assert!(matches!(err, StoreError::UsernameTaken));

        let user = store.find_by_username("alice").await.expect("find");
        assert!(verify_password("first-password", &user.password_hash));
        assert!(!verify_password("second-password", &user.password_hash));
    }

    #[tokio::test]
    async fn concurrent_creates_have_a_single_winner() {
        let store = make_store();
        let (a, b) = tokio::join!(
            store.create("alice", "password-one"),
            store.create("alice", "password-two"),
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser.unwrap_err(), StoreError::UsernameTaken));
        assert!(store.find_by_username("alice").await.is_ok());
    }

    #[tokio::test]
    async fn lookup_is_exact_and_case_sensitive() {
        let store = make_store();
        store.create("Alice", "password123").await.expect("create");
        assert!(matches!(
            store.find_by_username("alice").await.unwrap_err(),
            StoreError::NotFound
        ));
        assert!(store.find_by_username("Alice").await.is_ok());
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let store = make_store();
        assert!(matches!(
            store.find_by_username("nobody").await.unwrap_err(),
            StoreError::NotFound
        ));
    }
}
