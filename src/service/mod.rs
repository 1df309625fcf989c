//! Authorization and state-transition rules.
//!
//! Every operation takes an already-authenticated actor and a [`Store`], checks
//! its rules before writing anything, and reports failures through
//! [`crate::error::Error`].
//!
//! [`Store`]: crate::store::Store

pub mod access;
pub mod agreements;
pub mod collaboration;
pub mod conversations;
pub mod projects;
pub mod resources;
mod sensitive;

pub use sensitive::classify;

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::store::{SqliteStore, Store};
    use crate::types::{User, UserType};

    pub fn open_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    pub fn seed_user(store: &SqliteStore, username: &str, user_type: UserType) -> User {
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            user_type,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_user(&user).unwrap();
        user
    }
}
