use std::sync::Arc;

use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use crate::error::ApiError;
use crate::store::{Item, TableStore, USERS_TABLE};
use crate::users::types::{NewUser, PublicUser, UserFilter, UserRecord, UserUpdate};

/// CRUD over the `users` table. Write paths go through the typed allowlist
/// records in [`crate::users::types`]; read paths strip the password hash
/// except for the internal [`UserRepo::get_by_username`].
#[derive(Clone)]
pub struct UserRepo {
    store: Arc<dyn TableStore>,
}

impl UserRepo {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    /// All users matching the filter, as public projections.
    pub async fn query(&self, filter: &UserFilter) -> Result<Vec<PublicUser>, ApiError> {
        let items = self.store.scan(USERS_TABLE).await.map_err(|e| {
            error!(error = %e, "cannot find users");
            e
        })?;
        let mut users = Vec::new();
        for item in items {
            let record = decode_user(item)?;
            if filter.matches(&record) {
                users.push(PublicUser::from(record));
            }
        }
        Ok(users)
    }

    /// Exact-id lookup; a missing row is a clean `NotFound`.
    pub async fn get_by_id(&self, user_id: Uuid) -> Result<PublicUser, ApiError> {
        let item = self
            .store
            .get(USERS_TABLE, "id", &user_id.to_string())
            .await
            .map_err(|e| {
                error!(user_id = %user_id, error = %e, "cannot get user by id");
                e
            })?;
        match item {
            Some(item) => Ok(PublicUser::from(decode_user(item)?)),
            None => Err(ApiError::NotFound),
        }
    }

    /// Exact username match over a full scan (username is not a table key).
    /// Returns the complete row including the password hash; for credential
    /// checks only, never for responses.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>, ApiError> {
        let items = self.store.scan(USERS_TABLE).await.map_err(|e| {
            error!(username, error = %e, "cannot get user by username");
            e
        })?;
        for item in items {
            let record = decode_user(item)?;
            if record.username == username {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Idempotent: removing an absent user succeeds.
    pub async fn remove(&self, user_id: Uuid) -> Result<(), ApiError> {
        self.store
            .delete(USERS_TABLE, "id", &user_id.to_string())
            .await
            .map_err(|e| {
                error!(user_id = %user_id, error = %e, "cannot remove user");
                e
            })
    }

    /// Full-item replace of exactly the allowlisted fields.
    pub async fn update(&self, user: UserUpdate) -> Result<UserRecord, ApiError> {
        let item = encode(&user)?;
        self.store.put(USERS_TABLE, "id", item).await.map_err(|e| {
            error!(user_id = %user.id, error = %e, "cannot update user");
            e
        })?;
        Ok(UserRecord {
            id: user.id,
            username: user.username,
            fullname: user.fullname,
            password: user.password,
            img_url: user.img_url,
            is_owner: user.is_owner,
            count: user.count,
            score: None,
        })
    }

    /// Insert with a fresh UUIDv7 id and the counter forced to 0.
    pub async fn add(&self, user: NewUser) -> Result<UserRecord, ApiError> {
        let record = UserRecord {
            id: Uuid::now_v7(),
            username: user.username,
            fullname: user.fullname,
            password: user.password,
            img_url: user.img_url,
            is_owner: user.is_owner,
            count: 0,
            score: None,
        };
        let item = encode(&record)?;
        self.store.put(USERS_TABLE, "id", item).await.map_err(|e| {
            error!(error = %e, "cannot add user");
            e
        })?;
        Ok(record)
    }

    /// Atomic counter bump; returns the updated row.
    pub async fn increment_count(&self, user_id: Uuid) -> Result<UserRecord, ApiError> {
        let item = self
            .store
            .increment(USERS_TABLE, "id", &user_id.to_string(), "count")
            .await
            .map_err(|e| {
                error!(user_id = %user_id, error = %e, "cannot update user count");
                e
            })?;
        decode_user(item)
    }
}

fn encode<T: serde::Serialize>(record: &T) -> Result<Item, ApiError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::Internal(anyhow::anyhow!(
            "user record did not serialize to an object"
        ))),
        Err(e) => Err(ApiError::Internal(e.into())),
    }
}

fn decode_user(item: Item) -> Result<UserRecord, ApiError> {
    serde_json::from_value(Value::Object(item)).map_err(|e| {
        error!(error = %e, "malformed user row");
        ApiError::Storage(anyhow::Error::new(e).context("decode user row"))
    })
}
