use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Full user row as stored, including the password hash. Never serialized to
/// callers; read paths go through [`PublicUser`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub fullname: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_owner: Option<bool>,
    #[serde(default)]
    pub count: i64,
    /// Never written by this service; external tooling may set it and the
    /// min-balance filter reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// The only fields `add` will persist. Counter starts at 0 regardless of
/// caller input; any other field simply has nowhere to go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub fullname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_owner: Option<bool>,
}

/// The only fields `update` will persist: a full-item replace of exactly this
/// set, with the owner flag kept only when present on the input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdate {
    pub id: Uuid,
    pub username: String,
    pub fullname: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_url: Option<String>,
    pub count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_owner: Option<bool>,
}

/// User row with the password hash stripped and the creation instant
/// recovered from the UUIDv7 identifier.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub fullname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_owner: Option<bool>,
    pub count: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl From<UserRecord> for PublicUser {
    fn from(user: UserRecord) -> Self {
        let created_at = created_at_from_id(&user.id);
        Self {
            id: user.id,
            username: user.username,
            fullname: user.fullname,
            img_url: user.img_url,
            is_owner: user.is_owner,
            count: user.count,
            created_at,
        }
    }
}

/// The creation instant is not a stored field: UUIDv7 identifiers embed it.
/// Ids minted elsewhere (v4 and friends) have no timestamp to recover.
pub fn created_at_from_id(id: &Uuid) -> Option<OffsetDateTime> {
    let ts = id.get_timestamp()?;
    let (secs, nanos) = ts.to_unix();
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(secs) * 1_000_000_000 + i128::from(nanos))
        .ok()
}

/// Search filter: an optional case-insensitive substring over username OR
/// fullname, and an optional minimum score.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    #[serde(default)]
    pub txt: Option<String>,
    #[serde(default)]
    pub min_balance: Option<f64>,
}

impl UserFilter {
    pub fn matches(&self, user: &UserRecord) -> bool {
        if let Some(txt) = &self.txt {
            let needle = txt.to_lowercase();
            if !user.username.to_lowercase().contains(&needle)
                && !user.fullname.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(min) = self.min_balance {
            if user.score.is_none_or(|score| score < min) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: &str, fullname: &str) -> UserRecord {
        UserRecord {
            id: Uuid::now_v7(),
            username: username.into(),
            fullname: fullname.into(),
            password: "hash".into(),
            img_url: None,
            is_owner: None,
            count: 0,
            score: None,
        }
    }

    #[test]
    fn txt_filter_is_case_insensitive_substring() {
        let filter = UserFilter {
            txt: Some("al".into()),
            min_balance: None,
        };
        assert!(filter.matches(&user("Alice", "Alice Smith")));
        assert!(filter.matches(&user("bob", "Big Al")));
        assert!(!filter.matches(&user("carol", "Carol Jones")));
    }

    #[test]
    fn min_balance_requires_a_score_at_or_above_threshold() {
        let filter = UserFilter {
            txt: None,
            min_balance: Some(50.0),
        };
        let mut u = user("dora", "Dora");
        assert!(!filter.matches(&u), "scoreless user never matches");
        u.score = Some(49.9);
        assert!(!filter.matches(&u));
        u.score = Some(50.0);
        assert!(filter.matches(&u));
    }

    #[test]
    fn empty_filter_matches_everyone() {
        assert!(UserFilter::default().matches(&user("eve", "Eve")));
    }

    #[test]
    fn public_projection_never_serializes_the_hash() {
        let public = PublicUser::from(user("frank", "Frank"));
        let json = serde_json::to_value(&public).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("created_at").is_some(), "v7 id carries a timestamp");
    }

    #[test]
    fn update_type_cannot_carry_extraneous_fields() {
        // Deserializing a payload with an injected role works, but the field
        // has no slot in the struct and never reaches the store.
        let update: UserUpdate = serde_json::from_value(serde_json::json!({
            "id": Uuid::now_v7(),
            "username": "gina",
            "fullname": "Gina",
            "password": "hash",
            "count": 3,
            "role": "admin"
        }))
        .unwrap();
        let stored = serde_json::to_value(&update).unwrap();
        assert!(stored.get("role").is_none());
    }
}
