//! User record types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A user as held by the store.
///
/// `username` and `password_hash` are required; anything else in the stored
/// object lands in `attributes` and round-trips untouched.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique login name.
    pub username: String,

    /// Bcrypt hash. Older stores call this field `password`.
    #[serde(alias = "password")]
    pub password_hash: String,

    /// Optional profile attributes (email, display name, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl UserRecord {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The record without its password hash.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            username: self.username.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// Public view of a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extra_fields_are_kept() {
        let record: UserRecord = serde_json::from_value(json!({
            "username": "user1",
            "password_hash": "$2b$04$abc",
            "email": "user1@example.com",
            "quota": 5
        }))
        .unwrap();

        assert_eq!(record.username, "user1");
        assert_eq!(record.attributes["email"], "user1@example.com");
        assert_eq!(record.attributes["quota"], 5);

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["email"], "user1@example.com");
        assert_eq!(back["password_hash"], "$2b$04$abc");
    }

    #[test]
    fn test_legacy_password_field() {
        let record: UserRecord = serde_json::from_value(json!({
            "username": "testuser",
            "password": "$2b$04$legacy"
        }))
        .unwrap();
        assert_eq!(record.password_hash, "$2b$04$legacy");
        assert!(record.attributes.is_empty());
    }

    #[test]
    fn test_missing_hash_is_rejected() {
        let result = serde_json::from_value::<UserRecord>(json!({ "username": "nohash" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_profile_omits_hash() {
        let record = UserRecord::new("alice", "$2b$04$secret").with_attribute("email", "a@x.io");
        let json = serde_json::to_value(record.profile()).unwrap();
        assert_eq!(json, json!({ "username": "alice", "email": "a@x.io" }));
    }

    #[test]
    fn test_debug_redacts_hash() {
        let record = UserRecord::new("alice", "$2b$04$secret");
        assert!(!format!("{record:?}").contains("secret"));
    }
}
