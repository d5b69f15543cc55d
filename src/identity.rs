//! # Viewer Identity
//!
//! The coordination layer never sees the domain's user model, only a
//! descriptor of who is calling. Anonymous and authenticated viewers must
//! never collide in cache keyspace, and raw untrusted strings must never
//! leak into keys.

use serde::{Deserialize, Serialize};

use crate::keyspace;

/// Who is invoking the coordination layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Anonymous,
    Authenticated {
        /// Numeric id when the fronting layer has one
        id: Option<i64>,
        username: String,
    },
}

impl Identity {
    /// Convenience constructor for the common authenticated case
    pub fn user(id: i64, username: impl Into<String>) -> Self {
        Identity::Authenticated {
            id: Some(id),
            username: username.into(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Authenticated { .. })
    }

    /// Stable, sanitized token for cache keys: `guest`, `user-<id>`, or a
    /// sanitized username token when no numeric id is available.
    pub fn cache_token(&self) -> String {
        match self {
            Identity::Anonymous => "guest".to_string(),
            Identity::Authenticated { id: Some(id), .. } => format!("user-{id}"),
            Identity::Authenticated { id: None, username } => {
                let sanitized = keyspace::sanitize_token(username);
                if sanitized.is_empty() {
                    "user-unknown".to_string()
                } else {
                    format!("user-{sanitized}")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_token() {
        assert_eq!(Identity::Anonymous.cache_token(), "guest");
    }

    #[test]
    fn test_numeric_id_wins_over_username() {
        assert_eq!(Identity::user(42, "Marta").cache_token(), "user-42");
    }

    #[test]
    fn test_username_fallback_is_sanitized() {
        let identity = Identity::Authenticated {
            id: None,
            username: "Ms. Marta!!".to_string(),
        };
        assert_eq!(identity.cache_token(), "user-ms.marta");
    }

    #[test]
    fn test_degenerate_username_never_collides_with_guest() {
        let identity = Identity::Authenticated {
            id: None,
            username: "!!!".to_string(),
        };
        assert_eq!(identity.cache_token(), "user-unknown");
    }
}
