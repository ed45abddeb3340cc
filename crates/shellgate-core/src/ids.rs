//! Branded ID newtypes.
//!
//! Sessions and links are addressed by distinct ID types implemented as
//! newtype wrappers around `String`, so a link ID can never be passed
//! where a session ID is expected.
//!
//! All IDs are server-generated UUID v7 (time-ordered) via
//! [`uuid::Uuid::now_v7`], which makes registry collisions practically
//! impossible and keeps log output sortable by creation time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new UUID v7 string (time-ordered).
fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier for an active shell session.
    SessionId
}

branded_id! {
    /// Unique identifier for one authenticated client WebSocket link.
    LinkId
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn new_ids_are_unique() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(SessionId::new()));
        }
    }

    #[test]
    fn ids_are_valid_uuids() {
        let id = SessionId::new();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn v7_ids_are_time_ordered() {
        let a = SessionId::new();
        // v7 ordering is only guaranteed across millisecond boundaries
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = SessionId::new();
        assert!(a.as_str() < b.as_str());
    }

    #[test]
    fn session_and_link_ids_are_distinct_types() {
        let s = SessionId::from("abc");
        let l = LinkId::from("abc");
        assert_eq!(s.as_str(), l.as_str());
    }

    #[test]
    fn serde_is_transparent() {
        let id = SessionId::from("sess-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"sess-1\"");
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_matches_inner() {
        let id = LinkId::from("link-9");
        assert_eq!(id.to_string(), "link-9");
    }

    #[test]
    fn into_inner_round_trip() {
        let id = SessionId::from("x".to_owned());
        assert_eq!(id.into_inner(), "x");
    }
}
