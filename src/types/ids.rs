//! Newtype wrappers for domain identifiers.
//!
//! Repositories are identified by their `owner/name` pair everywhere: in search
//! results, in the ledger file, and in log fields. Keeping the pair in a typed
//! wrapper prevents passing a bare repo name where the full identifier is needed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when an `owner/name` string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid repository identifier {0:?}: expected owner/name")]
pub struct InvalidRepoId(pub String);

/// A repository identifier (`owner/name`).
///
/// Serialized as the plain `owner/name` string so the ledger file stays
/// compatible with entries written by hand or by older tooling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        RepoId {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parses an `owner/name` string.
    ///
    /// Both segments must be non-empty and there must be exactly one slash.
    pub fn parse(s: &str) -> Result<Self, InvalidRepoId> {
        let mut parts = s.trim().split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
                Ok(RepoId::new(owner, name))
            }
            _ => Err(InvalidRepoId(s.to_string())),
        }
    }

    /// Directory-safe form used for local checkouts (`owner__name`).
    pub fn dir_name(&self) -> String {
        format!("{}__{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoId {
    type Err = InvalidRepoId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RepoId::parse(s)
    }
}

impl TryFrom<String> for RepoId {
    type Error = InvalidRepoId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        RepoId::parse(&s)
    }
}

impl From<RepoId> for String {
    fn from(id: RepoId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_accepts_owner_and_name() {
        let id = RepoId::parse("octo/widget").unwrap();
        assert_eq!(id.owner, "octo");
        assert_eq!(id.name, "widget");
        assert_eq!(id.to_string(), "octo/widget");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(RepoId::parse("").is_err());
        assert!(RepoId::parse("octo").is_err());
        assert!(RepoId::parse("octo/").is_err());
        assert!(RepoId::parse("/widget").is_err());
        assert!(RepoId::parse("a/b/c").is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = RepoId::new("a", "b");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"a/b\"");
        let parsed: RepoId = serde_json::from_str("\"a/b\"").unwrap();
        assert_eq!(parsed, id);
        assert!(serde_json::from_str::<RepoId>("\"nope\"").is_err());
    }

    #[test]
    fn dir_name_is_filesystem_safe() {
        assert_eq!(RepoId::new("octo", "widget").dir_name(), "octo__widget");
    }

    proptest! {
        #[test]
        fn display_then_parse_is_identity(owner in "[A-Za-z0-9-]{1,20}", name in "[A-Za-z0-9._-]{1,30}") {
            let id = RepoId::new(owner, name);
            prop_assert_eq!(RepoId::parse(&id.to_string()).unwrap(), id);
        }
    }
}
