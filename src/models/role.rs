use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The closed set of roles known to the system. Role names arriving from the
/// outside (tokens, user-admin payloads, the roles table) must parse into one
/// of these variants; anything else is rejected rather than carried along as
/// a free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// The submitter role. "BUYER" is the legacy name still found in old
    /// seed data and tokens.
    #[serde(alias = "BUYER")]
    Imam,
    Finance,
    Auditor,
    Admin,
}

#[derive(Debug, Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IMAM" | "BUYER" => Ok(Role::Imam),
            "FINANCE" => Ok(Role::Finance),
            "AUDITOR" => Ok(Role::Auditor),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Imam => "IMAM",
            Role::Finance => "FINANCE",
            Role::Auditor => "AUDITOR",
            Role::Admin => "ADMIN",
        };
        f.write_str(name)
    }
}
