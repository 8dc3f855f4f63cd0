// src/core/model/principal.rs

//! Identity types: a `Principal` is a platform SID resolved to a named
//! account, together with its classification.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Exact full names that are always treated as platform-reserved.
const SYSTEM_ACCOUNTS: &[&str] = &[
    "NT AUTHORITY\\SYSTEM",
    "NT AUTHORITY\\Authenticated Users",
    "BUILTIN\\Administrators",
    "BUILTIN\\Users",
    "BUILTIN\\Power Users",
    "CREATOR OWNER",
];

/// Full-name prefixes that mark a principal as platform-reserved.
const SYSTEM_PREFIXES: &[&str] = &["NT ", "BUILTIN\\", "NT SERVICE\\"];

/// The resolved category of an account, as reported by the platform lookup.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PrincipalKind {
    User,
    Group,
    WellKnownGroup,
    Alias,
    #[default]
    Unknown,
}

impl PrincipalKind {
    /// Whether the platform may enumerate members for this kind of account.
    pub fn is_group_like(self) -> bool {
        matches!(
            self,
            PrincipalKind::Group | PrincipalKind::WellKnownGroup | PrincipalKind::Alias
        )
    }
}

/// An identity resolved from a platform SID.
///
/// `full_name` is always `domain\name`; for unresolvable SIDs it carries the
/// `Unknown SID: <sid>` marker produced by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub sid: String,
    pub name: String,
    pub domain: String,
    pub full_name: String,
    pub kind: PrincipalKind,
    pub is_system: bool,
}

impl Principal {
    /// Builds a resolved principal, deriving `full_name` and the system flag.
    pub fn new(
        sid: impl Into<String>,
        name: impl Into<String>,
        domain: impl Into<String>,
        kind: PrincipalKind,
    ) -> Self {
        let sid = sid.into();
        let name = name.into();
        let domain = domain.into();
        let full_name = format!("{domain}\\{name}");
        let is_system = Self::classify_system(&full_name);
        Self {
            sid,
            name,
            domain,
            full_name,
            kind,
            is_system,
        }
    }

    /// The degraded principal returned for a SID the platform cannot resolve.
    pub fn unresolved(sid: impl Into<String>) -> Self {
        let sid = sid.into();
        Self {
            name: "Unknown".to_string(),
            domain: "Unknown".to_string(),
            full_name: format!("Unknown SID: {sid}"),
            kind: PrincipalKind::Unknown,
            is_system: false,
            sid,
        }
    }

    /// The single source of truth for the platform-reserved classification.
    ///
    /// A principal is system if its full name is in the exact reserved set or
    /// begins with one of the reserved prefixes.
    pub fn classify_system(full_name: &str) -> bool {
        SYSTEM_ACCOUNTS.contains(&full_name)
            || SYSTEM_PREFIXES.iter().any(|p| full_name.starts_with(p))
    }

    /// Whether this SID could not be resolved to a named account.
    pub fn is_unresolved(&self) -> bool {
        self.kind == PrincipalKind::Unknown && self.full_name.starts_with("Unknown SID:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_classification_exact_and_prefix() {
        assert!(Principal::classify_system("NT AUTHORITY\\SYSTEM"));
        assert!(Principal::classify_system("BUILTIN\\Guests"));
        assert!(Principal::classify_system("NT SERVICE\\TrustedInstaller"));
        assert!(!Principal::classify_system("CORP\\jsmith"));
        assert!(!Principal::classify_system("CREATOR GROUP"));
        assert!(Principal::classify_system("CREATOR OWNER"));
    }

    #[test]
    fn unresolved_principal_shape() {
        let p = Principal::unresolved("S-1-5-21-1-2-3-1104");
        assert_eq!(p.name, "Unknown");
        assert_eq!(p.full_name, "Unknown SID: S-1-5-21-1-2-3-1104");
        assert_eq!(p.kind, PrincipalKind::Unknown);
        assert!(p.is_unresolved());
        assert!(!p.is_system);
    }
}
