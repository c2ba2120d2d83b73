//! Statement-kind permission bitmask.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of statement being gated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    /// `SELECT`
    Select,
    /// `INSERT`
    Insert,
    /// `UPDATE`
    Update,
    /// `DELETE`
    Delete,
}

impl StatementKind {
    fn bit(self) -> u8 {
        match self {
            StatementKind::Select => Permissions::SELECT.0,
            StatementKind::Insert => Permissions::INSERT.0,
            StatementKind::Update => Permissions::UPDATE.0,
            StatementKind::Delete => Permissions::DELETE.0,
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
        })
    }
}

/// Bitmask over the four statement kinds. Defaults to deny-all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(u8);

impl Permissions {
    /// Nothing allowed.
    pub const NONE: Permissions = Permissions(0);
    /// `SELECT` allowed.
    pub const SELECT: Permissions = Permissions(1);
    /// `INSERT` allowed.
    pub const INSERT: Permissions = Permissions(1 << 1);
    /// `UPDATE` allowed.
    pub const UPDATE: Permissions = Permissions(1 << 2);
    /// `DELETE` allowed.
    pub const DELETE: Permissions = Permissions(1 << 3);
    /// Every statement kind allowed.
    pub const ALL: Permissions = Permissions(0b1111);

    /// Builds a mask from raw bits; unknown bits are dropped.
    pub fn from_bits(bits: u8) -> Self {
        Permissions(bits & Self::ALL.0)
    }

    /// Raw bits.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// True when `kind` is allowed.
    pub fn allows(self, kind: StatementKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

impl BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Self) -> Self::Output {
        Permissions(self.0 | rhs.0)
    }
}

/// Error returned when a permission list names an unknown kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission '{0}' (expected select, insert, update, delete, all or none)")]
pub struct ParsePermissionsError(pub String);

impl FromStr for Permissions {
    type Err = ParsePermissionsError;

    /// Parses a comma separated list such as `select,insert`, `all` or `none`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = Permissions::NONE;
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            out = out
                | match part.to_ascii_lowercase().as_str() {
                    "select" => Permissions::SELECT,
                    "insert" => Permissions::INSERT,
                    "update" => Permissions::UPDATE,
                    "delete" => Permissions::DELETE,
                    "all" => Permissions::ALL,
                    "none" => Permissions::NONE,
                    _ => return Err(ParsePermissionsError(part.to_owned())),
                };
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_denies_everything() {
        let perms = Permissions::default();
        for kind in [
            StatementKind::Select,
            StatementKind::Insert,
            StatementKind::Update,
            StatementKind::Delete,
        ] {
            assert!(!perms.allows(kind));
        }
    }

    #[test]
    fn bits_are_independent() {
        let perms = Permissions::SELECT | Permissions::DELETE;
        assert!(perms.allows(StatementKind::Select));
        assert!(!perms.allows(StatementKind::Insert));
        assert!(!perms.allows(StatementKind::Update));
        assert!(perms.allows(StatementKind::Delete));
        assert_eq!(perms.bits(), 0b1001);
    }

    #[test]
    fn parses_lists() {
        assert_eq!("select, update".parse::<Permissions>().unwrap().bits(), 0b0101);
        assert_eq!("ALL".parse::<Permissions>().unwrap(), Permissions::ALL);
        assert_eq!("".parse::<Permissions>().unwrap(), Permissions::NONE);
        assert!("drop".parse::<Permissions>().is_err());
        assert_eq!(Permissions::from_bits(0xff), Permissions::ALL);
    }
}
