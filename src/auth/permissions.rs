//! Capability flags and the seeded role table
//!
//! Permissions are stored as a bitmask column, but only the five named
//! capabilities can be represented: [`PermissionSet::from_bits`] rejects any
//! other bit so a corrupted row surfaces as an error instead of a silent grant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single capability an identity's role may grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    /// Follow other identities
    Follow,
    /// Author blog posts
    Write,
    /// Comment on posts
    Comment,
    /// Toggle comment visibility
    Moderate,
    /// Site administration
    Administer,
}

impl Permission {
    pub const ALL: [Permission; 5] = [
        Permission::Follow,
        Permission::Write,
        Permission::Comment,
        Permission::Moderate,
        Permission::Administer,
    ];

    /// Bit value as stored in `roles.permissions`
    pub const fn bit(self) -> u8 {
        match self {
            Permission::Follow => 1,
            Permission::Write => 2,
            Permission::Comment => 4,
            Permission::Moderate => 8,
            Permission::Administer => 128,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Follow => write!(f, "FOLLOW"),
            Permission::Write => write!(f, "WRITE"),
            Permission::Comment => write!(f, "COMMENT"),
            Permission::Moderate => write!(f, "MODERATE"),
            Permission::Administer => write!(f, "ADMINISTER"),
        }
    }
}

/// Set of capabilities granted by a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PermissionSet(u8);

impl PermissionSet {
    const VALID_BITS: u8 = 1 | 2 | 4 | 8 | 128;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn of(permissions: &[Permission]) -> Self {
        permissions
            .iter()
            .fold(Self::empty(), |set, p| set.with(*p))
    }

    /// Parse a stored bitmask. Returns None if any unknown bit is set.
    pub fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::VALID_BITS != 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn with(self, permission: Permission) -> Self {
        Self(self.0 | permission.bit())
    }

    pub const fn contains(self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    pub const fn is_superset_of(self, other: PermissionSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn iter(self) -> impl Iterator<Item = Permission> {
        Permission::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl Serialize for PermissionSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(None)?;
        for p in self.iter() {
            seq.serialize_element(&p)?;
        }
        seq.end()
    }
}

/// The three roles seeded at bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoleKind {
    User,
    Moderator,
    Administrator,
}

impl RoleKind {
    pub const ALL: [RoleKind; 3] = [RoleKind::User, RoleKind::Moderator, RoleKind::Administrator];

    /// Role assigned to new identities
    pub const DEFAULT: RoleKind = RoleKind::User;

    pub fn name(self) -> &'static str {
        match self {
            RoleKind::User => "User",
            RoleKind::Moderator => "Moderator",
            RoleKind::Administrator => "Administrator",
        }
    }

    pub fn permissions(self) -> PermissionSet {
        let user = PermissionSet::of(&[Permission::Follow, Permission::Write, Permission::Comment]);
        match self {
            RoleKind::User => user,
            RoleKind::Moderator => user.with(Permission::Moderate),
            RoleKind::Administrator => user
                .with(Permission::Moderate)
                .with(Permission::Administer),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
