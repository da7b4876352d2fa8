//! The permission hierarchy.
//!
//! Roles form a small fixed tree:
//!
//! ```text
//! Owner
//! └── SuperAdmin
//!     └── Admin
//!         └── Moderator
//!             ├── Guest
//!             ├── Ban
//!             └── Kick
//! ```
//!
//! A role *implies* itself and everything below it, so a Moderator may
//! kick, and an Owner may do anything. Players store role *names*; the
//! hierarchy is only consulted when elevating an owner and when the
//! command front-end authorises a command.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

bitflags! {
    /// A set of roles packed into a byte, one bit per [`Role`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RoleSet: u8 {
        const OWNER = 1 << 0;
        const SUPER_ADMIN = 1 << 1;
        const ADMIN = 1 << 2;
        const MODERATOR = 1 << 3;
        const GUEST = 1 << 4;
        const BAN = 1 << 5;
        const KICK = 1 << 6;
    }
}

/// A single node in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Owner,
    SuperAdmin,
    Admin,
    Moderator,
    Guest,
    Ban,
    Kick,
}

impl Role {
    /// Every role, parents before children.
    pub const ALL: [Role; 7] = [
        Role::Owner,
        Role::SuperAdmin,
        Role::Admin,
        Role::Moderator,
        Role::Guest,
        Role::Ban,
        Role::Kick,
    ];

    /// The role's name as stored on player records.
    pub fn name(self) -> &'static str {
        match self {
            Self::Owner => "Owner",
            Self::SuperAdmin => "SuperAdmin",
            Self::Admin => "Admin",
            Self::Moderator => "Moderator",
            Self::Guest => "Guest",
            Self::Ban => "Ban",
            Self::Kick => "Kick",
        }
    }

    /// Looks a role up by its exact stored name. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.name() == name)
    }

    /// The role directly above this one, `None` for the root.
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::Owner => None,
            Self::SuperAdmin => Some(Self::Owner),
            Self::Admin => Some(Self::SuperAdmin),
            Self::Moderator => Some(Self::Admin),
            Self::Guest | Self::Ban | Self::Kick => Some(Self::Moderator),
        }
    }

    /// This role's own bit.
    pub fn flag(self) -> RoleSet {
        match self {
            Self::Owner => RoleSet::OWNER,
            Self::SuperAdmin => RoleSet::SUPER_ADMIN,
            Self::Admin => RoleSet::ADMIN,
            Self::Moderator => RoleSet::MODERATOR,
            Self::Guest => RoleSet::GUEST,
            Self::Ban => RoleSet::BAN,
            Self::Kick => RoleSet::KICK,
        }
    }

    /// Returns `true` if `self` is `other` or one of its ancestors.
    pub fn is_ancestor_or_self(self, other: Role) -> bool {
        let mut current = Some(other);
        while let Some(role) = current {
            if role == self {
                return true;
            }
            current = role.parent();
        }
        false
    }

    /// Everything this role grants: itself plus all descendants.
    pub fn implied(self) -> RoleSet {
        Self::ALL
            .into_iter()
            .filter(|descendant| self.is_ancestor_or_self(*descendant))
            .fold(RoleSet::empty(), |set, role| set | role.flag())
    }

    /// Returns `true` if holding `self` grants `target`.
    pub fn implies(self, target: Role) -> bool {
        self.implied().contains(target.flag())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing a name that isn't in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl RoleSet {
    /// The stored names of every role in the set.
    pub fn names(self) -> BTreeSet<String> {
        Role::ALL
            .into_iter()
            .filter(|role| self.contains(role.flag()))
            .map(|role| role.name().to_string())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// RoleHierarchy
// ---------------------------------------------------------------------------

/// Answers permission questions over role *names*.
///
/// The hierarchy is fixed at compile time, so this is a zero-sized handle.
/// Name-based lookups are closed-world: a name that isn't in the tree
/// implies nothing and is implied by nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleHierarchy;

impl RoleHierarchy {
    /// Returns `true` iff `target` is `role` or a descendant of it.
    pub fn implies(&self, role: &str, target: &str) -> bool {
        match (Role::from_name(role), Role::from_name(target)) {
            (Some(role), Some(target)) => role.implies(target),
            _ => false,
        }
    }

    /// Folds a player's stored role names into everything they grant.
    pub fn resolve<'a>(&self, roles: impl IntoIterator<Item = &'a String>) -> RoleSet {
        roles
            .into_iter()
            .filter_map(|name| Role::from_name(name))
            .fold(RoleSet::empty(), |set, role| set | role.implied())
    }

    /// Returns `true` if any of `roles` grants `target`.
    pub fn grants<'a>(&self, roles: impl IntoIterator<Item = &'a String>, target: Role) -> bool {
        self.resolve(roles).contains(target.flag())
    }

    /// Every role name in the tree; what an owner gets.
    pub fn owner_roles(&self) -> BTreeSet<String> {
        Role::Owner.implied().names()
    }
}
