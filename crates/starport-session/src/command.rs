//! Role-gated commands the registry exposes.
//!
//! Authorisation happens in the command front-end *before* the registry
//! is called; these descriptors are what it checks against.

use std::collections::BTreeSet;

use starport_store::{Role, RoleHierarchy};

/// A command name and the role needed to run it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub role: Role,
    pub usage: &'static str,
}

/// `kick <name>`: disconnect a logged-in player.
pub const KICK: CommandSpec = CommandSpec {
    name: "kick",
    role: Role::Kick,
    usage: "kick <name>",
};

/// Every command this crate handles.
pub const COMMANDS: &[CommandSpec] = &[KICK];

impl CommandSpec {
    /// Looks a command up by name.
    pub fn find(name: &str) -> Option<&'static CommandSpec> {
        COMMANDS.iter().find(|spec| spec.name == name)
    }

    /// Returns `true` if a player holding `roles` may run this command.
    pub fn permits(&self, roles: &BTreeSet<String>) -> bool {
        RoleHierarchy.grants(roles, self.role)
    }

    /// Joins the words after the command name into one argument, so
    /// `kick Space Cowboy` targets "Space Cowboy".
    pub fn joined_args(args: &[&str]) -> String {
        args.join(" ")
    }
}

/// What a kick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KickOutcome {
    /// The player was disconnected and everyone was told.
    Kicked { name: String },
    /// No logged-in player has that name; the issuer was told privately.
    NotFound,
}
