//! Durable records for Starport.
//!
//! This crate owns everything the proxy remembers between restarts:
//!
//! 1. **Roles**: the fixed permission hierarchy ([`RoleHierarchy`])
//! 2. **Players**: one record per client uuid ([`PlayerStore`])
//! 3. **Planets**: one record per celestial coordinate ([`PlanetStore`])
//!
//! Both stores sit on a single embedded [`Database`] with three
//! namespaces: `players`, `planets`, and `plugins` (the last one belongs
//! to other collaborators; we only make sure it exists).
//!
//! # Concurrency note
//!
//! The stores take `&mut self` for anything that can create or change a
//! record and are not thread-safe by themselves. The session layer keeps
//! them behind one async mutex, which is what makes get-or-create atomic
//! per key.

mod db;
mod error;
mod planet;
mod planets;
mod player;
mod players;
mod role;
#[cfg(test)]
mod testing;

pub use db::Database;
pub use error::StoreError;
pub use planet::Planet;
pub use planets::PlanetStore;
pub use player::{DEFAULT_IP, Player, PlayerDefaults, UNBOUND_CLIENT_ID};
pub use players::PlayerStore;
pub use role::{Role, RoleHierarchy, RoleSet, UnknownRole};
