//! Player session management for Starport.
//!
//! This crate ties live connections to durable player records:
//!
//! 1. **Handshake tracking**: where each connection is in the connect
//!    exchange ([`ConnectionState`], [`TransitionPolicy`])
//! 2. **Binding**: attaching a player record to a connection on client
//!    connect and releasing it on disconnect ([`SessionRegistry`])
//! 3. **Moderation**: the `kick` command and its role gate ([`command`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Dispatch runtime (above)  ← delivers parsed events, one connection at a time
//!     ↕
//! Session Layer (this crate)  ← state machine + registry
//!     ↕
//! Store Layer (below)  ← durable players, planets, roles
//! ```

pub mod command;
mod config;
mod error;
mod registry;
mod state;

pub use command::{CommandSpec, KickOutcome};
pub use config::RegistryConfig;
pub use error::SessionError;
pub use registry::{Location, SessionRegistry};
pub use state::{ConnectionState, HandshakeEvent, TransitionPolicy};
