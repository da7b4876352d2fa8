//! Event vocabulary for Starport.
//!
//! The proxy's packet layer turns raw game traffic into parsed events.
//! This crate defines the shapes of those events as the session registry
//! sees them:
//!
//! - **Types** ([`ProtocolEvent`], [`ClientConnect`], [`ConnectResponse`],
//!   [`WorldStart`], [`PlayerUuid`]): what the registry consumes.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how events and stored
//!   records are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while decoding or
//!   when a payload is missing a required field.
//!
//! ```text
//! Packet layer (bytes) → Protocol (ProtocolEvent) → Session (registry)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    CelestialCoordinate, CelestialParameters, ClientConnect, ConnectResponse,
    PlayerUuid, ProtocolEvent, WorldPlanet, WorldStart,
};
