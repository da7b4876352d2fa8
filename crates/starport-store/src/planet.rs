//! The planet record.

use std::fmt;

use serde::{Deserialize, Serialize};
use starport_protocol::CelestialCoordinate;

/// A world location, identified entirely by its coordinates.
///
/// Two planets with identical fields are the same record; [`key`](Self::key)
/// is the canonical string both stores and player records use to refer to
/// it. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Planet {
    pub sector: String,
    /// `(a, x, y)` system coordinates.
    pub location: (i32, i32, i32),
    pub planet_index: i32,
    pub satellite_index: i32,
}

impl Planet {
    pub fn new(
        sector: impl Into<String>,
        location: (i32, i32, i32),
        planet_index: i32,
        satellite_index: i32,
    ) -> Self {
        Self {
            sector: sector.into(),
            location,
            planet_index,
            satellite_index,
        }
    }

    /// Builds the canonical key: `sector:a:x:y:planet:satellite`.
    pub fn key_for(
        sector: &str,
        location: (i32, i32, i32),
        planet_index: i32,
        satellite_index: i32,
    ) -> String {
        let (a, x, y) = location;
        format!("{sector}:{a}:{x}:{y}:{planet_index}:{satellite_index}")
    }

    /// This planet's canonical key.
    pub fn key(&self) -> String {
        Self::key_for(
            &self.sector,
            self.location,
            self.planet_index,
            self.satellite_index,
        )
    }
}

impl Default for Planet {
    fn default() -> Self {
        Self::new("alpha", (0, 0, 0), 0, 0)
    }
}

impl From<&CelestialCoordinate> for Planet {
    fn from(coordinate: &CelestialCoordinate) -> Self {
        Self::new(
            coordinate.sector.clone(),
            coordinate.location,
            coordinate.planet,
            coordinate.satellite,
        )
    }
}

impl fmt::Display for Planet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
