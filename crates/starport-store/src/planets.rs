//! The planet store: one durable record per coordinate tuple.

use std::collections::BTreeMap;

use starport_protocol::{Codec, JsonCodec};

use crate::{Database, Planet, StoreError};

/// Deduplicated planet records keyed by [`Planet::key`].
///
/// There is no update path: a planet never changes once stored.
pub struct PlanetStore<K: Codec = JsonCodec> {
    db: Database,
    codec: K,
    planets: BTreeMap<String, Planet>,
}

impl PlanetStore<JsonCodec> {
    pub fn open(db: Database) -> Result<Self, StoreError> {
        Self::with_codec(db, JsonCodec)
    }
}

impl<K: Codec> PlanetStore<K> {
    pub fn with_codec(db: Database, codec: K) -> Result<Self, StoreError> {
        let mut planets = BTreeMap::new();
        for item in db.planets().iter() {
            let (_, value) = item?;
            let planet: Planet = codec.decode(&value)?;
            planets.insert(planet.key(), planet);
        }
        tracing::info!(count = planets.len(), "loaded planet records");
        Ok(Self { db, codec, planets })
    }

    /// Returns the planet at these coordinates, storing it on first visit.
    ///
    /// # Errors
    /// A storage failure while creating; nothing is stored in that case.
    pub async fn get_or_create(
        &mut self,
        sector: &str,
        location: (i32, i32, i32),
        planet_index: i32,
        satellite_index: i32,
    ) -> Result<&Planet, StoreError> {
        let key = Planet::key_for(sector, location, planet_index, satellite_index);
        if self.planets.contains_key(&key) {
            tracing::debug!(%key, "returning existing planet");
            return Ok(&self.planets[&key]);
        }

        let planet = Planet::new(sector, location, planet_index, satellite_index);
        let bytes = self.codec.encode(&planet)?;
        self.db.planets().insert(key.as_str(), bytes)?;
        if let Err(e) = self.db.flush().await {
            if let Err(undo) = self.db.planets().remove(key.as_str()) {
                tracing::error!(%key, error = %undo, "failed to roll back planet insert");
            }
            return Err(e);
        }

        tracing::info!(%key, "stored new planet");
        Ok(self.planets.entry(key).or_insert(planet))
    }

    pub fn get(&self, key: &str) -> Option<&Planet> {
        self.planets.get(key)
    }

    /// A snapshot of every planet, in key order.
    pub fn all(&self) -> Vec<Planet> {
        self.planets.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.planets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planets.is_empty()
    }
}
