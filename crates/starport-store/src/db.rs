//! The embedded database both stores share.

use std::path::Path;
use std::time::Duration;

use crate::StoreError;

const TREE_PLAYERS: &str = "players";
const TREE_PLANETS: &str = "planets";
const TREE_PLUGINS: &str = "plugins";

/// A sled database opened with the three registry namespaces.
///
/// Cloning is cheap: sled handles are reference counted. The files are
/// released once every clone has been dropped.
#[derive(Clone)]
pub struct Database {
    db: sled::Db,
    players: sled::Tree,
    planets: sled::Tree,
    plugins: sled::Tree,
    write_timeout: Duration,
}

impl Database {
    /// Opens (or creates) the database at `path`.
    ///
    /// All three namespaces are created if missing. `write_timeout` bounds
    /// every [`flush`](Self::flush).
    pub fn open<P: AsRef<Path>>(path: P, write_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        let players = db.open_tree(TREE_PLAYERS)?;
        let planets = db.open_tree(TREE_PLANETS)?;
        let plugins = db.open_tree(TREE_PLUGINS)?;
        tracing::debug!(path = %path.display(), "opened player database");
        Ok(Self {
            db,
            players,
            planets,
            plugins,
            write_timeout,
        })
    }

    /// `uuid` → encoded [`Player`](crate::Player).
    pub fn players(&self) -> &sled::Tree {
        &self.players
    }

    /// canonical key → encoded [`Planet`](crate::Planet).
    pub fn planets(&self) -> &sled::Tree {
        &self.planets
    }

    /// Opaque namespace for other collaborators. Never read here.
    pub fn plugins(&self) -> &sled::Tree {
        &self.plugins
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Makes every write so far durable.
    ///
    /// # Errors
    /// [`StoreError::Timeout`] if the flush outlives the write timeout,
    /// [`StoreError::Storage`] if sled reports a failure.
    pub async fn flush(&self) -> Result<(), StoreError> {
        match tokio::time::timeout(self.write_timeout, self.db.flush_async()).await {
            Ok(Ok(bytes)) => {
                tracing::trace!(bytes, "database flushed");
                Ok(())
            }
            Ok(Err(e)) => Err(StoreError::Storage(e)),
            Err(_) => Err(StoreError::Timeout(self.write_timeout)),
        }
    }
}
