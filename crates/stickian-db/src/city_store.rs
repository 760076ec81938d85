//! Per-city state storage.
//!
//! One [`CityState`] record per city. The tick processor is the only writer;
//! everything else (status queries, admission prechecks) reads and must
//! tolerate state that is up to one tick old.

use std::collections::BTreeMap;
use std::sync::RwLock;

use stickian_types::{CityId, CityState};

use crate::error::DbError;

/// Keyed storage of city state.
pub trait CityStore: Send + Sync {
    /// Fetch the stored state of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::CityNotFound`] if no state exists for `id`, or
    /// another [`DbError`] if the store cannot be read.
    fn get(&self, id: CityId) -> Result<CityState, DbError>;

    /// Replace the stored state of `id` with `state`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be written.
    fn put(&self, id: CityId, state: &CityState) -> Result<(), DbError>;
}

/// In-memory [`CityStore`] for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryCityStore {
    cities: RwLock<BTreeMap<CityId, CityState>>,
}

impl InMemoryCityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `cities`.
    pub fn with_cities(cities: impl IntoIterator<Item = CityState>) -> Self {
        Self {
            cities: RwLock::new(cities.into_iter().map(|city| (city.id, city)).collect()),
        }
    }

    /// Identifiers of every stored city, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::LockPoisoned`] if the store lock is poisoned.
    pub fn city_ids(&self) -> Result<Vec<CityId>, DbError> {
        let cities = self
            .cities
            .read()
            .map_err(|_err| DbError::LockPoisoned("city store"))?;
        Ok(cities.keys().copied().collect())
    }
}

impl CityStore for InMemoryCityStore {
    fn get(&self, id: CityId) -> Result<CityState, DbError> {
        let cities = self
            .cities
            .read()
            .map_err(|_err| DbError::LockPoisoned("city store"))?;
        cities.get(&id).cloned().ok_or(DbError::CityNotFound(id))
    }

    fn put(&self, id: CityId, state: &CityState) -> Result<(), DbError> {
        let mut cities = self
            .cities
            .write()
            .map_err(|_err| DbError::LockPoisoned("city store"))?;
        cities.insert(id, state.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use stickian_types::{BuildingKind, ResourceKind};

    use super::*;

    #[test]
    fn missing_city_is_reported() {
        let store = InMemoryCityStore::new();
        let id = CityId::new();
        assert!(matches!(store.get(id), Err(DbError::CityNotFound(missing)) if missing == id));
    }

    #[test]
    fn put_replaces_state() {
        let id = CityId::new();
        let store = InMemoryCityStore::with_cities([CityState::new(id, "Twigton")]);

        let mut state = store.get(id).unwrap();
        state.buildings.insert(BuildingKind::Farm, 1);
        state.resources.insert(ResourceKind::Stone, 7);
        store.put(id, &state).unwrap();

        let stored = store.get(id).unwrap();
        assert_eq!(stored.level(BuildingKind::Farm), 1);
        assert_eq!(stored.balance(ResourceKind::Stone), 7);
        assert_eq!(store.city_ids().unwrap(), vec![id]);
    }

    #[test]
    fn get_returns_an_independent_copy() {
        let id = CityId::new();
        let store = InMemoryCityStore::with_cities([CityState::new(id, "Twigton")]);
        let mut copy = store.get(id).unwrap();
        copy.name = String::from("Changed");
        assert_eq!(store.get(id).unwrap().name, "Twigton");
    }
}
