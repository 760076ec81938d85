//! Startup wiring: seed city and configured bootstrap intents.
//!
//! Bootstrap intents go through the same [`Admission`] path as client
//! requests. An intent the admission front refuses as invalid is logged and
//! skipped; a server-side failure stops startup.

use stickian_core::config::BootstrapIntent;
use stickian_core::{Admission, UpgradeRequest};
use stickian_db::{AddOutcome, CityStore, DbError, EventStore};
use stickian_types::{CityId, CityState};
use tracing::{info, warn};

use crate::error::EngineError;

/// Store `city` unless a city with the same id already exists.
///
/// Returns whether the city was newly written.
pub fn seed_city<C: CityStore>(cities: &C, city: &CityState) -> Result<bool, EngineError> {
    match cities.get(city.id) {
        Ok(_) => {
            info!(city = %city.id, "Seed city already present");
            Ok(false)
        }
        Err(DbError::CityNotFound(_)) => {
            cities.put(city.id, city)?;
            info!(city = %city.id, name = %city.name, "Seed city created");
            Ok(true)
        }
        Err(err) => Err(err.into()),
    }
}

/// Submit every bootstrap intent for `city_id`.
///
/// Returns the number of intents newly admitted.
pub fn submit_intents<E: EventStore, C: CityStore>(
    admission: &Admission<E, C>,
    city_id: CityId,
    intents: &[BootstrapIntent],
) -> Result<usize, EngineError> {
    let mut admitted = 0_usize;
    for intent in intents {
        let request = UpgradeRequest {
            city_id,
            building: intent.building.clone(),
            level: intent.level,
        };
        match admission.submit_upgrade(&request) {
            Ok(result) => {
                if result.outcome == AddOutcome::Inserted {
                    admitted = admitted.saturating_add(1);
                }
                info!(key = %result.key, tick = result.tick, "Bootstrap intent submitted");
            }
            Err(err) if err.is_client_error() => {
                warn!(
                    building = %intent.building,
                    level = intent.level,
                    error = %err,
                    "Bootstrap intent refused"
                );
            }
            Err(err) => return Err(EngineError::from(err)),
        }
    }
    Ok(admitted)
}
