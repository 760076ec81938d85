//! Resource accounting for upgrade costs.
//!
//! Balances are unsigned; every subtraction is checked so a balance can
//! never wrap below zero. A cost is affordable when, for every resource it
//! names, the balance is at least the cost.

use std::collections::BTreeMap;

use stickian_types::ResourceKind;

use crate::catalog::ResourceCost;
use crate::error::WorldError;

/// Whether `balances` cover every entry of `cost`.
pub fn has_sufficient(balances: &BTreeMap<ResourceKind, u64>, cost: &ResourceCost) -> bool {
    cost.iter()
        .all(|(resource, required)| balances.get(resource).copied().unwrap_or(0) >= *required)
}

/// Subtract `cost` from `balances` in place.
///
/// The deduction is all-or-nothing: if any resource is short, `balances`
/// is left untouched.
///
/// # Errors
///
/// Returns [`WorldError::InsufficientResources`] naming the first resource
/// that cannot cover its share of the cost.
pub fn deduct(
    balances: &mut BTreeMap<ResourceKind, u64>,
    cost: &ResourceCost,
) -> Result<(), WorldError> {
    let mut updated = Vec::with_capacity(cost.len());
    for (resource, required) in cost {
        let available = balances.get(resource).copied().unwrap_or(0);
        let remaining =
            available
                .checked_sub(*required)
                .ok_or(WorldError::InsufficientResources {
                    resource: *resource,
                    available,
                    required: *required,
                })?;
        updated.push((*resource, remaining));
    }
    balances.extend(updated);
    Ok(())
}
