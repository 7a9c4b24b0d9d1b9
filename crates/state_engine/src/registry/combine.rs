use std::collections::HashMap;

use tracing::{debug, warn};

use crate::owner::{StateArrayView, StateOwner};
use crate::preset::Preset;

use super::types::{State, StateId};

/// Recomputes the owner's property values after `changed` flipped to
/// `active`.
///
/// `order` is the array's priority list with the Default state last. Passes
/// run from the lowest-priority override (`n - 2`) up to index 0, so index 0
/// writes last and wins. Blocking is asked fresh from the host for every
/// state on every pass. Returns how many presets the main pass applied.
pub(crate) fn combine_states(
    states: &HashMap<StateId, State>,
    order: &[StateId],
    host: &mut dyn StateOwner,
    changed: StateId,
    active: bool,
) -> usize {
    let Some((&default_id, overrides)) = order.split_last() else {
        return 0;
    };
    let empty = Preset::new();
    let baseline = states
        .get(&default_id)
        .and_then(State::preset)
        .unwrap_or(&empty);

    if active {
        for &id in overrides.iter().rev() {
            let Some(state) = states.get(&id) else {
                warn!(state = %id, "combine_state_missing");
                continue;
            };
            if !state.active {
                continue;
            }
            let blocked = host.is_blocked(id, &StateArrayView::new(order, states));
            if blocked {
                if let Some(preset) = state.preset() {
                    baseline.apply_slots_of(preset, host);
                }
            }
        }
    } else if let Some(preset) = states.get(&changed).and_then(State::preset) {
        baseline.apply_slots_of(preset, host);
    }

    let mut applied = 0;
    for &id in overrides.iter().rev() {
        let Some(state) = states.get(&id) else {
            continue;
        };
        if !state.active || host.is_blocked(id, &StateArrayView::new(order, states)) {
            continue;
        }
        if let Some(preset) = state.preset() {
            preset.apply(host);
            applied += 1;
        }
    }

    debug!(
        changed = %changed,
        active,
        applied,
        "states_combined"
    );
    applied
}
