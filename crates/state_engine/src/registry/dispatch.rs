use std::collections::HashSet;

use tracing::{debug, error, warn};

use crate::events::{StateChangeEvent, STATE_CHANGE_TOPIC};
use crate::owner::StateHookContext;

use super::combine::combine_states;
use super::types::{OwnerId, StateArrayId, StateId, StateRequest};
use super::StateRegistry;

impl StateRegistry {
    /// Sets every state named `name` reachable from `owner`, then mirrors the
    /// call onto linked owners.
    ///
    /// Toggles requested by hooks during the call are queued and run after
    /// it, in request order.
    pub fn set_state(&mut self, owner: OwnerId, name: &str, active: bool) {
        self.pending.push_back(StateRequest {
            owner,
            name: name.to_string(),
            active,
        });
        self.drain_requests();
    }

    /// Direct-array variant: no owner lookup, no link propagation and no
    /// event. Hooks still run.
    pub fn set_state_in(&mut self, array: StateArrayId, name: &str, active: bool) -> bool {
        let Some(owner) = self.array_owner(array) else {
            warn!(array = %array, state = name, "state_array_unknown");
            return false;
        };
        let Some(id) = self.find_state(array, name) else {
            warn!(array = %array, state = name, "state_name_unknown");
            return false;
        };
        let changed = self.toggle_with_hooks(owner, id, active);
        self.drain_requests();
        changed
    }

    /// Low-level flip plus combine. Skips hooks, links and events. Returns
    /// whether the flag changed.
    pub fn activate_state(&mut self, state: StateId, active: bool, array: StateArrayId) -> bool {
        let Some(entry) = self.arrays.get_mut(&array) else {
            warn!(state = %state, array = %array, "state_array_mapping_missing");
            return false;
        };
        if !entry.order.contains(&state) {
            warn!(state = %state, array = %array, "state_array_mapping_missing");
            return false;
        }
        let Some(target) = self.states.get_mut(&state) else {
            warn!(state = %state, "state_missing");
            return false;
        };
        if target.active == active {
            return false;
        }
        if target.default && !active {
            warn!(state = %state, name = %target.name, "default_state_deactivation_refused");
            return false;
        }
        target.active = active;

        combine_states(&self.states, &entry.order, entry.host.as_mut(), state, active);
        true
    }

    pub(crate) fn drain_requests(&mut self) {
        if self.dispatching {
            return;
        }
        self.dispatching = true;
        // Requests queued by the caller always run; only hook follow-ups
        // count against the settle limit.
        let mut seeded = self.pending.len();
        let mut follow_ups = 0usize;
        while let Some(request) = self.pending.pop_front() {
            if seeded > 0 {
                seeded -= 1;
            } else if follow_ups >= self.config.max_settle_passes {
                error!(
                    dropped = self.pending.len() + 1,
                    limit = self.config.max_settle_passes,
                    "state_request_settle_limit_reached"
                );
                self.pending.clear();
                break;
            } else {
                follow_ups += 1;
            }
            let mut visited = HashSet::new();
            self.set_state_recursive(request.owner, &request.name, request.active, &mut visited);
        }
        self.dispatching = false;
    }

    fn set_state_recursive(
        &mut self,
        owner: OwnerId,
        name: &str,
        active: bool,
        visited: &mut HashSet<OwnerId>,
    ) {
        if !visited.insert(owner) {
            debug!(owner = %owner, state = name, "state_link_revisit_skipped");
            return;
        }

        self.track_active_name(owner, name, active);
        self.publish_state_change(owner, name, active);

        let matches = match self.names_by_owner.get(&owner) {
            None => {
                warn!(owner = %owner, state = name, "state_owner_unknown");
                Vec::new()
            }
            Some(names) => match names.get(name) {
                Some(ids) => ids.clone(),
                None => {
                    warn!(owner = %owner, state = name, "state_name_unknown");
                    Vec::new()
                }
            },
        };
        for id in matches {
            self.toggle_with_hooks(owner, id, active);
        }

        let linked = self.links.get(&owner).cloned().unwrap_or_default();
        for target in linked {
            self.set_state_recursive(target, name, active, visited);
        }
    }

    /// will-change hook, activate, changed hook. Hook requests are queued.
    pub(crate) fn toggle_with_hooks(&mut self, owner: OwnerId, id: StateId, active: bool) -> bool {
        let Some(state) = self.states.get(&id) else {
            warn!(owner = %owner, state = %id, "state_missing");
            return false;
        };
        if state.active == active {
            return false;
        }
        let array = state.array;
        let name = state.name.clone();
        if !self.arrays.contains_key(&array) {
            warn!(owner = %owner, state = %name, array = %array, "state_array_mapping_missing");
            return false;
        }

        let mut requests = Vec::new();
        if let Some(entry) = self.arrays.get_mut(&array) {
            let mut ctx = StateHookContext::new(owner, array, id, &name, active, &mut requests);
            entry.host.state_will_change(&mut ctx);
        }
        let changed = self.activate_state(id, active, array);
        if changed {
            if let Some(entry) = self.arrays.get_mut(&array) {
                let mut ctx = StateHookContext::new(owner, array, id, &name, active, &mut requests);
                entry.host.state_changed(&mut ctx);
            }
        }
        self.pending.extend(requests);
        changed
    }

    fn track_active_name(&mut self, owner: OwnerId, name: &str, active: bool) {
        if active {
            self.active_names
                .entry(owner)
                .or_default()
                .insert(name.to_string());
        } else if let Some(names) = self.active_names.get_mut(&owner) {
            names.remove(name);
            if names.is_empty() {
                self.active_names.remove(&owner);
            }
        }
    }

    fn publish_state_change(&mut self, owner: OwnerId, name: &str, active: bool) {
        if !self.config.publish_state_changes {
            return;
        }
        let Some(bus) = self.event_bus.as_mut() else {
            return;
        };
        bus.publish(
            STATE_CHANGE_TOPIC,
            &StateChangeEvent {
                owner,
                state: name.to_string(),
                active,
            },
        );
    }
}
