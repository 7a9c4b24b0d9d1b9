use std::collections::BTreeSet;

use tracing::{debug, error, info, warn};

use crate::owner::{StateArrayView, StateOwner};
use crate::preset::Preset;

use super::types::{
    AddStateError, OwnerId, RegistryError, State, StateArray, StateArrayId, StateDefinition,
    StateId,
};
use super::StateRegistry;

impl StateRegistry {
    /// Registers a state array for `owner` and activates its Default state.
    ///
    /// The last definition is the Default slot when it is marked `default`;
    /// otherwise a Default is appended. Its baseline is captured from the
    /// host for every slot the other states touch. Malformed definitions are
    /// logged and skipped; only an empty list is refused.
    pub fn initialize(
        &mut self,
        owner: OwnerId,
        host: Box<dyn StateOwner>,
        mut definitions: Vec<StateDefinition>,
    ) -> Result<StateArrayId, RegistryError> {
        if definitions.is_empty() {
            return Err(RegistryError::EmptyStateArray { owner });
        }
        let default_definition = if definitions.last().is_some_and(|last| last.default) {
            definitions.pop()
        } else {
            None
        };
        let default_name = match &default_definition {
            Some(definition) if !definition.name.is_empty() => definition.name.clone(),
            _ => self.config.default_state_name.clone(),
        };

        let mut kept: Vec<(String, Option<Preset>)> = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if definition.default {
                error!(owner = %owner, "default_state_not_last");
                continue;
            }
            if definition.name.is_empty() {
                error!(owner = %owner, "state_name_empty");
                continue;
            }
            if definition.name == default_name || kept.iter().any(|(name, _)| *name == definition.name)
            {
                error!(owner = %owner, state = %definition.name, "state_name_duplicate");
                continue;
            }
            let preset = match definition.preset {
                Some(mut preset) => {
                    preset.bind(&definition.name, host.as_ref());
                    Some(preset)
                }
                None => {
                    error!(owner = %owner, state = %definition.name, "state_preset_missing");
                    None
                }
            };
            kept.push((definition.name, preset));
        }

        let mut baseline = default_definition
            .and_then(|definition| definition.preset)
            .unwrap_or_default();
        baseline.bind(&default_name, host.as_ref());
        for preset in kept.iter().filter_map(|(_, preset)| preset.as_ref()) {
            baseline.capture_missing_from(preset, host.as_ref());
        }

        let array = self.alloc_array_id();
        let mut order = Vec::with_capacity(kept.len() + 1);
        for (name, preset) in kept {
            let id = self.alloc_state_id();
            self.states.insert(
                id,
                State {
                    name,
                    active: false,
                    default: false,
                    preset,
                    array,
                },
            );
            order.push(id);
        }
        let default_id = self.alloc_state_id();
        self.states.insert(
            default_id,
            State {
                name: default_name,
                active: false,
                default: true,
                preset: Some(baseline),
                array,
            },
        );
        order.push(default_id);

        let overrides = order[..order.len() - 1].to_vec();
        self.arrays.insert(
            array,
            StateArray {
                owner,
                order,
                host,
            },
        );

        self.register_name(owner, default_id);
        for &id in &overrides {
            self.register_under_owner_and_ancestors(owner, id);
        }
        let all_ids = self.states(array).map(<[StateId]>::to_vec).unwrap_or_default();
        for id in all_ids {
            self.notify_state_initialized(array, id);
        }

        self.apply_baseline(array);
        self.activate_state(default_id, true, array);

        info!(
            owner = %owner,
            array = %array,
            state_count = overrides.len() + 1,
            "state_array_initialized"
        );

        self.seed_from_tracked_names(owner, array);
        Ok(array)
    }

    /// Inserts a state at priority `index` of a live array. Every rejection
    /// leaves the array untouched.
    pub fn add_state(
        &mut self,
        owner: OwnerId,
        array: StateArrayId,
        definition: StateDefinition,
        index: usize,
    ) -> Result<StateId, AddStateError> {
        if !self.running {
            debug!(owner = %owner, array = %array, "add_state_ignored_not_running");
            return Err(AddStateError::NotRunning);
        }
        let result = self.try_add_state(owner, array, definition, index);
        match &result {
            Ok(id) => info!(owner = %owner, array = %array, state = %id, index, "state_added"),
            Err(err) => error!(owner = %owner, array = %array, error = %err, "add_state_rejected"),
        }
        result
    }

    fn try_add_state(
        &mut self,
        owner: OwnerId,
        array: StateArrayId,
        definition: StateDefinition,
        index: usize,
    ) -> Result<StateId, AddStateError> {
        let Some(entry) = self.arrays.get(&array) else {
            return Err(AddStateError::UnknownStateArray { array });
        };
        if entry.owner != owner {
            return Err(AddStateError::OwnerMismatch { owner, array });
        }
        let len = entry.order.len();
        if index >= len {
            return Err(AddStateError::IndexOutOfRange { index, len });
        }
        if definition.default {
            return Err(AddStateError::DefaultState);
        }
        if definition.name.is_empty() {
            return Err(AddStateError::EmptyName);
        }
        let Some(mut preset) = definition.preset else {
            return Err(AddStateError::MissingPreset {
                name: definition.name,
            });
        };
        let view = StateArrayView::new(&entry.order, &self.states);
        if view.id_of(&definition.name).is_some() {
            return Err(AddStateError::DuplicateName {
                name: definition.name,
                array,
            });
        }

        preset.bind(&definition.name, entry.host.as_ref());
        let default_id = entry.default_state();
        if let Some(baseline) = default_id
            .and_then(|id| self.states.get_mut(&id))
            .and_then(|state| state.preset.as_mut())
        {
            baseline.capture_missing_from(&preset, entry.host.as_ref());
        }

        let id = self.alloc_state_id();
        self.states.insert(
            id,
            State {
                name: definition.name,
                active: false,
                default: false,
                preset: Some(preset),
                array,
            },
        );
        if let Some(entry) = self.arrays.get_mut(&array) {
            entry.order.insert(index, id);
        }
        self.register_under_owner_and_ancestors(owner, id);
        self.notify_state_initialized(array, id);
        Ok(id)
    }

    /// Drops an array, its states and every index entry pointing at them.
    pub fn release(&mut self, array: StateArrayId) -> bool {
        let Some(entry) = self.arrays.remove(&array) else {
            return false;
        };
        let released: BTreeSet<StateId> = entry.order.iter().copied().collect();
        for id in &released {
            self.states.remove(id);
        }
        self.names_by_owner.retain(|_, names| {
            names.retain(|_, ids| {
                ids.retain(|id| !released.contains(id));
                !ids.is_empty()
            });
            !names.is_empty()
        });
        debug!(owner = %entry.owner, array = %array, "state_array_released");
        true
    }

    /// Forgets everything about `owner`: its arrays, links in both
    /// directions, pending timers, tracked names and ancestry.
    pub fn remove_owner(&mut self, owner: OwnerId) {
        for array in self.arrays_of(owner) {
            self.release(array);
        }
        self.names_by_owner.remove(&owner);
        self.links.remove(&owner);
        self.links.retain(|_, edges| {
            edges.retain(|linked| *linked != owner);
            !edges.is_empty()
        });
        self.active_names.remove(&owner);
        self.parents.remove(&owner);
        self.parents.retain(|_, parent| *parent != owner);

        let keys: Vec<(OwnerId, String)> = self
            .timers
            .keys()
            .filter(|(timer_owner, _)| *timer_owner == owner)
            .cloned()
            .collect();
        for key in keys {
            if let Some(handle) = self.timers.remove(&key) {
                self.scheduler.cancel(handle);
            }
        }
        debug!(owner = %owner, "state_owner_removed");
    }

    /// Ends the session: cancels timers and refuses further `add_state`.
    pub fn shutdown(&mut self) {
        for (_, handle) in self.timers.drain() {
            self.scheduler.cancel(handle);
        }
        self.pending.clear();
        self.running = false;
        info!(arrays = self.arrays.len(), "state_registry_shutdown");
    }

    /// Re-reads the Default state's baseline from the host.
    pub fn recapture_default(&mut self, array: StateArrayId) -> bool {
        let Some(entry) = self.arrays.get(&array) else {
            warn!(array = %array, "state_array_unknown");
            return false;
        };
        let Some(baseline) = entry
            .default_state()
            .and_then(|id| self.states.get_mut(&id))
            .and_then(|state| state.preset.as_mut())
        else {
            return false;
        };
        baseline.capture(entry.host.as_ref());
        true
    }

    fn apply_baseline(&mut self, array: StateArrayId) {
        let Some(entry) = self.arrays.get_mut(&array) else {
            return;
        };
        if let Some(baseline) = entry
            .default_state()
            .and_then(|id| self.states.get(&id))
            .and_then(State::preset)
        {
            baseline.apply(entry.host.as_mut());
        }
    }

    fn notify_state_initialized(&mut self, array: StateArrayId, id: StateId) {
        if let Some(entry) = self.arrays.get_mut(&array) {
            let view = StateArrayView::new(&entry.order, &self.states);
            entry.host.state_initialized(id, &view);
        }
    }

    fn register_name(&mut self, owner: OwnerId, id: StateId) {
        let Some(name) = self.states.get(&id).map(|state| state.name.clone()) else {
            return;
        };
        let ids = self
            .names_by_owner
            .entry(owner)
            .or_default()
            .entry(name)
            .or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    fn register_under_owner_and_ancestors(&mut self, owner: OwnerId, id: StateId) {
        self.register_name(owner, id);
        for ancestor in self.ancestors(owner) {
            self.register_name(ancestor, id);
        }
    }

    /// Replays names already active on `owner` or its ancestors onto a
    /// freshly initialized array.
    fn seed_from_tracked_names(&mut self, owner: OwnerId, array: StateArrayId) {
        let mut names = BTreeSet::new();
        for source in std::iter::once(owner).chain(self.ancestors(owner)) {
            if let Some(active) = self.active_names.get(&source) {
                names.extend(active.iter().cloned());
            }
        }
        for name in names {
            let Some(id) = self.find_state(array, &name) else {
                continue;
            };
            if self.states.get(&id).is_some_and(State::is_default) {
                continue;
            }
            debug!(owner = %owner, array = %array, state = %name, "state_seeded_from_tracked");
            self.toggle_with_hooks(owner, id, true);
        }
        self.drain_requests();
    }
}
