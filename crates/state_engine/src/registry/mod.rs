mod combine;
mod dispatch;
mod init;
mod links;
mod timers;
mod types;

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

pub use types::{
    AddStateError, OwnerId, RegistryConfig, RegistryError, State, StateArrayId, StateDefinition,
    StateId, StateRequest, DEFAULT_MAX_SETTLE_PASSES, DEFAULT_STATE_NAME,
};

use crate::events::EventBus;
use crate::owner::{StateArrayView, StateOwner};
use crate::property::PropertyValue;
use crate::scheduler::{Scheduler, TimerHandle, TimerQueue};
use types::StateArray;

/// Owns every state, state array and cross index for one session.
///
/// All mutation of a state's `active` flag goes through the registry so the
/// combined property values always match the active set.
pub struct StateRegistry {
    config: RegistryConfig,
    running: bool,
    next_state_id: u32,
    next_array_id: u32,
    states: HashMap<StateId, State>,
    arrays: BTreeMap<StateArrayId, StateArray>,
    /// owner -> state name -> matching states across every array reachable
    /// from that owner (its own and its descendants').
    names_by_owner: HashMap<OwnerId, BTreeMap<String, Vec<StateId>>>,
    parents: HashMap<OwnerId, OwnerId>,
    links: HashMap<OwnerId, Vec<OwnerId>>,
    active_names: HashMap<OwnerId, BTreeSet<String>>,
    timers: HashMap<(OwnerId, String), TimerHandle>,
    scheduler: Box<dyn Scheduler>,
    event_bus: Option<Box<dyn EventBus>>,
    pending: VecDeque<StateRequest>,
    dispatching: bool,
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl StateRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_scheduler(config, Box::new(TimerQueue::new()))
    }

    pub fn with_scheduler(config: RegistryConfig, scheduler: Box<dyn Scheduler>) -> Self {
        Self {
            config,
            running: true,
            next_state_id: 0,
            next_array_id: 0,
            states: HashMap::new(),
            arrays: BTreeMap::new(),
            names_by_owner: HashMap::new(),
            parents: HashMap::new(),
            links: HashMap::new(),
            active_names: HashMap::new(),
            timers: HashMap::new(),
            scheduler,
            event_bus: None,
            pending: VecDeque::new(),
            dispatching: false,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn set_event_bus(&mut self, event_bus: Box<dyn EventBus>) {
        self.event_bus = Some(event_bus);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(&id)
    }

    /// States of one array in priority order, Default last.
    pub fn states(&self, array: StateArrayId) -> Option<&[StateId]> {
        self.arrays.get(&array).map(|entry| entry.order.as_slice())
    }

    pub fn view(&self, array: StateArrayId) -> Option<StateArrayView<'_>> {
        self.arrays
            .get(&array)
            .map(|entry| StateArrayView::new(&entry.order, &self.states))
    }

    pub fn array_owner(&self, array: StateArrayId) -> Option<OwnerId> {
        self.arrays.get(&array).map(|entry| entry.owner)
    }

    pub fn arrays_of(&self, owner: OwnerId) -> Vec<StateArrayId> {
        self.arrays
            .iter()
            .filter(|(_, entry)| entry.owner == owner)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn host(&self, array: StateArrayId) -> Option<&dyn StateOwner> {
        self.arrays.get(&array).map(|entry| entry.host.as_ref())
    }

    /// Writes made through this bypass the combine pass. Follow with
    /// `recapture_default` to adopt them as the new baseline.
    pub fn host_mut(&mut self, array: StateArrayId) -> Option<&mut (dyn StateOwner + 'static)> {
        self.arrays.get_mut(&array).map(|entry| entry.host.as_mut())
    }

    pub fn property(&self, array: StateArrayId, slot: &str) -> Option<PropertyValue> {
        self.arrays
            .get(&array)
            .and_then(|entry| entry.host.read_property(slot))
    }

    /// Whether any state registered under `(owner, name)` is active.
    pub fn is_active(&self, owner: OwnerId, name: &str) -> bool {
        self.names_by_owner
            .get(&owner)
            .and_then(|names| names.get(name))
            .is_some_and(|ids| {
                ids.iter()
                    .any(|id| self.states.get(id).is_some_and(State::is_active))
            })
    }

    /// Names most recently set active on `owner` through `set_state`.
    pub fn active_state_names(&self, owner: OwnerId) -> Vec<String> {
        self.active_names
            .get(&owner)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn find_state(&self, array: StateArrayId, name: &str) -> Option<StateId> {
        self.view(array).and_then(|view| view.id_of(name))
    }

    fn alloc_state_id(&mut self) -> StateId {
        let id = StateId(self.next_state_id);
        self.next_state_id = self.next_state_id.saturating_add(1);
        id
    }

    fn alloc_array_id(&mut self) -> StateArrayId {
        let id = StateArrayId(self.next_array_id);
        self.next_array_id = self.next_array_id.saturating_add(1);
        id
    }
}

#[cfg(test)]
mod tests;
