use std::collections::HashMap;

use crate::property::{PropertyError, PropertyValue};
use crate::registry::{OwnerId, State, StateArrayId, StateId, StateRequest};

/// The state-owning object attached to one state array.
///
/// The registry owns the boxed host and calls back into it: property access
/// for presets, change hooks around every toggle and the blocking predicate
/// used by the combine pass.
pub trait StateOwner {
    fn read_property(&self, slot: &str) -> Option<PropertyValue>;

    fn write_property(&mut self, slot: &str, value: &PropertyValue) -> Result<(), PropertyError>;

    /// Called once per state after the array (or an inserted state) is
    /// registered, so hosts can resolve sibling names to ids.
    fn state_initialized(&mut self, _state: StateId, _states: &StateArrayView<'_>) {}

    fn state_will_change(&mut self, _ctx: &mut StateHookContext<'_>) {}

    fn state_changed(&mut self, _ctx: &mut StateHookContext<'_>) {}

    /// Whether an active state is currently suppressed by a sibling.
    /// Evaluated on every combine pass; never cached.
    fn is_blocked(&self, _state: StateId, _states: &StateArrayView<'_>) -> bool {
        false
    }
}

/// Read-only view of one state array in priority order (index 0 first).
#[derive(Clone, Copy)]
pub struct StateArrayView<'a> {
    order: &'a [StateId],
    states: &'a HashMap<StateId, State>,
}

impl<'a> StateArrayView<'a> {
    pub(crate) fn new(order: &'a [StateId], states: &'a HashMap<StateId, State>) -> Self {
        Self { order, states }
    }

    pub fn ids(&self) -> &'a [StateId] {
        self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn state(&self, id: StateId) -> Option<&'a State> {
        self.states.get(&id)
    }

    pub fn name(&self, id: StateId) -> Option<&'a str> {
        self.state(id).map(State::name)
    }

    pub fn is_active(&self, id: StateId) -> bool {
        self.state(id).is_some_and(State::is_active)
    }

    pub fn id_of(&self, name: &str) -> Option<StateId> {
        self.order
            .iter()
            .copied()
            .find(|id| self.name(*id) == Some(name))
    }

    pub fn is_active_by_name(&self, name: &str) -> bool {
        self.id_of(name).is_some_and(|id| self.is_active(id))
    }

    pub fn priority(&self, id: StateId) -> Option<usize> {
        self.order.iter().position(|candidate| *candidate == id)
    }
}

/// Passed to the change hooks. Hooks cannot reach the registry directly;
/// follow-up toggles are requested here and run after the current call
/// settles.
pub struct StateHookContext<'a> {
    owner: OwnerId,
    array: StateArrayId,
    state: StateId,
    state_name: &'a str,
    active: bool,
    requests: &'a mut Vec<StateRequest>,
}

impl<'a> StateHookContext<'a> {
    pub(crate) fn new(
        owner: OwnerId,
        array: StateArrayId,
        state: StateId,
        state_name: &'a str,
        active: bool,
        requests: &'a mut Vec<StateRequest>,
    ) -> Self {
        Self {
            owner,
            array,
            state,
            state_name,
            active,
            requests,
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn array(&self) -> StateArrayId {
        self.array
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn state_name(&self) -> &str {
        self.state_name
    }

    /// The flag the state is moving to.
    pub fn active(&self) -> bool {
        self.active
    }

    pub fn request_state(&mut self, owner: OwnerId, name: impl Into<String>, active: bool) {
        self.requests.push(StateRequest {
            owner,
            name: name.into(),
            active,
        });
    }
}
