use std::collections::BTreeMap;

use state_engine::{
    OwnerId, PropertyBag, PropertyError, PropertyValue, StateArrayView, StateHookContext,
    StateId, StateOwner,
};
use tracing::{debug, info};

/// State owner backed by scenario-authored properties and block lists.
pub(crate) struct ScenarioHost {
    owner: OwnerId,
    label: String,
    properties: PropertyBag,
    blocked_by: BTreeMap<String, Vec<String>>,
}

impl ScenarioHost {
    pub(crate) fn new(
        owner: OwnerId,
        label: impl Into<String>,
        properties: &BTreeMap<String, PropertyValue>,
        blocked_by: BTreeMap<String, Vec<String>>,
    ) -> Self {
        let mut bag = PropertyBag::new();
        for (slot, value) in properties {
            bag.insert(slot.clone(), value.clone());
        }
        Self {
            owner,
            label: label.into(),
            properties: bag,
            blocked_by,
        }
    }
}

impl StateOwner for ScenarioHost {
    fn read_property(&self, slot: &str) -> Option<PropertyValue> {
        self.properties.get(slot).cloned()
    }

    fn write_property(&mut self, slot: &str, value: &PropertyValue) -> Result<(), PropertyError> {
        self.properties.set(slot, value)
    }

    fn state_initialized(&mut self, state: StateId, states: &StateArrayView<'_>) {
        let Some(name) = states.name(state) else {
            return;
        };
        for blocker in self.blocked_by.get(name).into_iter().flatten() {
            if states.id_of(blocker).is_none() {
                debug!(
                    owner = %self.owner,
                    label = %self.label,
                    state = name,
                    blocker = %blocker,
                    "blocker_not_in_array"
                );
            }
        }
    }

    fn state_will_change(&mut self, ctx: &mut StateHookContext<'_>) {
        debug!(
            owner = %self.owner,
            label = %self.label,
            state = ctx.state_name(),
            active = ctx.active(),
            "state_will_change"
        );
    }

    fn state_changed(&mut self, ctx: &mut StateHookContext<'_>) {
        info!(
            owner = %self.owner,
            label = %self.label,
            state = ctx.state_name(),
            active = ctx.active(),
            "state_changed"
        );
    }

    fn is_blocked(&self, state: StateId, states: &StateArrayView<'_>) -> bool {
        let Some(name) = states.name(state) else {
            return false;
        };
        self.blocked_by
            .get(name)
            .is_some_and(|blockers| blockers.iter().any(|blocker| states.is_active_by_name(blocker)))
    }
}
