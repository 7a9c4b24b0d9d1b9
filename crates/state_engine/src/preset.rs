use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::owner::StateOwner;
use crate::property::PropertyValue;

/// One property binding: the slot on the owner and the value a state forces
/// into it while active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetDelegate {
    pub slot: String,
    pub value: PropertyValue,
}

impl PresetDelegate {
    pub fn new(slot: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            slot: slot.into(),
            value: value.into(),
        }
    }

    pub fn apply(&self, host: &mut dyn StateOwner) {
        if let Err(err) = host.write_property(&self.slot, &self.value) {
            warn!(slot = %self.slot, error = %err, "preset_delegate_write_failed");
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preset {
    delegates: Vec<PresetDelegate>,
}

impl Preset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_delegates(delegates: Vec<PresetDelegate>) -> Self {
        Self { delegates }
    }

    /// Builder form used by hosts and tests: `Preset::new().with("speed", 2.0)`.
    /// A repeated slot replaces the earlier delegate.
    pub fn with(mut self, slot: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set(PresetDelegate::new(slot, value));
        self
    }

    pub fn set(&mut self, delegate: PresetDelegate) {
        match self
            .delegates
            .iter_mut()
            .find(|existing| existing.slot == delegate.slot)
        {
            Some(existing) => *existing = delegate,
            None => self.delegates.push(delegate),
        }
    }

    pub fn delegates(&self) -> &[PresetDelegate] {
        &self.delegates
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }

    pub fn touches(&self, slot: &str) -> bool {
        self.delegates.iter().any(|delegate| delegate.slot == slot)
    }

    pub fn value_for(&self, slot: &str) -> Option<&PropertyValue> {
        self.delegates
            .iter()
            .find(|delegate| delegate.slot == slot)
            .map(|delegate| &delegate.value)
    }

    pub fn slots(&self) -> impl Iterator<Item = &str> {
        self.delegates.iter().map(|delegate| delegate.slot.as_str())
    }

    /// Writes every delegate value onto the host, in delegate order.
    pub fn apply(&self, host: &mut dyn StateOwner) {
        for delegate in &self.delegates {
            delegate.apply(host);
        }
    }

    /// Writes this preset's values for exactly the slots `other` touches.
    /// Slots this preset does not carry are left alone.
    pub fn apply_slots_of(&self, other: &Preset, host: &mut dyn StateOwner) {
        for slot in other.slots() {
            if let Some(value) = self.value_for(slot) {
                if let Err(err) = host.write_property(slot, value) {
                    warn!(slot, error = %err, "preset_restore_write_failed");
                }
            }
        }
    }

    /// Reads the host's current values into every delegate. Delegates whose
    /// slot cannot be read keep their stored value.
    pub fn capture(&mut self, host: &dyn StateOwner) {
        for delegate in &mut self.delegates {
            match host.read_property(&delegate.slot) {
                Some(value) => delegate.value = value,
                None => warn!(slot = %delegate.slot, "preset_capture_slot_missing"),
            }
        }
    }

    /// Adds a captured delegate for every slot of `other` this preset lacks.
    pub(crate) fn capture_missing_from(&mut self, other: &Preset, host: &dyn StateOwner) {
        for slot in other.slots() {
            if self.touches(slot) {
                continue;
            }
            if let Some(value) = host.read_property(slot) {
                self.delegates.push(PresetDelegate::new(slot, value));
            }
        }
    }

    /// Resolves every delegate against the host once. Delegates the host
    /// cannot carry are dropped; returns how many were dropped.
    pub(crate) fn bind(&mut self, state_name: &str, host: &dyn StateOwner) -> usize {
        let before = self.delegates.len();
        self.delegates
            .retain(|delegate| match host.read_property(&delegate.slot) {
                Some(current) if current.kind() == delegate.value.kind() => true,
                Some(current) => {
                    error!(
                        state = state_name,
                        slot = %delegate.slot,
                        expected = %current.kind(),
                        actual = %delegate.value.kind(),
                        "preset_delegate_kind_mismatch"
                    );
                    false
                }
                None => {
                    error!(
                        state = state_name,
                        slot = %delegate.slot,
                        "preset_delegate_slot_unknown"
                    );
                    false
                }
            });
        before - self.delegates.len()
    }
}
