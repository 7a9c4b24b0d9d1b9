use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::owner::StateOwner;
use crate::preset::Preset;

pub const DEFAULT_STATE_NAME: &str = "Default";
pub const DEFAULT_MAX_SETTLE_PASSES: usize = 64;

/// Opaque handle of an entity whose properties states override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub u64);

/// Handle of one state-owning object and its state array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateArrayId(pub u32);

/// Stable arena handle of a state. Priority is stored separately, so
/// inserting a state never invalidates existing ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u32);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

impl fmt::Display for StateArrayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "array#{}", self.0)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state#{}", self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub publish_state_changes: bool,
    pub default_state_name: String,
    /// Upper bound on hook follow-up requests processed by one outer call.
    /// The caller's own requests are never counted; 0 disables follow-ups.
    pub max_settle_passes: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            publish_state_changes: false,
            default_state_name: DEFAULT_STATE_NAME.to_string(),
            max_settle_passes: DEFAULT_MAX_SETTLE_PASSES,
        }
    }
}

/// Authoring-side description of a state, consumed by `initialize` and
/// `add_state`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateDefinition {
    pub name: String,
    #[serde(default)]
    pub preset: Option<Preset>,
    #[serde(default)]
    pub default: bool,
}

impl StateDefinition {
    pub fn new(name: impl Into<String>, preset: Preset) -> Self {
        Self {
            name: name.into(),
            preset: Some(preset),
            default: false,
        }
    }

    pub fn without_preset(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            preset: None,
            default: false,
        }
    }

    /// Default slot whose baseline is captured from the owner.
    pub fn default_state() -> Self {
        Self {
            name: String::new(),
            preset: None,
            default: true,
        }
    }

    /// Default slot with an authored baseline. Slots it lacks are still
    /// captured from the owner.
    pub fn default_with(preset: Preset) -> Self {
        Self {
            name: String::new(),
            preset: Some(preset),
            default: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct State {
    pub(crate) name: String,
    pub(crate) active: bool,
    pub(crate) default: bool,
    pub(crate) preset: Option<Preset>,
    pub(crate) array: StateArrayId,
}

impl State {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_default(&self) -> bool {
        self.default
    }

    pub fn preset(&self) -> Option<&Preset> {
        self.preset.as_ref()
    }

    pub fn array(&self) -> StateArrayId {
        self.array
    }
}

pub(crate) struct StateArray {
    pub(crate) owner: OwnerId,
    /// Priority order; the Default state is always last.
    pub(crate) order: Vec<StateId>,
    pub(crate) host: Box<dyn StateOwner>,
}

impl StateArray {
    pub(crate) fn default_state(&self) -> Option<StateId> {
        self.order.last().copied()
    }
}

/// A queued `set_state` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRequest {
    pub owner: OwnerId,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("cannot initialize {owner} with an empty state list")]
    EmptyStateArray { owner: OwnerId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddStateError {
    #[error("registry is not running")]
    NotRunning,
    #[error("{array} was never initialized")]
    UnknownStateArray { array: StateArrayId },
    #[error("{array} is not owned by {owner}")]
    OwnerMismatch { owner: OwnerId, array: StateArrayId },
    #[error("insert index {index} is outside 0..{len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("a default state cannot be inserted")]
    DefaultState,
    #[error("state name cannot be empty")]
    EmptyName,
    #[error("state {name} has no preset")]
    MissingPreset { name: String },
    #[error("state {name} already exists in {array}")]
    DuplicateName { name: String, array: StateArrayId },
}
