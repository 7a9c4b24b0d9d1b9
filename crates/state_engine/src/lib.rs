//! Named states that override an owner's properties by priority.
//!
//! A [`StateRegistry`] holds one ordered state array per state-owning object.
//! Toggling a state re-runs the combine pass over its array: the Default
//! state's baseline fills every slot no active, unblocked override claims,
//! and index 0 wins conflicts. Changes mirror onto linked owners and can be
//! undone automatically by a scheduled timer.

pub mod events;
pub mod owner;
pub mod preset;
pub mod property;
pub mod registry;
pub mod scheduler;

pub use events::{EventBus, EventLog, StateChangeEvent, STATE_CHANGE_TOPIC};
pub use owner::{StateArrayView, StateHookContext, StateOwner};
pub use preset::{Preset, PresetDelegate};
pub use property::{PropertyBag, PropertyError, PropertyKind, PropertyValue, Vec2, Vec3};
pub use registry::{
    AddStateError, OwnerId, RegistryConfig, RegistryError, State, StateArrayId, StateDefinition,
    StateId, StateRegistry, StateRequest, DEFAULT_MAX_SETTLE_PASSES, DEFAULT_STATE_NAME,
};
pub use scheduler::{DeactivationTask, Scheduler, TimerHandle, TimerQueue};
