use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// A value a preset can force onto an owner property.
///
/// The variant doubles as the property's type: a slot that currently holds a
/// `Float` only accepts `Float` writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Bool,
    Int,
    Float,
    Vec2,
    Vec3,
    Text,
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Bool(_) => PropertyKind::Bool,
            Self::Int(_) => PropertyKind::Int,
            Self::Float(_) => PropertyKind::Float,
            Self::Vec2(_) => PropertyKind::Vec2,
            Self::Vec3(_) => PropertyKind::Vec3,
            Self::Text(_) => PropertyKind::Text,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Text => "text",
        };
        f.write_str(label)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value:.3}"),
            Self::Vec2(value) => write!(f, "({:.3}, {:.3})", value.x, value.y),
            Self::Vec3(value) => write!(f, "({:.3}, {:.3}, {:.3})", value.x, value.y, value.z),
            Self::Text(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for PropertyValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<Vec2> for PropertyValue {
    fn from(value: Vec2) -> Self {
        Self::Vec2(value)
    }
}

impl From<Vec3> for PropertyValue {
    fn from(value: Vec3) -> Self {
        Self::Vec3(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error("unknown property slot: {slot}")]
    UnknownSlot { slot: String },
    #[error("property {slot} expects {expected}, got {actual}")]
    KindMismatch {
        slot: String,
        expected: PropertyKind,
        actual: PropertyKind,
    },
}

/// Typed property storage a state owner can embed.
///
/// Slots are declared once with [`PropertyBag::insert`]; later writes must
/// keep the declared kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyBag {
    values: BTreeMap<String, PropertyValue>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, slot: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(slot, value);
        self
    }

    pub fn insert(&mut self, slot: impl Into<String>, value: impl Into<PropertyValue>) {
        self.values.insert(slot.into(), value.into());
    }

    pub fn get(&self, slot: &str) -> Option<&PropertyValue> {
        self.values.get(slot)
    }

    pub fn set(&mut self, slot: &str, value: &PropertyValue) -> Result<(), PropertyError> {
        let Some(current) = self.values.get_mut(slot) else {
            return Err(PropertyError::UnknownSlot {
                slot: slot.to_string(),
            });
        };
        if current.kind() != value.kind() {
            return Err(PropertyError::KindMismatch {
                slot: slot.to_string(),
                expected: current.kind(),
                actual: value.kind(),
            });
        }
        *current = value.clone();
        Ok(())
    }

    pub fn slots(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
