use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use state_engine::{OwnerId, PropertyValue, RegistryConfig, StateDefinition};

pub(crate) type ScenarioResult<T> = Result<T, String>;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Scenario {
    #[serde(default)]
    pub(crate) config: RegistryConfig,
    pub(crate) fixed_dt_seconds: f64,
    pub(crate) duration_seconds: f64,
    pub(crate) owners: Vec<ScenarioOwner>,
    #[serde(default)]
    pub(crate) script: Vec<ScriptStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ScenarioOwner {
    pub(crate) id: OwnerId,
    pub(crate) label: String,
    #[serde(default)]
    pub(crate) parent: Option<OwnerId>,
    #[serde(default)]
    pub(crate) spawn_at_seconds: f64,
    pub(crate) properties: BTreeMap<String, PropertyValue>,
    pub(crate) states: Vec<StateDefinition>,
    /// state name -> names that suppress it while active
    #[serde(default)]
    pub(crate) blocked_by: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ScriptStep {
    pub(crate) at_seconds: f64,
    pub(crate) command: ScenarioCommand,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ScenarioCommand {
    SetState {
        owner: OwnerId,
        state: String,
        active: bool,
    },
    Link {
        original: OwnerId,
        linked: OwnerId,
    },
    Unlink {
        original: OwnerId,
        linked: OwnerId,
    },
    DeactivateAfter {
        owner: OwnerId,
        state: String,
        delay_seconds: f32,
    },
    CancelTimer {
        owner: OwnerId,
        state: String,
    },
    AddState {
        owner: OwnerId,
        index: usize,
        state: StateDefinition,
    },
}

pub(crate) fn load_scenario_file(path: &Path) -> ScenarioResult<Scenario> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("read scenario '{}': {error}", path.display()))?;
    let scenario = parse_scenario_json(&raw)?;
    validate_scenario(&scenario)?;
    Ok(scenario)
}

pub(crate) fn parse_scenario_json(raw: &str) -> ScenarioResult<Scenario> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, Scenario>(&mut deserializer) {
        Ok(scenario) => Ok(scenario),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse scenario json: {source}"))
            } else {
                Err(format!("parse scenario json at {path}: {source}"))
            }
        }
    }
}

fn validation_err(path: &str, message: impl Into<String>) -> String {
    format!("validation failed at {path}: {}", message.into())
}

fn expected_actual(path: &str, expected: impl Display, actual: impl Display) -> String {
    validation_err(path, format!("expected {expected}, got {actual}"))
}

pub(crate) fn validate_scenario(scenario: &Scenario) -> ScenarioResult<()> {
    if !scenario.fixed_dt_seconds.is_finite() || scenario.fixed_dt_seconds <= 0.0 {
        return Err(expected_actual(
            "fixed_dt_seconds",
            "positive finite number",
            scenario.fixed_dt_seconds,
        ));
    }
    if !scenario.duration_seconds.is_finite() || scenario.duration_seconds < 0.0 {
        return Err(expected_actual(
            "duration_seconds",
            "non-negative finite number",
            scenario.duration_seconds,
        ));
    }

    let mut seen = HashSet::new();
    for (index, owner) in scenario.owners.iter().enumerate() {
        if !seen.insert(owner.id) {
            return Err(validation_err(
                &format!("owners[{index}].id"),
                format!("duplicate owner id {}", owner.id.0),
            ));
        }
        if owner.states.is_empty() {
            return Err(validation_err(
                &format!("owners[{index}].states"),
                "at least one state is required",
            ));
        }
        if !owner.spawn_at_seconds.is_finite() || owner.spawn_at_seconds < 0.0 {
            return Err(expected_actual(
                &format!("owners[{index}].spawn_at_seconds"),
                "non-negative finite number",
                owner.spawn_at_seconds,
            ));
        }
    }
    for (index, owner) in scenario.owners.iter().enumerate() {
        if let Some(parent) = owner.parent {
            if !seen.contains(&parent) {
                return Err(validation_err(
                    &format!("owners[{index}].parent"),
                    format!("unknown owner id {}", parent.0),
                ));
            }
        }
    }
    for (index, step) in scenario.script.iter().enumerate() {
        if !step.at_seconds.is_finite() || step.at_seconds < 0.0 {
            return Err(expected_actual(
                &format!("script[{index}].at_seconds"),
                "non-negative finite number",
                step.at_seconds,
            ));
        }
    }
    Ok(())
}
