use std::collections::{BTreeMap, HashSet};
use std::process::ExitCode;

use serde::Serialize;
use state_engine::{
    EventLog, OwnerId, PropertyValue, StateArrayId, StateChangeEvent, StateRegistry,
};
use tracing::{debug, error, info, warn};

use super::bootstrap::AppWiring;
use super::host::ScenarioHost;
use super::scenario::{Scenario, ScenarioCommand};

const TIME_EPSILON_SECONDS: f64 = 1e-6;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    info!(
        scenario = %app.scenario_path.display(),
        owners = app.scenario.owners.len(),
        steps = app.scenario.script.len(),
        "scenario_loaded"
    );
    let report = ScenarioRunner::new(app.scenario).run();
    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "scenario_report_encode_failed");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ScenarioReport {
    pub(crate) ticks: u64,
    pub(crate) elapsed_seconds: f64,
    pub(crate) owners: Vec<OwnerReport>,
    pub(crate) events: Vec<StateChangeEvent>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OwnerReport {
    pub(crate) id: OwnerId,
    pub(crate) label: String,
    pub(crate) spawned: bool,
    pub(crate) active_states: Vec<String>,
    pub(crate) properties: BTreeMap<String, PropertyValue>,
}

/// Drives a scenario through the registry on a fixed step: spawn owners
/// that are due, run due script commands, then advance timers.
pub(crate) struct ScenarioRunner {
    scenario: Scenario,
    registry: StateRegistry,
    events: EventLog,
    arrays_by_owner: BTreeMap<OwnerId, StateArrayId>,
    failed_owners: HashSet<OwnerId>,
    next_step: usize,
    tick: u64,
}

impl ScenarioRunner {
    pub(crate) fn new(mut scenario: Scenario) -> Self {
        scenario
            .script
            .sort_by(|a, b| a.at_seconds.total_cmp(&b.at_seconds));
        let mut registry = StateRegistry::new(scenario.config.clone());
        let events = EventLog::new();
        registry.set_event_bus(Box::new(events.clone()));
        for owner in &scenario.owners {
            if owner.parent.is_some() {
                registry.set_parent(owner.id, owner.parent);
            }
        }
        Self {
            scenario,
            registry,
            events,
            arrays_by_owner: BTreeMap::new(),
            failed_owners: HashSet::new(),
            next_step: 0,
            tick: 0,
        }
    }

    fn now_seconds(&self) -> f64 {
        self.tick as f64 * self.scenario.fixed_dt_seconds
    }

    pub(crate) fn run(mut self) -> ScenarioReport {
        while self.now_seconds() <= self.scenario.duration_seconds + TIME_EPSILON_SECONDS {
            self.step();
        }
        let report = self.report();
        self.registry.shutdown();
        report
    }

    fn step(&mut self) {
        let now = self.now_seconds();
        self.spawn_due_owners(now);
        while let Some(step) = self.scenario.script.get(self.next_step) {
            if step.at_seconds > now + TIME_EPSILON_SECONDS {
                break;
            }
            let command = step.command.clone();
            self.next_step += 1;
            self.apply_command(command);
        }
        self.registry.update(self.scenario.fixed_dt_seconds as f32);
        self.tick = self.tick.saturating_add(1);
    }

    fn spawn_due_owners(&mut self, now: f64) {
        let due: Vec<usize> = self
            .scenario
            .owners
            .iter()
            .enumerate()
            .filter(|(_, owner)| {
                owner.spawn_at_seconds <= now + TIME_EPSILON_SECONDS
                    && !self.arrays_by_owner.contains_key(&owner.id)
                    && !self.failed_owners.contains(&owner.id)
            })
            .map(|(index, _)| index)
            .collect();

        for index in due {
            let owner = &self.scenario.owners[index];
            let host = ScenarioHost::new(
                owner.id,
                owner.label.clone(),
                &owner.properties,
                owner.blocked_by.clone(),
            );
            let (id, label) = (owner.id, owner.label.clone());
            match self
                .registry
                .initialize(id, Box::new(host), owner.states.clone())
            {
                Ok(array) => {
                    info!(owner = %id, label = %label, array = %array, now, "owner_spawned");
                    self.arrays_by_owner.insert(id, array);
                }
                Err(err) => {
                    warn!(owner = %id, label = %label, error = %err, "owner_spawn_failed");
                    self.failed_owners.insert(id);
                }
            }
        }
    }

    fn apply_command(&mut self, command: ScenarioCommand) {
        match command {
            ScenarioCommand::SetState {
                owner,
                state,
                active,
            } => self.registry.set_state(owner, &state, active),
            ScenarioCommand::Link { original, linked } => {
                self.registry.link_owners(original, linked, true)
            }
            ScenarioCommand::Unlink { original, linked } => {
                self.registry.link_owners(original, linked, false)
            }
            ScenarioCommand::DeactivateAfter {
                owner,
                state,
                delay_seconds,
            } => {
                self.registry
                    .deactivate_state_timer(owner, &state, delay_seconds);
            }
            ScenarioCommand::CancelTimer { owner, state } => {
                if !self.registry.cancel_state_timer(owner, &state) {
                    warn!(owner = %owner, state = %state, "scenario_timer_not_found");
                }
            }
            ScenarioCommand::AddState {
                owner,
                index,
                state,
            } => {
                let Some(&array) = self.arrays_by_owner.get(&owner) else {
                    warn!(owner = %owner, state = %state.name, "scenario_add_state_owner_missing");
                    return;
                };
                let name = state.name.clone();
                match self.registry.add_state(owner, array, state, index) {
                    Ok(id) => {
                        debug!(owner = %owner, state = %name, id = %id, "scenario_state_added")
                    }
                    Err(err) => {
                        warn!(owner = %owner, state = %name, error = %err, "scenario_add_state_failed")
                    }
                }
            }
        }
    }

    fn report(&self) -> ScenarioReport {
        let owners = self
            .scenario
            .owners
            .iter()
            .map(|owner| {
                let array = self.arrays_by_owner.get(&owner.id).copied();
                let active_states: Vec<String> = array
                    .and_then(|array| self.registry.view(array))
                    .map(|view| {
                        view.ids()
                            .iter()
                            .filter_map(|id| view.state(*id))
                            .filter(|state| state.is_active() && !state.is_default())
                            .map(|state| state.name().to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                let properties: BTreeMap<String, PropertyValue> = owner
                    .properties
                    .keys()
                    .filter_map(|slot| {
                        let value = array.and_then(|array| self.registry.property(array, slot))?;
                        Some((slot.clone(), value))
                    })
                    .collect();
                OwnerReport {
                    id: owner.id,
                    label: owner.label.clone(),
                    spawned: array.is_some(),
                    active_states,
                    properties,
                }
            })
            .collect();

        ScenarioReport {
            ticks: self.tick,
            elapsed_seconds: self.now_seconds(),
            owners,
            events: self
                .events
                .events()
                .into_iter()
                .map(|(_, event)| event)
                .collect(),
        }
    }
}
