use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use crate::events::{EventLog, StateChangeEvent, STATE_CHANGE_TOPIC};
use crate::owner::{StateArrayView, StateHookContext, StateOwner};
use crate::preset::Preset;
use crate::property::{PropertyBag, PropertyError, PropertyValue};

const CHARACTER: OwnerId = OwnerId(1);
const ACCESSORY: OwnerId = OwnerId(2);
const MIRROR: OwnerId = OwnerId(3);

type HookLog = Rc<RefCell<Vec<String>>>;

struct FollowUp {
    when_state: &'static str,
    when_active: bool,
    owner: OwnerId,
    state: &'static str,
    active: bool,
}

struct TestHost {
    props: PropertyBag,
    log: HookLog,
    /// (blocked state, blocking state)
    block_rules: Vec<(&'static str, &'static str)>,
    follow_ups: Vec<FollowUp>,
}

impl TestHost {
    fn new(props: PropertyBag, log: &HookLog) -> Self {
        Self {
            props,
            log: Rc::clone(log),
            block_rules: Vec::new(),
            follow_ups: Vec::new(),
        }
    }

    fn character(log: &HookLog) -> Self {
        Self::new(
            PropertyBag::new()
                .with("move_speed", 5.0f32)
                .with("fov", 60.0f32)
                .with("crouched", false),
            log,
        )
    }
}

impl StateOwner for TestHost {
    fn read_property(&self, slot: &str) -> Option<PropertyValue> {
        self.props.get(slot).cloned()
    }

    fn write_property(&mut self, slot: &str, value: &PropertyValue) -> Result<(), PropertyError> {
        self.props.set(slot, value)
    }

    fn state_initialized(&mut self, state: StateId, states: &StateArrayView<'_>) {
        let name = states.name(state).unwrap_or("?");
        self.log.borrow_mut().push(format!("init:{name}"));
    }

    fn state_will_change(&mut self, ctx: &mut StateHookContext<'_>) {
        self.log
            .borrow_mut()
            .push(format!("will:{}:{}", ctx.state_name(), ctx.active()));
    }

    fn state_changed(&mut self, ctx: &mut StateHookContext<'_>) {
        self.log
            .borrow_mut()
            .push(format!("changed:{}:{}", ctx.state_name(), ctx.active()));
        for follow_up in &self.follow_ups {
            if follow_up.when_state == ctx.state_name() && follow_up.when_active == ctx.active() {
                ctx.request_state(follow_up.owner, follow_up.state, follow_up.active);
            }
        }
    }

    fn is_blocked(&self, state: StateId, states: &StateArrayView<'_>) -> bool {
        let Some(name) = states.name(state) else {
            return false;
        };
        self.block_rules
            .iter()
            .any(|(blocked, blocker)| *blocked == name && states.is_active_by_name(blocker))
    }
}

fn new_log() -> HookLog {
    Rc::new(RefCell::new(Vec::new()))
}

fn character_states() -> Vec<StateDefinition> {
    vec![
        StateDefinition::new(
            "Aim",
            Preset::new().with("move_speed", 1.0f32).with("fov", 40.0f32),
        ),
        StateDefinition::new(
            "Crouch",
            Preset::new()
                .with("move_speed", 2.0f32)
                .with("crouched", true),
        ),
        StateDefinition::new("Stun", Preset::new().with("move_speed", 0.0f32)),
    ]
}

fn init_character(registry: &mut StateRegistry, owner: OwnerId, log: &HookLog) -> StateArrayId {
    registry
        .initialize(owner, Box::new(TestHost::character(log)), character_states())
        .expect("initialize character")
}

fn float(registry: &StateRegistry, array: StateArrayId, slot: &str) -> f32 {
    registry
        .property(array, slot)
        .and_then(|value| value.as_float())
        .expect("float property")
}

fn flag(registry: &StateRegistry, array: StateArrayId, slot: &str) -> bool {
    registry
        .property(array, slot)
        .and_then(|value| value.as_bool())
        .expect("bool property")
}

fn count(log: &HookLog, entry: &str) -> usize {
    log.borrow().iter().filter(|line| *line == entry).count()
}

fn hook_entries(log: &HookLog) -> Vec<String> {
    log.borrow()
        .iter()
        .filter(|line| !line.starts_with("init:"))
        .cloned()
        .collect()
}

#[test]
fn initialize_appends_default_last_and_captures_baseline() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let array = init_character(&mut registry, CHARACTER, &log);

    let ids = registry.states(array).expect("states").to_vec();
    assert_eq!(ids.len(), 4);
    let default = registry.state(ids[3]).expect("default");
    assert_eq!(default.name(), DEFAULT_STATE_NAME);
    assert!(default.is_default());
    assert!(default.is_active());

    let baseline = default.preset().expect("baseline");
    assert_eq!(baseline.value_for("move_speed"), Some(&PropertyValue::Float(5.0)));
    assert_eq!(baseline.value_for("fov"), Some(&PropertyValue::Float(60.0)));
    assert_eq!(baseline.value_for("crouched"), Some(&PropertyValue::Bool(false)));
    assert_eq!(
        count(&log, "init:Aim") + count(&log, "init:Crouch") + count(&log, "init:Default"),
        3
    );
}

#[test]
fn initialize_rejects_empty_state_list() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let err = registry
        .initialize(CHARACTER, Box::new(TestHost::character(&log)), Vec::new())
        .expect_err("empty list");
    assert_eq!(err, RegistryError::EmptyStateArray { owner: CHARACTER });
    assert!(registry.arrays_of(CHARACTER).is_empty());
}

#[test]
fn initialize_skips_malformed_definitions_and_keeps_presetless_state() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let array = registry
        .initialize(
            CHARACTER,
            Box::new(TestHost::character(&log)),
            vec![
                StateDefinition::new("Aim", Preset::new().with("move_speed", 1.0f32)),
                StateDefinition::new("", Preset::new().with("fov", 10.0f32)),
                StateDefinition::new("Aim", Preset::new().with("fov", 20.0f32)),
                StateDefinition::without_preset("Emote"),
                StateDefinition::default_state(),
            ],
        )
        .expect("initialize");

    let view = registry.view(array).expect("view");
    let names: Vec<&str> = view.ids().iter().filter_map(|id| view.name(*id)).collect();
    assert_eq!(names, vec!["Aim", "Emote", "Default"]);

    registry.set_state(CHARACTER, "Emote", true);
    assert!(registry.is_active(CHARACTER, "Emote"));
    assert_eq!(float(&registry, array, "move_speed"), 5.0);
    assert_eq!(float(&registry, array, "fov"), 60.0);
}

#[test]
fn authored_default_is_applied_on_initialize() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let array = registry
        .initialize(
            CHARACTER,
            Box::new(TestHost::character(&log)),
            vec![
                StateDefinition::new("Aim", Preset::new().with("move_speed", 1.0f32)),
                StateDefinition::default_with(Preset::new().with("move_speed", 4.0f32)),
            ],
        )
        .expect("initialize");

    assert_eq!(float(&registry, array, "move_speed"), 4.0);
    registry.set_state(CHARACTER, "Aim", true);
    registry.set_state(CHARACTER, "Aim", false);
    assert_eq!(float(&registry, array, "move_speed"), 4.0);
}

#[test]
fn nothing_active_leaves_every_touched_slot_at_baseline() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let array = init_character(&mut registry, CHARACTER, &log);

    for name in ["Aim", "Crouch", "Stun"] {
        registry.set_state(CHARACTER, name, true);
    }
    for name in ["Crouch", "Aim", "Stun"] {
        registry.set_state(CHARACTER, name, false);
    }

    assert_eq!(float(&registry, array, "move_speed"), 5.0);
    assert_eq!(float(&registry, array, "fov"), 60.0);
    assert!(!flag(&registry, array, "crouched"));
}

#[test]
fn index_zero_wins_regardless_of_activation_order() {
    let log = new_log();

    let mut forward = StateRegistry::default();
    let forward_array = init_character(&mut forward, CHARACTER, &log);
    forward.set_state(CHARACTER, "Crouch", true);
    forward.set_state(CHARACTER, "Aim", true);

    let mut reverse = StateRegistry::default();
    let reverse_array = init_character(&mut reverse, CHARACTER, &log);
    reverse.set_state(CHARACTER, "Aim", true);
    reverse.set_state(CHARACTER, "Crouch", true);

    assert_eq!(float(&forward, forward_array, "move_speed"), 1.0);
    assert_eq!(float(&reverse, reverse_array, "move_speed"), 1.0);
    assert!(flag(&forward, forward_array, "crouched"));
    assert!(flag(&reverse, reverse_array, "crouched"));
}

#[test]
fn deactivation_falls_back_to_next_highest_active() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let array = init_character(&mut registry, CHARACTER, &log);

    registry.set_state(CHARACTER, "Crouch", true);
    assert_eq!(float(&registry, array, "move_speed"), 2.0);
    registry.set_state(CHARACTER, "Aim", true);
    assert_eq!(float(&registry, array, "move_speed"), 1.0);
    registry.set_state(CHARACTER, "Aim", false);
    assert_eq!(float(&registry, array, "move_speed"), 2.0);
    assert_eq!(float(&registry, array, "fov"), 60.0);
    registry.set_state(CHARACTER, "Crouch", false);
    assert_eq!(float(&registry, array, "move_speed"), 5.0);
}

#[test]
fn redundant_toggle_runs_hooks_once() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    init_character(&mut registry, CHARACTER, &log);

    registry.set_state(CHARACTER, "Aim", true);
    registry.set_state(CHARACTER, "Aim", true);

    assert_eq!(count(&log, "will:Aim:true"), 1);
    assert_eq!(count(&log, "changed:Aim:true"), 1);
}

#[test]
fn unknown_name_is_harmless() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let array = init_character(&mut registry, CHARACTER, &log);

    registry.set_state(CHARACTER, "DoesNotExist", true);
    registry.set_state(OwnerId(99), "Aim", true);

    assert_eq!(float(&registry, array, "move_speed"), 5.0);
    assert_eq!(float(&registry, array, "fov"), 60.0);
    assert!(hook_entries(&log).is_empty());
}

#[test]
fn blocked_state_yields_to_baseline_until_unblocked() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let mut host = TestHost::character(&log);
    host.block_rules.push(("Sprint", "Aim"));
    let array = registry
        .initialize(
            CHARACTER,
            Box::new(host),
            vec![
                StateDefinition::new("Aim", Preset::new().with("fov", 40.0f32)),
                StateDefinition::new(
                    "Sprint",
                    Preset::new().with("move_speed", 9.0f32).with("fov", 70.0f32),
                ),
            ],
        )
        .expect("initialize");

    registry.set_state(CHARACTER, "Sprint", true);
    assert_eq!(float(&registry, array, "move_speed"), 9.0);
    assert_eq!(float(&registry, array, "fov"), 70.0);

    registry.set_state(CHARACTER, "Aim", true);
    assert_eq!(float(&registry, array, "move_speed"), 5.0);
    assert_eq!(float(&registry, array, "fov"), 40.0);

    registry.set_state(CHARACTER, "Aim", false);
    assert_eq!(float(&registry, array, "move_speed"), 9.0);
    assert_eq!(float(&registry, array, "fov"), 70.0);
}

#[test]
fn linking_replays_active_names_onto_linked_owner() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    init_character(&mut registry, CHARACTER, &log);
    let mirror = init_character(&mut registry, MIRROR, &log);

    registry.set_state(CHARACTER, "Aim", true);
    assert!(!registry.is_active(MIRROR, "Aim"));

    registry.link_owners(CHARACTER, MIRROR, true);

    assert!(registry.is_active(MIRROR, "Aim"));
    assert_eq!(float(&registry, mirror, "move_speed"), 1.0);
    assert_eq!(registry.linked_owners(CHARACTER), &[MIRROR]);
}

#[test]
fn linked_owner_follows_later_changes_and_unlink_keeps_state() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    init_character(&mut registry, CHARACTER, &log);
    let mirror = init_character(&mut registry, MIRROR, &log);
    registry.link_owners(CHARACTER, MIRROR, true);

    registry.set_state(CHARACTER, "Crouch", true);
    assert!(flag(&registry, mirror, "crouched"));

    registry.link_owners(CHARACTER, MIRROR, false);
    assert!(registry.linked_owners(CHARACTER).is_empty());
    assert!(registry.is_active(MIRROR, "Crouch"));

    registry.set_state(CHARACTER, "Crouch", false);
    assert!(registry.is_active(MIRROR, "Crouch"));
}

#[test]
fn self_link_is_ignored() {
    let mut registry = StateRegistry::default();
    registry.link_owners(CHARACTER, CHARACTER, true);
    assert!(registry.linked_owners(CHARACTER).is_empty());
}

#[test]
fn unknown_owner_still_propagates_to_links() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    init_character(&mut registry, MIRROR, &log);
    registry.link_owners(OwnerId(42), MIRROR, true);

    registry.set_state(OwnerId(42), "Aim", true);

    assert!(registry.is_active(MIRROR, "Aim"));
}

#[test]
fn link_cycle_settles_without_recursing_forever() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    init_character(&mut registry, CHARACTER, &log);
    init_character(&mut registry, MIRROR, &log);
    registry.link_owners(CHARACTER, MIRROR, true);
    registry.link_owners(MIRROR, CHARACTER, true);

    registry.set_state(CHARACTER, "Aim", true);

    assert!(registry.is_active(CHARACTER, "Aim"));
    assert!(registry.is_active(MIRROR, "Aim"));
    assert_eq!(count(&log, "changed:Aim:true"), 2);
}

#[test]
fn set_state_on_parent_reaches_child_arrays() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let character = init_character(&mut registry, CHARACTER, &log);
    registry.set_parent(ACCESSORY, Some(CHARACTER));
    let accessory = registry
        .initialize(
            ACCESSORY,
            Box::new(TestHost::new(PropertyBag::new().with("visible", false), &log)),
            vec![StateDefinition::new(
                "Aim",
                Preset::new().with("visible", true),
            )],
        )
        .expect("initialize accessory");

    registry.set_state(CHARACTER, "Aim", true);

    assert_eq!(float(&registry, character, "move_speed"), 1.0);
    assert!(flag(&registry, accessory, "visible"));
    assert!(registry.is_active(ACCESSORY, "Aim"));

    registry.set_state(CHARACTER, "Aim", false);
    assert!(!flag(&registry, accessory, "visible"));
}

#[test]
fn late_joining_child_is_seeded_with_parent_active_names() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    init_character(&mut registry, CHARACTER, &log);
    registry.set_state(CHARACTER, "Aim", true);

    registry.set_parent(ACCESSORY, Some(CHARACTER));
    let accessory = registry
        .initialize(
            ACCESSORY,
            Box::new(TestHost::new(PropertyBag::new().with("visible", false), &log)),
            vec![StateDefinition::new(
                "Aim",
                Preset::new().with("visible", true),
            )],
        )
        .expect("initialize accessory");

    assert!(flag(&registry, accessory, "visible"));
    assert!(registry.is_active(ACCESSORY, "Aim"));
}

#[test]
fn parent_cycle_is_refused() {
    let mut registry = StateRegistry::default();
    registry.set_parent(ACCESSORY, Some(CHARACTER));
    registry.set_parent(CHARACTER, Some(ACCESSORY));
    assert_eq!(registry.parent(CHARACTER), None);
    assert_eq!(registry.ancestors(ACCESSORY), vec![CHARACTER]);
}

#[test]
fn hook_requests_run_after_the_outer_call() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let mut host = TestHost::character(&log);
    host.follow_ups.push(FollowUp {
        when_state: "Aim",
        when_active: true,
        owner: CHARACTER,
        state: "Crouch",
        active: true,
    });
    let array = registry
        .initialize(CHARACTER, Box::new(host), character_states())
        .expect("initialize");

    registry.set_state(CHARACTER, "Aim", true);

    assert_eq!(
        hook_entries(&log),
        vec![
            "will:Aim:true",
            "changed:Aim:true",
            "will:Crouch:true",
            "changed:Crouch:true",
        ]
    );
    assert!(flag(&registry, array, "crouched"));
    assert_eq!(float(&registry, array, "move_speed"), 1.0);
}

#[test]
fn ping_pong_requests_stop_at_settle_limit() {
    let mut registry = StateRegistry::new(RegistryConfig {
        max_settle_passes: 8,
        ..RegistryConfig::default()
    });
    let log = new_log();
    let mut host = TestHost::character(&log);
    host.follow_ups.push(FollowUp {
        when_state: "Aim",
        when_active: true,
        owner: CHARACTER,
        state: "Aim",
        active: false,
    });
    host.follow_ups.push(FollowUp {
        when_state: "Aim",
        when_active: false,
        owner: CHARACTER,
        state: "Aim",
        active: true,
    });
    registry
        .initialize(CHARACTER, Box::new(host), character_states())
        .expect("initialize");

    registry.set_state(CHARACTER, "Aim", true);

    let changes = count(&log, "changed:Aim:true") + count(&log, "changed:Aim:false");
    assert_eq!(changes, 9);

    registry.set_state(CHARACTER, "Crouch", true);
    assert!(registry.is_active(CHARACTER, "Crouch"));
}

#[test]
fn events_publish_once_per_owner_when_enabled() {
    let mut registry = StateRegistry::new(RegistryConfig {
        publish_state_changes: true,
        ..RegistryConfig::default()
    });
    let events = EventLog::new();
    registry.set_event_bus(Box::new(events.clone()));
    let log = new_log();
    init_character(&mut registry, CHARACTER, &log);
    init_character(&mut registry, MIRROR, &log);
    registry.link_owners(CHARACTER, MIRROR, true);

    registry.set_state(CHARACTER, "Aim", true);

    assert_eq!(
        events.events(),
        vec![
            (
                STATE_CHANGE_TOPIC.to_string(),
                StateChangeEvent {
                    owner: CHARACTER,
                    state: "Aim".to_string(),
                    active: true,
                }
            ),
            (
                STATE_CHANGE_TOPIC.to_string(),
                StateChangeEvent {
                    owner: MIRROR,
                    state: "Aim".to_string(),
                    active: true,
                }
            ),
        ]
    );
}

#[test]
fn events_stay_silent_when_disabled() {
    let mut registry = StateRegistry::default();
    let events = EventLog::new();
    registry.set_event_bus(Box::new(events.clone()));
    let log = new_log();
    init_character(&mut registry, CHARACTER, &log);

    registry.set_state(CHARACTER, "Aim", true);

    assert!(events.is_empty());
}

#[test]
fn timer_restart_fires_exactly_once_from_second_call() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let array = init_character(&mut registry, CHARACTER, &log);

    registry.set_state(CHARACTER, "Stun", true);
    registry.deactivate_state_timer(CHARACTER, "Stun", 2.0);
    registry.update(0.5);
    registry.deactivate_state_timer(CHARACTER, "Stun", 1.0);

    registry.update(0.9);
    assert!(registry.is_active(CHARACTER, "Stun"));
    assert_eq!(float(&registry, array, "move_speed"), 0.0);

    registry.update(0.2);
    assert!(!registry.is_active(CHARACTER, "Stun"));
    assert!(!registry.has_state_timer(CHARACTER, "Stun"));
    assert_eq!(float(&registry, array, "move_speed"), 5.0);

    registry.update(2.0);
    assert_eq!(count(&log, "changed:Stun:false"), 1);
}

#[test]
fn cancelled_timer_never_fires() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    init_character(&mut registry, CHARACTER, &log);

    registry.set_state(CHARACTER, "Stun", true);
    registry.deactivate_state_timer(CHARACTER, "Stun", 0.5);
    assert!(registry.cancel_state_timer(CHARACTER, "Stun"));
    assert!(!registry.cancel_state_timer(CHARACTER, "Stun"));

    registry.update(1.0);
    assert!(registry.is_active(CHARACTER, "Stun"));
}

#[test]
fn timer_deactivation_propagates_to_links() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    init_character(&mut registry, CHARACTER, &log);
    init_character(&mut registry, MIRROR, &log);
    registry.link_owners(CHARACTER, MIRROR, true);

    registry.set_state(CHARACTER, "Stun", true);
    registry.deactivate_state_timer(CHARACTER, "Stun", 0.25);
    registry.update(0.25);

    assert!(!registry.is_active(CHARACTER, "Stun"));
    assert!(!registry.is_active(MIRROR, "Stun"));
}

#[test]
fn add_state_rejects_duplicate_name_without_mutation() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let array = init_character(&mut registry, CHARACTER, &log);
    let before = registry.states(array).expect("states").to_vec();

    let err = registry
        .add_state(
            CHARACTER,
            array,
            StateDefinition::new("Crouch", Preset::new().with("move_speed", 3.0f32)),
            0,
        )
        .expect_err("duplicate");

    assert_eq!(
        err,
        AddStateError::DuplicateName {
            name: "Crouch".to_string(),
            array,
        }
    );
    assert_eq!(registry.states(array).expect("states"), before.as_slice());
}

#[test]
fn add_state_rejects_invalid_requests() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let array = init_character(&mut registry, CHARACTER, &log);
    let len = registry.states(array).expect("states").len();
    let sprint = || StateDefinition::new("Sprint", Preset::new().with("move_speed", 9.0f32));

    assert_eq!(
        registry.add_state(CHARACTER, array, sprint(), len),
        Err(AddStateError::IndexOutOfRange { index: len, len })
    );
    assert_eq!(
        registry.add_state(CHARACTER, StateArrayId(77), sprint(), 0),
        Err(AddStateError::UnknownStateArray {
            array: StateArrayId(77)
        })
    );
    assert_eq!(
        registry.add_state(CHARACTER, array, StateDefinition::default_state(), 0),
        Err(AddStateError::DefaultState)
    );
    assert_eq!(
        registry.add_state(
            CHARACTER,
            array,
            StateDefinition::new("", Preset::new().with("fov", 1.0f32)),
            0
        ),
        Err(AddStateError::EmptyName)
    );
    assert_eq!(
        registry.add_state(CHARACTER, array, StateDefinition::without_preset("Sprint"), 0),
        Err(AddStateError::MissingPreset {
            name: "Sprint".to_string()
        })
    );
    assert_eq!(registry.states(array).expect("states").len(), len);

    registry.shutdown();
    assert_eq!(
        registry.add_state(CHARACTER, array, sprint(), 0),
        Err(AddStateError::NotRunning)
    );
}

#[test]
fn add_state_inserts_at_priority_and_extends_baseline() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let array = registry
        .initialize(
            CHARACTER,
            Box::new(TestHost::new(
                PropertyBag::new()
                    .with("move_speed", 5.0f32)
                    .with("stamina_drain", 0.0f32),
                &log,
            )),
            vec![StateDefinition::new(
                "Aim",
                Preset::new().with("move_speed", 1.0f32),
            )],
        )
        .expect("initialize");

    let sprint = registry
        .add_state(
            CHARACTER,
            array,
            StateDefinition::new(
                "Sprint",
                Preset::new()
                    .with("move_speed", 9.0f32)
                    .with("stamina_drain", 2.0f32),
            ),
            0,
        )
        .expect("add sprint");

    let view = registry.view(array).expect("view");
    let names: Vec<&str> = view.ids().iter().filter_map(|id| view.name(*id)).collect();
    assert_eq!(names, vec!["Sprint", "Aim", "Default"]);
    assert_eq!(view.priority(sprint), Some(0));
    assert_eq!(count(&log, "init:Sprint"), 1);

    registry.set_state(CHARACTER, "Aim", true);
    registry.set_state(CHARACTER, "Sprint", true);
    assert_eq!(float(&registry, array, "move_speed"), 9.0);
    assert_eq!(float(&registry, array, "stamina_drain"), 2.0);

    registry.set_state(CHARACTER, "Sprint", false);
    assert_eq!(float(&registry, array, "move_speed"), 1.0);
    assert_eq!(float(&registry, array, "stamina_drain"), 0.0);
}

#[test]
fn activate_state_skips_hooks_and_refuses_default_deactivation() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let array = init_character(&mut registry, CHARACTER, &log);
    let aim = registry.find_state(array, "Aim").expect("aim");
    let default = registry.find_state(array, DEFAULT_STATE_NAME).expect("default");

    assert!(registry.activate_state(aim, true, array));
    assert!(!registry.activate_state(aim, true, array));
    assert_eq!(float(&registry, array, "move_speed"), 1.0);
    assert!(hook_entries(&log).is_empty());

    assert!(!registry.activate_state(default, false, array));
    assert!(registry.state(default).expect("default").is_active());
}

#[test]
fn activate_state_with_wrong_array_is_skipped() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let character = init_character(&mut registry, CHARACTER, &log);
    let mirror = init_character(&mut registry, MIRROR, &log);
    let aim = registry.find_state(character, "Aim").expect("aim");

    assert!(!registry.activate_state(aim, true, mirror));
    assert!(!registry.state(aim).expect("aim").is_active());
}

#[test]
fn set_state_in_is_scoped_to_one_array() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let character = init_character(&mut registry, CHARACTER, &log);
    init_character(&mut registry, MIRROR, &log);
    registry.link_owners(CHARACTER, MIRROR, true);

    assert!(registry.set_state_in(character, "Aim", true));
    assert!(!registry.set_state_in(character, "Missing", true));

    assert!(registry.is_active(CHARACTER, "Aim"));
    assert!(!registry.is_active(MIRROR, "Aim"));
    assert_eq!(count(&log, "will:Aim:true"), 1);
}

#[test]
fn release_forgets_states_and_names() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let array = init_character(&mut registry, CHARACTER, &log);
    let aim = registry.find_state(array, "Aim").expect("aim");

    assert!(registry.release(array));
    assert!(!registry.release(array));
    assert!(registry.state(aim).is_none());
    assert!(registry.states(array).is_none());

    registry.set_state(CHARACTER, "Aim", true);
    assert!(!registry.is_active(CHARACTER, "Aim"));
}

#[test]
fn remove_owner_drops_links_and_timers() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    init_character(&mut registry, CHARACTER, &log);
    init_character(&mut registry, MIRROR, &log);
    registry.link_owners(CHARACTER, MIRROR, true);
    registry.set_state(MIRROR, "Stun", true);
    registry.deactivate_state_timer(MIRROR, "Stun", 1.0);

    registry.remove_owner(MIRROR);

    assert!(registry.linked_owners(CHARACTER).is_empty());
    assert!(!registry.has_state_timer(MIRROR, "Stun"));
    assert!(registry.arrays_of(MIRROR).is_empty());
    assert!(registry.active_state_names(MIRROR).is_empty());
    registry.update(2.0);
}

#[test]
fn recapture_default_adopts_current_host_values() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let array = init_character(&mut registry, CHARACTER, &log);

    registry
        .host_mut(array)
        .expect("host")
        .write_property("move_speed", &PropertyValue::Float(7.0))
        .expect("write");
    assert!(registry.recapture_default(array));

    registry.set_state(CHARACTER, "Aim", true);
    registry.set_state(CHARACTER, "Aim", false);
    assert_eq!(float(&registry, array, "move_speed"), 7.0);
}

#[test]
fn active_state_names_track_set_state_calls() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    init_character(&mut registry, CHARACTER, &log);

    registry.set_state(CHARACTER, "Crouch", true);
    registry.set_state(CHARACTER, "Aim", true);
    assert_eq!(registry.active_state_names(CHARACTER), vec!["Aim", "Crouch"]);

    registry.set_state(CHARACTER, "Aim", false);
    assert_eq!(registry.active_state_names(CHARACTER), vec!["Crouch"]);
}

fn many_states(count: usize) -> Vec<StateDefinition> {
    (0..count)
        .map(|index| {
            StateDefinition::new(
                format!("Layer{index}"),
                Preset::new().with("fov", index as f32),
            )
        })
        .collect()
}

#[test]
fn link_replay_is_not_limited_by_settle_cap() {
    let mut registry = StateRegistry::new(RegistryConfig {
        max_settle_passes: 4,
        ..RegistryConfig::default()
    });
    let log = new_log();
    registry
        .initialize(CHARACTER, Box::new(TestHost::character(&log)), many_states(10))
        .expect("initialize character");
    registry
        .initialize(MIRROR, Box::new(TestHost::character(&log)), many_states(10))
        .expect("initialize mirror");
    for index in 0..10 {
        registry.set_state(CHARACTER, &format!("Layer{index}"), true);
    }

    registry.link_owners(CHARACTER, MIRROR, true);

    let replayed = (0..10)
        .filter(|index| registry.is_active(MIRROR, &format!("Layer{index}")))
        .count();
    assert_eq!(replayed, 10);
}

#[test]
fn zero_settle_passes_still_runs_caller_requests() {
    let mut registry = StateRegistry::new(RegistryConfig {
        max_settle_passes: 0,
        ..RegistryConfig::default()
    });
    let log = new_log();
    let mut host = TestHost::character(&log);
    host.follow_ups.push(FollowUp {
        when_state: "Aim",
        when_active: true,
        owner: CHARACTER,
        state: "Crouch",
        active: true,
    });
    let array = registry
        .initialize(CHARACTER, Box::new(host), character_states())
        .expect("initialize");

    registry.set_state(CHARACTER, "Aim", true);

    assert!(registry.is_active(CHARACTER, "Aim"));
    assert!(!registry.is_active(CHARACTER, "Crouch"));
    assert_eq!(float(&registry, array, "move_speed"), 1.0);
}

#[test]
fn add_state_rejects_owner_that_does_not_own_array() {
    let mut registry = StateRegistry::default();
    let log = new_log();
    let character = init_character(&mut registry, CHARACTER, &log);
    init_character(&mut registry, MIRROR, &log);
    let len = registry.states(character).expect("states").len();

    let result = registry.add_state(
        MIRROR,
        character,
        StateDefinition::new("Sprint", Preset::new().with("move_speed", 9.0f32)),
        0,
    );

    assert_eq!(
        result,
        Err(AddStateError::OwnerMismatch {
            owner: MIRROR,
            array: character
        })
    );
    assert_eq!(registry.states(character).expect("states").len(), len);
    registry.set_state(MIRROR, "Sprint", true);
    assert_eq!(float(&registry, character, "move_speed"), 5.0);
}
