use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use super::scenario::{load_scenario_file, Scenario, ScenarioResult};

const SCENARIO_PATH_ENV_VAR: &str = "STATE_DEMO_SCENARIO";
const PUBLISH_EVENTS_ENV_VAR: &str = "STATE_DEMO_PUBLISH_EVENTS";
const BUNDLED_SCENARIO_PATH: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/character_demo.json");

pub(crate) struct AppWiring {
    pub(crate) scenario_path: PathBuf,
    pub(crate) scenario: Scenario,
}

pub(crate) fn build_app() -> ScenarioResult<AppWiring> {
    init_tracing();
    info!("=== State Demo Startup ===");

    let scenario_path = resolve_scenario_path(
        std::env::args().nth(1),
        std::env::var(SCENARIO_PATH_ENV_VAR).ok(),
    );
    let mut scenario = load_scenario_file(&scenario_path)?;
    if let Some(publish) = parse_publish_events_from_env()? {
        scenario.config.publish_state_changes = publish;
    }

    Ok(AppWiring {
        scenario_path,
        scenario,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn resolve_scenario_path(cli_arg: Option<String>, env_value: Option<String>) -> PathBuf {
    non_blank(cli_arg)
        .or_else(|| non_blank(env_value))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(BUNDLED_SCENARIO_PATH))
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_publish_events_from_env() -> ScenarioResult<Option<bool>> {
    match std::env::var(PUBLISH_EVENTS_ENV_VAR) {
        Ok(raw) => parse_flag(&raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_flag(raw: &str) -> ScenarioResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!(
            "{PUBLISH_EVENTS_ENV_VAR}: expected a boolean flag, got '{other}'"
        )),
    }
}
