use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::registry::OwnerId;

pub const STATE_CHANGE_TOPIC: &str = "StateChange";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChangeEvent {
    pub owner: OwnerId,
    pub state: String,
    pub active: bool,
}

/// Fire-and-forget notification sink. Publishing happens synchronously on
/// the caller's thread, in the middle of a `set_state` call.
pub trait EventBus {
    fn publish(&mut self, topic: &str, event: &StateChangeEvent);
}

/// In-memory bus. Clones share the same log, so a caller can keep one handle
/// and give the registry another.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<(String, StateChangeEvent)>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, StateChangeEvent)> {
        self.events.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn drain(&self) -> Vec<(String, StateChangeEvent)> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut output = String::new();
        for (topic, event) in self.events.borrow().iter() {
            let line = serde_json::to_string(&serde_json::json!({
                "topic": topic,
                "event": event,
            }))?;
            output.push_str(&line);
            output.push('\n');
        }
        Ok(output)
    }
}

impl EventBus for EventLog {
    fn publish(&mut self, topic: &str, event: &StateChangeEvent) {
        self.events
            .borrow_mut()
            .push((topic.to_string(), event.clone()));
    }
}
