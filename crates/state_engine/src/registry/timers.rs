use tracing::debug;

use crate::scheduler::{DeactivationTask, TimerHandle};

use super::types::OwnerId;
use super::StateRegistry;

impl StateRegistry {
    /// Schedules `set_state(owner, name, false)` after `delay_seconds`.
    /// A live timer for the same pair is cancelled first, so the window
    /// restarts instead of stacking.
    pub fn deactivate_state_timer(
        &mut self,
        owner: OwnerId,
        name: &str,
        delay_seconds: f32,
    ) -> TimerHandle {
        let key = (owner, name.to_string());
        if let Some(previous) = self.timers.remove(&key) {
            self.scheduler.cancel(previous);
            debug!(owner = %owner, state = name, "state_timer_restarted");
        }
        let handle = self.scheduler.schedule(
            delay_seconds,
            DeactivationTask {
                owner,
                state: name.to_string(),
            },
        );
        self.timers.insert(key, handle);
        handle
    }

    pub fn cancel_state_timer(&mut self, owner: OwnerId, name: &str) -> bool {
        match self.timers.remove(&(owner, name.to_string())) {
            Some(handle) => {
                self.scheduler.cancel(handle);
                true
            }
            None => false,
        }
    }

    pub fn has_state_timer(&self, owner: OwnerId, name: &str) -> bool {
        self.timers.contains_key(&(owner, name.to_string()))
    }

    /// Advances the scheduler by one fixed step and fires due deactivations.
    pub fn update(&mut self, fixed_dt_seconds: f32) {
        for (handle, task) in self.scheduler.advance(fixed_dt_seconds) {
            let key = (task.owner, task.state);
            if self.timers.get(&key) != Some(&handle) {
                debug!(owner = %key.0, state = %key.1, "state_timer_stale_ignored");
                continue;
            }
            self.timers.remove(&key);
            debug!(owner = %key.0, state = %key.1, "state_timer_fired");
            self.set_state(key.0, &key.1, false);
        }
    }
}
