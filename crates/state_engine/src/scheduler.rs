use crate::registry::OwnerId;

const DUE_EPSILON_SECONDS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

/// The work a scheduled timer carries: deactivate `state` on `owner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeactivationTask {
    pub owner: OwnerId,
    pub state: String,
}

/// Deferred single-shot callbacks driven by the host's update loop.
///
/// `advance` returns the tasks that came due during the step, in due order;
/// the registry runs them. Cancelling an unknown or fired handle is a no-op.
pub trait Scheduler {
    fn schedule(&mut self, delay_seconds: f32, task: DeactivationTask) -> TimerHandle;
    fn cancel(&mut self, handle: TimerHandle) -> bool;
    fn advance(&mut self, dt_seconds: f32) -> Vec<(TimerHandle, DeactivationTask)>;
}

#[derive(Debug)]
struct PendingTimer {
    handle: TimerHandle,
    due_at_seconds: f64,
    task: DeactivationTask,
}

/// Virtual-clock scheduler advanced by fixed steps.
#[derive(Debug, Default)]
pub struct TimerQueue {
    now_seconds: f64,
    next_handle: u64,
    pending: Vec<PendingTimer>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_seconds(&self) -> f64 {
        self.now_seconds
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn sanitize_seconds(seconds: f32) -> f64 {
    if !seconds.is_finite() {
        return 0.0;
    }
    f64::from(seconds.max(0.0))
}

impl Scheduler for TimerQueue {
    fn schedule(&mut self, delay_seconds: f32, task: DeactivationTask) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle = self.next_handle.saturating_add(1);
        self.pending.push(PendingTimer {
            handle,
            due_at_seconds: self.now_seconds + sanitize_seconds(delay_seconds),
            task,
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|timer| timer.handle != handle);
        before != self.pending.len()
    }

    fn advance(&mut self, dt_seconds: f32) -> Vec<(TimerHandle, DeactivationTask)> {
        self.now_seconds += sanitize_seconds(dt_seconds);
        let deadline = self.now_seconds + DUE_EPSILON_SECONDS;

        let mut due = Vec::new();
        let mut index = 0;
        while index < self.pending.len() {
            if self.pending[index].due_at_seconds <= deadline {
                due.push(self.pending.swap_remove(index));
            } else {
                index += 1;
            }
        }
        due.sort_by(|a, b| {
            a.due_at_seconds
                .total_cmp(&b.due_at_seconds)
                .then(a.handle.cmp(&b.handle))
        });
        due.into_iter()
            .map(|timer| (timer.handle, timer.task))
            .collect()
    }
}
