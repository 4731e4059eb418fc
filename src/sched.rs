// ==============================================================================
// sched.rs — SIMULATION-TIME SCHEDULING
// ------------------------------------------------------------------------------
// Everything deferred in a run is measured in simulated seconds, never wall
// clock:
// - Timeline<T>: one-shot tasks (boost expiry, crash stages) with handles that
//   can cancel a pending task before it fires.
// - PeriodicCheck: fixed-interval checks (traffic spawn / cleanup) driven by
//   the tick instead of a suspended loop.
//
// Both are advanced by the owner with the fixed dt of the physics tick.
// ==============================================================================

/// Identifies one scheduled task on a `Timeline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

#[derive(Debug)]
struct Scheduled<T> {
    handle: TaskHandle,
    due: f64,
    task: T,
}

#[derive(Debug)]
pub struct Timeline<T> {
    now: f64,
    next_id: u64,
    pending: Vec<Scheduled<T>>,
}

impl<T> Default for Timeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Timeline<T> {
    pub fn new() -> Self {
        Self {
            now: 0.0,
            next_id: 0,
            pending: Vec::new(),
        }
    }

    /// Current simulated time in seconds.
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn schedule_after(&mut self, delay: f32, task: T) -> TaskHandle {
        let handle = TaskHandle(self.next_id);
        self.next_id += 1;

        self.pending.push(Scheduled {
            handle,
            due: self.now + f64::from(delay.max(0.0)),
            task,
        });
        handle
    }

    /// Returns false when the task already fired or was cancelled.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        match self.pending.iter().position(|s| s.handle == handle) {
            Some(idx) => {
                self.pending.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, handle: TaskHandle) -> bool {
        self.pending.iter().any(|s| s.handle == handle)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Moves time forward and hands back every task that became due, earliest
    /// first (ties keep scheduling order).
    pub fn advance(&mut self, dt: f32) -> Vec<T> {
        self.now += f64::from(dt.max(0.0));

        let now = self.now;
        let (mut due, waiting): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|s| s.due <= now + 1e-9);
        self.pending = waiting;

        due.sort_by(|a, b| {
            a.due
                .total_cmp(&b.due)
                .then_with(|| a.handle.0.cmp(&b.handle.0))
        });
        due.into_iter().map(|s| s.task).collect()
    }
}

/// Fires every `interval` simulated seconds after an initial delay.
#[derive(Debug, Clone)]
pub struct PeriodicCheck {
    interval: f32,
    until_next: f32,
}

impl PeriodicCheck {
    pub fn new(interval: f32, initial_delay: f32) -> Self {
        Self {
            interval: interval.max(f32::EPSILON),
            until_next: initial_delay.max(0.0),
        }
    }

    /// Number of times the check fired during this `dt`.
    pub fn tick(&mut self, dt: f32) -> u32 {
        self.until_next -= dt.max(0.0);

        let mut fired = 0;
        while self.until_next <= 1e-6 {
            fired += 1;
            self.until_next += self.interval;
        }
        fired
    }

    pub fn reset(&mut self, initial_delay: f32) {
        self.until_next = initial_delay.max(0.0);
    }
}
