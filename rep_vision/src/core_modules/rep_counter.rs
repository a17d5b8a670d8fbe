// THEORY:
// The `RepCounter` owns the one number the whole engine exists to produce. It is
// shared by every limb of a detector, which is what makes the two counting rules
// enforceable in a single place:
//
// 1.  **Cooldown**: a rep is only counted if strictly more than the cooldown has
//     elapsed since the previous counted rep. Timestamps that go backwards are
//     treated as "no time elapsed".
// 2.  **Once per Frame**: limbs report how many of them closed a cycle this frame,
//     and the counter settles that into at most one increment. Two legs crossing
//     their thresholds together are one physical motion, whatever order they were
//     evaluated in.
//
// The count only ever grows. It returns to zero only through `reset`, which the
// lifecycle controller calls at set boundaries. The controller also `arm`s the
// counter when a set starts, so the cooldown runs from the start of the set.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RepCounter {
    count: u32,
    last_rep: Option<Instant>,
    cooldown: Duration,
}

impl RepCounter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            count: 0,
            last_rep: None,
            cooldown,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn last_rep(&self) -> Option<Instant> {
        self.last_rep
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// True while a new rep at `now` would fall inside the cooldown window.
    pub fn cooling_down(&self, now: Instant) -> bool {
        self.last_rep
            .is_some_and(|last| now.saturating_duration_since(last) <= self.cooldown)
    }

    /// Settles one frame: `completions` limbs finished a cycle at `now`.
    /// Returns the new count if a rep was counted.
    pub fn settle(&mut self, completions: usize, now: Instant) -> Option<u32> {
        if completions == 0 || self.cooling_down(now) {
            return None;
        }
        self.count += 1;
        self.last_rep = Some(now);
        Some(self.count)
    }

    /// Starts the cooldown window at `now` without counting a rep.
    pub fn arm(&mut self, now: Instant) {
        self.last_rep = Some(now);
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.last_rep = None;
    }
}
