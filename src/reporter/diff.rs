//! Monotonic-counter differencing across reporting cycles.

use std::collections::HashMap;

/// Last observed cumulative count per metric identity.
///
/// The pipeline submits only the change in each cumulative counter since the
/// previous cycle, so the counters themselves never need resetting. Owned
/// exclusively by one pipeline instance; cycles never overlap, so no
/// synchronization is needed. Identities of metrics that disappear from the
/// snapshot are simply never read again.
#[derive(Debug, Default)]
pub struct CounterDiffState {
    last_polled_counts: HashMap<String, u64>,
}

impl CounterDiffState {
    /// Empty diff state.
    pub fn new() -> Self {
        CounterDiffState::default()
    }

    /// Delta of `count` against the last observation for `identity`, with
    /// `count` stored as the new last observation either way. A never-seen
    /// identity diffs against zero, so the first cycle reports the full
    /// count since process start.
    pub fn diff_last(&mut self, identity: &str, count: u64) -> i64 {
        let last = self
            .last_polled_counts
            .insert(identity.to_string(), count)
            .unwrap_or(0);
        count as i64 - last as i64
    }

    /// Number of identities currently tracked.
    pub fn tracked(&self) -> usize {
        self.last_polled_counts.len()
    }
}
