use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime};

use api_key::Rejection;

/// Result of authenticating one request at the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    /// No credential header at all.
    Missing,
    Rejected(Rejection),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::Missing => "missing",
            Outcome::Rejected(reason) => reason.label(),
        }
    }
}

/// In-memory per-minute authentication outcome counts.
///
/// Keyed by outcome label rather than by presented key, so unauthenticated
/// traffic cannot grow the map.
#[derive(Default)]
pub struct Metrics {
    counts: std::sync::Mutex<BTreeMap<u64, HashMap<&'static str, u64>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome using the current wall-clock time.
    pub fn record(&self, outcome: Outcome) {
        self.record_at(outcome, SystemTime::now());
    }

    pub fn record_at(&self, outcome: Outcome, at: SystemTime) {
        let minute = Self::minute_bucket(at);
        let mut guard = self.counts.lock().expect("metrics store poisoned");
        *guard
            .entry(minute)
            .or_default()
            .entry(outcome.label())
            .or_insert(0) += 1;
    }

    /// Per-minute counts, oldest minute first.
    pub fn snapshot(&self) -> BTreeMap<u64, HashMap<&'static str, u64>> {
        self.counts.lock().expect("metrics store poisoned").clone()
    }

    /// Counts summed over every minute.
    pub fn totals(&self) -> HashMap<&'static str, u64> {
        let mut totals = HashMap::new();
        for minute in self.counts.lock().expect("metrics store poisoned").values() {
            for (label, count) in minute {
                *totals.entry(*label).or_insert(0) += *count;
            }
        }
        totals
    }

    /// Drop buckets older than `before`.
    pub fn prune(&self, before: SystemTime) {
        let cutoff = Self::minute_bucket(before);
        let mut guard = self.counts.lock().expect("metrics store poisoned");
        let kept = guard.split_off(&cutoff);
        *guard = kept;
    }

    fn minute_bucket(at: SystemTime) -> u64 {
        at.duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
            / 60
    }
}
