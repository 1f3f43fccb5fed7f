//! Stats Counter (spec.md §3): an append-only log of `[timestamp, amount]`
//! per `(key, counter_name)`, bounded by entry count and age. Used for
//! success/error rates and, indirectly, the circuit breaker's skip decisions
//! (the breaker keeps its own short event log, see `llm::circuit_breaker`,
//! but shares this module's retention shape).

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct StatEntry {
    pub timestamp: DateTime<Utc>,
    pub amount: i64,
}

/// A single named counter's append-only history.
#[derive(Debug, Default, Clone)]
pub struct Counter {
    entries: Vec<StatEntry>,
}

impl Counter {
    pub fn record(&mut self, amount: i64, now: DateTime<Utc>) {
        self.entries.push(StatEntry {
            timestamp: now,
            amount,
        });
    }

    pub fn sum(&self) -> i64 {
        self.entries.iter().map(|e| e.amount).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn prune(&mut self, max_entries: usize, retention_days: i64, now: DateTime<Utc>) {
        let cutoff = now - Duration::days(retention_days);
        self.entries.retain(|e| e.timestamp >= cutoff);
        if self.entries.len() > max_entries {
            let drop = self.entries.len() - max_entries;
            self.entries.drain(0..drop);
        }
    }
}

/// Keyed stats store, e.g. `modelStatsV4` / `actionStatsV4` (spec.md §6).
#[derive(Debug, Default)]
pub struct StatsStore {
    counters: HashMap<(String, String), Counter>,
    max_entries: usize,
    retention_days: i64,
}

impl StatsStore {
    pub fn new(max_entries: usize, retention_days: i64) -> Self {
        Self {
            counters: HashMap::new(),
            max_entries,
            retention_days,
        }
    }

    pub fn record(&mut self, key: impl Into<String>, counter: impl Into<String>, amount: i64, now: DateTime<Utc>) {
        let entry = self
            .counters
            .entry((key.into(), counter.into()))
            .or_default();
        entry.record(amount, now);
        entry.prune(self.max_entries, self.retention_days, now);
    }

    pub fn get(&self, key: &str, counter: &str) -> Option<&Counter> {
        self.counters.get(&(key.to_string(), counter.to_string()))
    }
}
