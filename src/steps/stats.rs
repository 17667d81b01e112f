use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{SecurityLevel, StepCategory};

/// Execution counters for one registered step. Mutated only by the
/// dispatcher, under the step's lock.
///
/// Invariant: `total == successes + failures`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepStats {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_elapsed_ms: u64,
    pub min_elapsed_ms: Option<u64>,
    pub max_elapsed_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl StepStats {
    pub(crate) fn record_success(&mut self, elapsed_ms: u64) {
        self.total += 1;
        self.successes += 1;
        self.record_elapsed(elapsed_ms);
        self.last_success_at = Some(Utc::now());
    }

    pub(crate) fn record_failure(&mut self, elapsed_ms: u64, error: &str) {
        self.total += 1;
        self.failures += 1;
        self.record_elapsed(elapsed_ms);
        self.last_error = Some(error.to_string());
        self.last_failure_at = Some(Utc::now());
    }

    fn record_elapsed(&mut self, elapsed_ms: u64) {
        self.total_elapsed_ms += elapsed_ms;
        self.min_elapsed_ms = Some(self.min_elapsed_ms.map_or(elapsed_ms, |m| m.min(elapsed_ms)));
        self.max_elapsed_ms = Some(self.max_elapsed_ms.map_or(elapsed_ms, |m| m.max(elapsed_ms)));
    }

    #[must_use]
    pub fn average_elapsed_ms(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.total_elapsed_ms as f64 / self.total as f64
        }
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.successes as f64 / self.total as f64
        }
    }
}

/// Registry-wide aggregate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_steps: usize,
    pub by_category: Vec<(StepCategory, usize)>,
    pub by_security_level: Vec<(SecurityLevel, usize)>,
    pub total_executions: u64,
    pub total_failures: u64,
    pub success_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_stay_consistent() {
        let mut stats = StepStats::default();
        stats.record_success(10);
        stats.record_failure(30, "boom");
        stats.record_success(20);
        assert_eq!(stats.total, stats.successes + stats.failures);
        assert_eq!(stats.min_elapsed_ms, Some(10));
        assert_eq!(stats.max_elapsed_ms, Some(30));
        assert!((stats.average_elapsed_ms() - 20.0).abs() < f64::EPSILON);
        assert_eq!(stats.last_error.as_deref(), Some("boom"));
    }
}
