//! Per-item outcomes and aggregate stage results.

use serde::Serialize;

/// Outcome of one action, as seen by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub success: bool,
    /// Diagnostic for failed items. Only logged, never returned to callers.
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Aggregate counts for one stage invocation.
///
/// Once a run completes, `success + fails == total` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    pub total: usize,
    pub success: usize,
    pub fails: usize,
}

impl PipelineResult {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            total,
            success: 0,
            fails: 0,
        }
    }

    /// Fold one outcome into the counters.
    pub(crate) fn record(&mut self, outcome: &ItemOutcome) {
        if outcome.success {
            self.success += 1;
        }
        self.fails = self.total - self.success;
    }

    /// Close the books: items that never reported count as failures.
    pub(crate) fn finish(mut self) -> Self {
        self.fails = self.total - self.success;
        self
    }

    pub fn all_succeeded(&self) -> bool {
        self.fails == 0
    }
}
