//! Fan-out/fan-in executor.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinError;
use tracing::{debug, warn};

use super::outcome::{ItemOutcome, PipelineResult};
use crate::errors::ErrorClass;

/// Reasons a run could not be carried out. Item failures are never errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("concurrency limit must be at least 1")]
    InvalidConcurrency,
    #[error("pipeline aggregator was lost: {0}")]
    Aggregator(#[from] JoinError),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::FatalSetup
    }
}

/// Runs a per-item action over a batch and counts the outcomes.
///
/// Each item gets its own task. Outcomes travel over one channel to exactly
/// one aggregator task, the only writer of the counters. `run` returns once
/// the aggregator has seen one outcome per item.
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    label: String,
    max_concurrency: Option<usize>,
}

impl PipelineExecutor {
    /// Create an executor with no concurrency cap.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            max_concurrency: None,
        }
    }

    /// Cap how many actions may be in flight at once. `None` launches every
    /// item immediately.
    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run `action` once per item and return the aggregate counts.
    ///
    /// Failed or panicking actions are caught inside their task, logged and
    /// counted; they never abort the batch. No ordering among items.
    pub async fn run<T, F, Fut, E>(
        &self,
        items: Vec<T>,
        action: F,
    ) -> Result<PipelineResult, PipelineError>
    where
        T: fmt::Display + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        if self.max_concurrency == Some(0) {
            return Err(PipelineError::InvalidConcurrency);
        }

        let total = items.len();
        debug!(stage = %self.label, total, "Starting pipeline run");

        let (tx, rx) = mpsc::unbounded_channel::<ItemOutcome>();
        let aggregator = tokio::spawn(aggregate(rx, total));

        let action = Arc::new(action);
        let limiter = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));

        for item in items {
            let tx = tx.clone();
            let action = Arc::clone(&action);
            let limiter = limiter.clone();
            let label = self.label.clone();

            tokio::spawn(async move {
                let _permit = match limiter {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };

                let description = item.to_string();
                let attempt = AssertUnwindSafe(async move { action(item).await });

                let outcome = match attempt.catch_unwind().await {
                    Ok(Ok(())) => ItemOutcome::success(),
                    Ok(Err(e)) => ItemOutcome::failure(e.to_string()),
                    Err(panic) => ItemOutcome::failure(panic_message(&*panic)),
                };

                if let Some(ref error) = outcome.error {
                    warn!(stage = %label, item = %description, "{}", error);
                }

                // The aggregator outlives every sender, so this cannot fail
                // unless the aggregator itself panicked.
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        let result = aggregator.await?;
        debug!(
            stage = %self.label,
            success = result.success,
            fails = result.fails,
            "Pipeline run complete"
        );
        Ok(result)
    }
}

/// Single consumer of the completion channel.
async fn aggregate(mut rx: mpsc::UnboundedReceiver<ItemOutcome>, total: usize) -> PipelineResult {
    let mut result = PipelineResult::new(total);
    let mut completed = 0;

    while completed < total {
        match rx.recv().await {
            Some(outcome) => {
                result.record(&outcome);
                completed += 1;
            }
            // Every sender is gone without reporting; nothing else can arrive.
            None => break,
        }
    }

    result.finish()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("action panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("action panicked: {}", s)
    } else {
        "action panicked".to_string()
    }
}
