//! Run reporting.
//!
//! Stage adapters and the harvest runner talk to a [`Reporter`] instead of
//! printing. The binary plugs in [`ConsoleReporter`]; library users and tests
//! can use [`TracingReporter`] or their own implementation.

use std::fmt;

use console::style;
use tracing::{error, info, warn};

use crate::pipeline::PipelineResult;

/// Sink for user-facing progress messages.
pub trait Reporter: Send + Sync {
    /// A step is about to start.
    fn processing(&self, message: &str);
    /// A step succeeded.
    fn ok(&self, message: &str);
    /// A step failed.
    fn nok(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, error: &dyn fmt::Display);

    /// Report the outcome of a finished step together with its error, if any.
    fn outcome(&self, message: &str, error: Option<&dyn fmt::Display>) {
        match error {
            Some(e) => {
                self.nok(message);
                self.error(e);
            }
            None => self.ok(message),
        }
    }

    /// Summarise a stage: `"<done> N files"` then `"N files failed"`.
    fn stage_summary(&self, done: &str, result: &PipelineResult) {
        self.ok(&format!("{} {} files", done, result.success));
        self.nok(&format!("{} files failed", result.fails));
    }
}

/// Coloured status lines on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn processing(&self, message: &str) {
        println!("[{}] {}", style("..").white(), style(message).cyan());
    }

    fn ok(&self, message: &str) {
        println!("[{}] {}", style("OK").green(), message);
    }

    fn nok(&self, message: &str) {
        println!("[{}] {}", style("KO").red(), message);
    }

    fn warning(&self, message: &str) {
        println!("[{}] {}", style("!!").yellow(), style(message).yellow());
    }

    fn error(&self, error: &dyn fmt::Display) {
        println!("{}", style(error).red());
    }
}

/// Routes every message into `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn processing(&self, message: &str) {
        info!("{}", message);
    }

    fn ok(&self, message: &str) {
        info!("OK: {}", message);
    }

    fn nok(&self, message: &str) {
        warn!("KO: {}", message);
    }

    fn warning(&self, message: &str) {
        warn!("{}", message);
    }

    fn error(&self, e: &dyn fmt::Display) {
        error!("{}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Reporter for Recorder {
        fn processing(&self, message: &str) {
            self.0.lock().unwrap().push(format!(".. {}", message));
        }
        fn ok(&self, message: &str) {
            self.0.lock().unwrap().push(format!("OK {}", message));
        }
        fn nok(&self, message: &str) {
            self.0.lock().unwrap().push(format!("KO {}", message));
        }
        fn warning(&self, message: &str) {
            self.0.lock().unwrap().push(format!("!! {}", message));
        }
        fn error(&self, error: &dyn fmt::Display) {
            self.0.lock().unwrap().push(format!("ERR {}", error));
        }
    }

    #[test]
    fn test_stage_summary_lines() {
        let recorder = Recorder::default();
        recorder.stage_summary(
            "Downloaded",
            &PipelineResult {
                total: 5,
                success: 3,
                fails: 2,
            },
        );
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["OK Downloaded 3 files", "KO 2 files failed"]
        );
    }

    #[test]
    fn test_outcome_with_error() {
        let recorder = Recorder::default();
        recorder.outcome("Login to portal", Some(&"HTTP 401"));
        recorder.outcome("Get documents", None);
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["KO Login to portal", "ERR HTTP 401", "OK Get documents"]
        );
    }
}
