//! Error classification shared by every subsystem.

use std::fmt;

/// How an error affects the run it occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Configuration or authentication cannot proceed; the run aborts
    /// before any pipeline stage starts.
    FatalSetup,
    /// A well-formed response broke the session protocol. Fatal at login.
    ProtocolViolation,
    /// A single item failed inside a stage. Counted, logged, never retried.
    PerItemTransient,
}

impl ErrorClass {
    /// Whether the error stops the whole run.
    pub fn is_fatal(self) -> bool {
        !matches!(self, ErrorClass::PerItemTransient)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorClass::FatalSetup => "fatal setup error",
            ErrorClass::ProtocolViolation => "protocol violation",
            ErrorClass::PerItemTransient => "item failure",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classes() {
        assert!(ErrorClass::FatalSetup.is_fatal());
        assert!(ErrorClass::ProtocolViolation.is_fatal());
        assert!(!ErrorClass::PerItemTransient.is_fatal());
    }
}
