//! Failure classification for retry decisions

use vs_core::error::ScriptError;

/// Whether a failed attempt is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retryable: timeouts and transient connectivity problems
    Transient,
    /// Not retryable: bad object references, permission errors, ...
    Permanent,
}

impl FailureClass {
    /// Classify a script error.
    ///
    /// A timeout is always transient. An execution error is transient when
    /// its message contains one of `signatures` (case-insensitive). Anything
    /// else is permanent.
    pub fn classify(error: &ScriptError, signatures: &[String]) -> Self {
        match error {
            ScriptError::Timeout { .. } => FailureClass::Transient,
            ScriptError::Execution { message, .. } => {
                let message = message.to_lowercase();
                if signatures
                    .iter()
                    .any(|sig| !sig.is_empty() && message.contains(&sig.to_lowercase()))
                {
                    FailureClass::Transient
                } else {
                    FailureClass::Permanent
                }
            }
            _ => FailureClass::Permanent,
        }
    }

    pub fn is_transient(self) -> bool {
        self == FailureClass::Transient
    }
}
