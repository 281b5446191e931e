use super::WorkerId;
use crate::config::ConfigError;
use std::{any::Any, fmt, time::Duration};

#[derive(thiserror::Error, Debug)]
pub enum MapperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Transform failed: {0}")]
    Transform(TransformFailure),
    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),
    #[error("Execution cancelled")]
    Cancelled,
    #[error("Worker lost: {0}")]
    WorkerLost(String),
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The fallible transform returned `Err`.
    Error(String),
    /// The transform panicked.
    Panic(String),
}

/// A single input the transform could not turn into an output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformFailure {
    /// Position of the input in the original sequence.
    pub index: usize,
    pub worker_id: WorkerId,
    pub reason: FailureReason,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Error(msg) => write!(f, "error: {msg}"),
            FailureReason::Panic(msg) => write!(f, "panic: {msg}"),
        }
    }
}

impl fmt::Display for TransformFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input #{} on worker-{}: {}",
            self.index, self.worker_id, self.reason
        )
    }
}

impl std::error::Error for TransformFailure {}

/// Best effort text out of a `catch_unwind` / `JoinError` payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_display_mentions_input() {
        let failure = TransformFailure {
            index: 7,
            worker_id: WorkerId::new(2),
            reason: FailureReason::Panic("boom".to_string()),
        };
        assert_eq!(failure.to_string(), "input #7 on worker-2: panic: boom");

        let err = MapperError::Transform(failure);
        assert!(err.to_string().contains("input #7"));
    }

    #[test]
    fn panic_message_payloads() {
        let static_str: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(static_str.as_ref()), "static");

        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");

        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
