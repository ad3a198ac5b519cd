//! Error taxonomy for the engine.
//!
//! Every public operation returns [`anyhow::Result`]; when the engine itself is
//! the origin of a failure, the root cause is a [`MeduceError`], so callers can
//! branch on it with `err.downcast_ref::<MeduceError>()`.

use std::any::Any;
use std::fmt;
use thiserror::Error;

/// The user-supplied callable that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Mapper,
    Reducer,
    Ordering,
    Finalizer,
    Filter,
    Sink,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Mapper => "mapper",
            Stage::Reducer => "reducer",
            Stage::Ordering => "ordering",
            Stage::Finalizer => "finalizer",
            Stage::Filter => "filter",
            Stage::Sink => "sink",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum MeduceError {
    /// A required piece of configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A user callable panicked while the process was running.
    #[error("{stage} failed: {message}")]
    Callable { stage: Stage, message: String },

    /// A producer or sink could not read or write its backing resource.
    #[error("resource error: {0}")]
    Resource(String),

    /// An operation was attempted outside of its allowed lifecycle.
    #[error("misuse: {0}")]
    Misuse(String),

    #[error("process was cancelled")]
    Cancelled,
}

impl MeduceError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub(crate) fn misuse(message: impl Into<String>) -> Self {
        Self::Misuse(message.into())
    }

    pub(crate) fn resource(message: impl Into<String>) -> Self {
        Self::Resource(message.into())
    }

    /// Build a `Callable` error out of a caught panic payload.
    pub(crate) fn from_panic(stage: Stage, payload: Box<dyn Any + Send>) -> Self {
        Self::Callable {
            stage,
            message: panic_message(payload.as_ref()),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// True when `err` (or anything in its context chain) is [`MeduceError::Cancelled`].
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<MeduceError>(),
            Some(MeduceError::Cancelled)
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_callable_errors() {
        let err = MeduceError::from_panic(Stage::Reducer, Box::new("boom"));
        assert_eq!(err.to_string(), "reducer failed: boom");

        let err = MeduceError::from_panic(Stage::Mapper, Box::new(String::from("bad line")));
        assert_eq!(err.to_string(), "mapper failed: bad line");

        let err = MeduceError::from_panic(Stage::Filter, Box::new(42u8));
        assert!(matches!(err, MeduceError::Callable { stage: Stage::Filter, .. }));
    }

    #[test]
    fn cancellation_is_found_through_context() {
        let err = anyhow::Error::new(MeduceError::Cancelled).context("reducing phase");
        assert!(is_cancelled(&err));
        assert!(!is_cancelled(&anyhow::anyhow!("other")));
    }
}
