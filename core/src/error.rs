//! Error types and status codes for the virtual table protocol.
//!
//! Every failure a module or the registry produces is a [`BridgeError`];
//! before a result crosses back to the engine it is reduced to a
//! [`StatusCode`] (the only values the engine interprets structurally) plus
//! a message recorded on the owning table handle.

use thiserror::Error;

use crate::schema::SchemaError;
use crate::value::FromValueError;

/// Status codes the engine interprets structurally.
///
/// Anything richer than these six values travels as an opaque message
/// string attached to the table handle.
///
/// # Examples
///
/// ```
/// use vtab_bridge_core::{BridgeError, StatusCode};
///
/// assert_eq!(StatusCode::Ok.code(), 0);
/// assert_eq!(BridgeError::misuse("next before filter").status(), StatusCode::Misuse);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// Success.
    Ok,
    /// Generic failure.
    Error,
    /// Allocation failure.
    NoMemory,
    /// Requested entity does not exist.
    NotFound,
    /// A module-level constraint was violated during mutation.
    Constraint,
    /// Protocol callback invoked in an invalid state or with invalid output.
    Misuse,
}

impl StatusCode {
    /// Returns the engine's numeric code for this status.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::Error => 1,
            StatusCode::NoMemory => 7,
            StatusCode::NotFound => 12,
            StatusCode::Constraint => 19,
            StatusCode::Misuse => 21,
        }
    }

    /// Returns `true` for [`StatusCode::Ok`].
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, StatusCode::Ok)
    }
}

/// Errors produced by table modules and the module registry.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Module-specific failure with a human-readable message.
    #[error("module error: {0}")]
    Module(String),

    /// A protocol callback was invoked in an invalid state, or a module
    /// produced invalid planning output.
    #[error("protocol misuse: {0}")]
    Misuse(String),

    /// Handle memory could not be allocated.
    #[error("out of memory")]
    NoMemory,

    /// A module-level constraint was violated during mutation.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// A requested row, module, or table does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A callback argument could not represent the requested type.
    #[error("argument {index}: {source}")]
    InvalidArgument {
        /// Zero-based position in the argument vector.
        index: usize,
        /// Underlying conversion failure.
        source: FromValueError,
    },

    /// The schema a module declared on connect is structurally invalid.
    #[error("schema declaration failed: {0}")]
    Declaration(#[from] SchemaError),

    /// No module is registered under the requested name.
    #[error("no such module: {0}")]
    UnknownModule(String),

    /// A module is already registered under the requested name.
    #[error("module already registered: {0}")]
    DuplicateModule(String),

    /// A module argument was not a well-formed `key=value` pair.
    #[error("illegal module argument: '{0}'")]
    ModuleArgument(String),
}

impl BridgeError {
    /// Shorthand for a module-specific failure.
    pub fn module(msg: impl Into<String>) -> Self {
        BridgeError::Module(msg.into())
    }

    /// Shorthand for a protocol-misuse failure.
    pub fn misuse(msg: impl Into<String>) -> Self {
        BridgeError::Misuse(msg.into())
    }

    /// Shorthand for a mutation constraint violation.
    pub fn constraint(msg: impl Into<String>) -> Self {
        BridgeError::ConstraintViolation(msg.into())
    }

    /// Shorthand for a missing row, module, or table.
    pub fn not_found(msg: impl Into<String>) -> Self {
        BridgeError::NotFound(msg.into())
    }

    /// Reduces this error to the status code reported to the engine.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            BridgeError::NoMemory => StatusCode::NoMemory,
            BridgeError::Misuse(_) => StatusCode::Misuse,
            BridgeError::ConstraintViolation(_) => StatusCode::Constraint,
            BridgeError::NotFound(_) | BridgeError::UnknownModule(_) => StatusCode::NotFound,
            BridgeError::Module(_)
            | BridgeError::InvalidArgument { .. }
            | BridgeError::Declaration(_)
            | BridgeError::DuplicateModule(_)
            | BridgeError::ModuleArgument(_) => StatusCode::Error,
        }
    }
}

/// Convenience alias for results with [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(BridgeError::NoMemory.status(), StatusCode::NoMemory);
        assert_eq!(BridgeError::misuse("x").status(), StatusCode::Misuse);
        assert_eq!(BridgeError::constraint("x").status(), StatusCode::Constraint);
        assert_eq!(BridgeError::not_found("x").status(), StatusCode::NotFound);
        assert_eq!(BridgeError::module("x").status(), StatusCode::Error);
        assert_eq!(
            BridgeError::UnknownModule("m".into()).status(),
            StatusCode::NotFound
        );
    }

    #[test]
    fn test_status_codes_are_distinct() {
        let codes = [
            StatusCode::Ok,
            StatusCode::Error,
            StatusCode::NoMemory,
            StatusCode::NotFound,
            StatusCode::Constraint,
            StatusCode::Misuse,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }
}
