//! Graph definition error types.

use thiserror::Error;

/// Errors raised while building or editing a graph definition.
///
/// All of these describe malformed input. None are transient, so callers
/// should surface them rather than retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("malformed extended attributes: {0}")]
    Decode(String),
    #[error(
        "secondary component lists differ in length \
         (type-2={types}, path-2={paths}, gmode-2={gmodes}, stack-2={stacks})"
    )]
    CompositeMismatch {
        types: usize,
        paths: usize,
        gmodes: usize,
        stacks: usize,
    },
    #[error("missing primary component field: {0}")]
    MissingComponent(&'static str),
    #[error("invalid value for {key}: expected {expected}")]
    InvalidField { key: String, expected: &'static str },
    #[error("malformed complex descriptor: {0}")]
    MalformedDescriptor(String),
}
