// SPDX-License-Identifier: PMPL-1.0-or-later
//! Pushdown error types.

use thiserror::Error;

/// Errors raised while building pushdown operators or compiling them to SQL.
///
/// A rule that declines a node returns `Ok(None)`; these variants are for
/// states that a correct caller should never reach.
#[derive(Error, Debug)]
pub enum PushdownError {
    #[error("join condition is not a conjunction of field equalities")]
    NonEquiJoin,

    #[error("invalid aggregate: {0}")]
    InvalidAggregate(String),

    #[error("{0} ALL cannot be pushed down")]
    SetOperatorAll(&'static str),

    #[error("input has convention {found}, expected {expected}")]
    MixedConvention { expected: String, found: String },

    #[error("{operator} expects {expected} input(s), got {actual}")]
    InputArity {
        operator: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("table {table} is not {capability}")]
    MissingCapability {
        table: String,
        capability: &'static str,
    },

    #[error("SQL emission is not implemented for {0}")]
    UnsupportedEmission(&'static str),

    #[error("VALUES with no tuples has no SQL form")]
    EmptyValues,

    #[error("field {ordinal} out of range for row of {count} field(s)")]
    FieldOutOfRange { ordinal: usize, count: usize },

    #[error("local reference {0} outside the program's expression list")]
    UnknownLocalRef(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PushdownError {
    /// True for defects in rule or caller logic rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            PushdownError::NonEquiJoin
                | PushdownError::InvalidAggregate(_)
                | PushdownError::SetOperatorAll(_)
                | PushdownError::MixedConvention { .. }
                | PushdownError::InputArity { .. }
                | PushdownError::MissingCapability { .. }
                | PushdownError::UnsupportedEmission(_)
        )
    }
}
