// ─────────────────────────────────────────────────────────────────────
// Concord Kernel — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for all Concord Kernel failures.
///
/// A `REJECT` verdict is not an error: it is a successfully computed
/// outcome. Only malformed input and broken configuration end up here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConcordError {
    /// A state name is not present in the configured state space.
    /// Carries the sorted list of valid names for the caller.
    #[error("unknown state '{name}', valid states: [{}]", valid.join(", "))]
    UnknownState { name: String, valid: Vec<String> },

    /// Malformed request (empty identifiers, non-finite values, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration or state table error.
    #[error("config error: {0}")]
    Config(String),

    /// An externally supplied chain failed verification.
    #[error("ledger error: {0}")]
    Ledger(String),
}

impl ConcordError {
    pub fn unknown_state(name: impl Into<String>, valid: Vec<String>) -> Self {
        Self::UnknownState {
            name: name.into(),
            valid,
        }
    }
}

pub type ConcordResult<T> = Result<T, ConcordError>;
