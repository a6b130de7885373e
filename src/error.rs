/// Error kinds shared by the ingest, simulation and codec layers.
///
/// Per-record failures (an unknown spell, a crit on a cannot-crit spell) are
/// reported through these and handled by the caller; they never abort a whole
/// encounter. Unsupported builds are not errors, see `build_version`.
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Input that cannot be interpreted: a truncated buffer, mismatched arrays.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A lookup key with no entry (spec id, item id, ilvl, spell id).
    #[error("unknown {kind}: {id}")]
    UnknownEntity { kind: &'static str, id: u64 },

    /// A single record that contradicts itself.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl LedgerError {
    pub fn unknown(kind: &'static str, id: impl Into<u64>) -> Self {
        Self::UnknownEntity { kind, id: id.into() }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
