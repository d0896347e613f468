use thiserror::Error;

/// Recoverable errors: configuration that fails validation, and snapshot
/// I/O in the command line driver. Violated invariants inside the numerical
/// core are not represented here; they panic.
///
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("geometry coarsening failed: {0}")]
    Coarsening(#[from] CoarseningError),

    #[error("failed to write snapshot: {0}")]
    Snapshot(String),

    #[error("failed to install the logger: {0}")]
    Logger(#[from] log::SetLoggerError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Raised when a fine graph cannot be coarsened under the requested policy.
///
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CoarseningError {
    #[error("coarse cell ({0} {1}) would need {2} volumes under a single-valued policy")]
    DisconnectedComponents(i64, i64, usize),

    #[error("domain {0:?} is not coarsenable by {1}")]
    NotCoarsenable((i64, i64), i64),
}
