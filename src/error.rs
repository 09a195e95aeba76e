//! Closed error taxonomy for the scheduler (design notes: exception-driven
//! control flow is replaced by typed `Result` returns).

use crate::ids::{GlobalSubproblemId, ProcessId};
use thiserror::Error;

/// Errors the engine can report. Fathoming is *not* an error — it is a
/// normal state transition handled by [`crate::handler::SubproblemHandler`] —
/// only genuine protocol/IO failures appear here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The application attempted an illegal subproblem state transition
    /// (e.g. splitting a subproblem that was never bounded, or reporting
    /// a negative child count). Fatal: triggers the abort-debug path.
    #[error("illegal state transition for subproblem {subproblem}: {detail}")]
    ProtocolViolation {
        subproblem: GlobalSubproblemId,
        detail: String,
    },

    /// A delivered token's id disagreed with its packed subproblem.
    /// Fatal only when `check_tokens_match` is set in [`crate::config::Config`];
    /// otherwise the caller should log and honor the token instead of
    /// propagating this.
    #[error("token/subproblem id mismatch: token names {expected} but payload is {actual}")]
    TokenMismatch {
        expected: GlobalSubproblemId,
        actual: GlobalSubproblemId,
    },

    /// A channel to or from the named process is gone. Recoverable from
    /// the caller's point of view only as far as noting the peer is no
    /// longer reachable; the scheduler otherwise treats it as
    /// unrecoverable for that peer.
    #[error("channel to process {0} closed")]
    ChannelClosed(ProcessId),

    /// Checkpoint write or read failed.
    #[error("checkpoint I/O error: {0}")]
    CheckpointIo(#[from] std::io::Error),

    /// Checkpoint payload failed to (de)serialize.
    #[error("checkpoint (de)serialization error: {0}")]
    Codec(#[from] bincode::Error),

    /// A complete checkpoint was expected (all per-process files plus the
    /// barrier marker) but is missing or partial.
    #[error("incomplete checkpoint at sequence {sequence}: {detail}")]
    IncompleteCheckpoint { sequence: u64, detail: String },

    /// Global round observed zero work but incumbent sources disagree;
    /// recovered by the load balancer inflating its round rate
    /// (`loadBalIdleIncrease`) until agreement, so this only surfaces if
    /// that recovery itself is exhausted (e.g. during a bounded test).
    #[error("termination disagreement: incumbent sources disagree at global zero load")]
    TerminationDisagreement,
}

/// Process-wide exit codes (spec §6): 0 normal, 1 user abort, 2 fatal
/// protocol error, 3 checkpoint I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Normal = 0,
    UserAbort = 1,
    ProtocolError = 2,
    CheckpointFailure = 3,
}

impl From<&EngineError> for ExitCode {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::ProtocolViolation { .. } | EngineError::TokenMismatch { .. } => {
                ExitCode::ProtocolError
            }
            EngineError::CheckpointIo(_)
            | EngineError::Codec(_)
            | EngineError::IncompleteCheckpoint { .. } => ExitCode::CheckpointFailure,
            EngineError::ChannelClosed(_) | EngineError::TerminationDisagreement => {
                ExitCode::ProtocolError
            }
        }
    }
}
