use snafu::Snafu;

use crate::config::{PollId, UserId};

/// Errors returned by the engine.
///
/// `PollClosed` and `DuplicateVote` are expected outcomes of a vote request and
/// leave the ledger untouched. The other variants are caller errors, except
/// `Storage` which is fatal for the request that hit it.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PollError {
    #[snafu(display("Invalid poll: {reason}"))]
    Validation { reason: String },

    #[snafu(display("Poll {poll_id} not found"))]
    NotFound { poll_id: PollId },

    #[snafu(display("Poll {poll_id} is closed"))]
    PollClosed { poll_id: PollId },

    #[snafu(display("Voter {voter_id} has already voted in poll {poll_id}"))]
    DuplicateVote { poll_id: PollId, voter_id: UserId },

    #[snafu(display(
        "Option {option_index} does not exist in poll {poll_id} ({option_count} options)"
    ))]
    InvalidOption {
        poll_id: PollId,
        option_index: usize,
        option_count: usize,
    },

    #[snafu(display("User {actor_id} may not change the flags of poll {poll_id}"))]
    Unauthorized { poll_id: PollId, actor_id: UserId },

    #[snafu(display("Poll {poll_id} is not anonymous and requires a voter identity"))]
    VoterRequired { poll_id: PollId },

    #[snafu(display("Storage failure: {message}"))]
    Storage { message: String },
}

impl PollError {
    /// True for the user-facing conditions a client may recover from
    /// (voting after the end, voting twice).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PollError::PollClosed { .. } | PollError::DuplicateVote { .. }
        )
    }

    /// A short machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PollError::Validation { .. } => "validation",
            PollError::NotFound { .. } => "not_found",
            PollError::PollClosed { .. } => "poll_closed",
            PollError::DuplicateVote { .. } => "duplicate_vote",
            PollError::InvalidOption { .. } => "invalid_option",
            PollError::Unauthorized { .. } => "unauthorized",
            PollError::VoterRequired { .. } => "voter_required",
            PollError::Storage { .. } => "storage",
        }
    }
}

pub type PollResult<T> = Result<T, PollError>;
