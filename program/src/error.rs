// Solotto - Errors
use solana_program::program_error::ProgramError;
use thiserror::Error;

/// Errors that may be returned by the lottery.
///
/// Every variant maps to a stable `ProgramError::Custom` code so that
/// callers can tell failures apart by kind.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum LotteryError {
    /// Invalid instruction data passed
    #[error("Invalid instruction data")]
    InvalidInstruction,

    /// Round configuration rejected at creation
    #[error("Invalid round configuration")]
    InvalidConfig,

    /// Payment below the entrance fee
    #[error("Not enough lamports entered")]
    InsufficientFee,

    /// Entry attempted while a winner is being calculated
    #[error("Lottery is not open")]
    RoundNotOpen,

    /// The treasury could not collect the entrance payment
    #[error("Entrance payment could not be collected")]
    PaymentFailed,

    /// Upkeep triggered while the upkeep predicate is false
    #[error("Upkeep not needed")]
    UpkeepNotNeeded,

    /// The coordinator refused the randomness request
    #[error("Randomness request failed")]
    RandomnessRequestFailed,

    /// Callback delivered by someone other than the coordinator
    #[error("Only the VRF coordinator can fulfill randomness")]
    OnlyCoordinatorCanFulfill,

    /// Callback with a wrong, stale or absent request id
    #[error("Unrecognized randomness request")]
    UnrecognizedRequest,

    /// Callback carried no random words
    #[error("Invalid random words")]
    InvalidRandomWords,

    /// Winner selection over an empty player list
    #[error("No players in the current round")]
    NoPlayers,

    /// Prize transfer to the winner failed
    #[error("Payout to winner failed")]
    PayoutFailed,

    /// Player query past the end of the list
    #[error("Player index out of range")]
    IndexOutOfRange,

    /// Math overflow
    #[error("Math overflow")]
    MathOverflow,

    /// Persisted lottery data is corrupt or inconsistent
    #[error("Invalid lottery snapshot")]
    InvalidSnapshot,

    /// The lottery service task is no longer running
    #[error("Lottery service stopped")]
    ServiceStopped,
}

impl From<LotteryError> for ProgramError {
    fn from(e: LotteryError) -> Self {
        ProgramError::Custom(e as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            ProgramError::from(LotteryError::InsufficientFee),
            ProgramError::Custom(2)
        );
        assert_eq!(
            ProgramError::from(LotteryError::RoundNotOpen),
            ProgramError::Custom(3)
        );
        assert_eq!(
            ProgramError::from(LotteryError::PayoutFailed),
            ProgramError::Custom(11)
        );
    }
}
