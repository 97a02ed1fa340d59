// Solotto - Events
use solana_program::pubkey::Pubkey;

use crate::vrf::RequestId;

/// Notifications emitted by the state machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LotteryEvent {
    /// A player joined the current round
    LotteryEnter { player: Pubkey, amount: u64 },
    /// Entries closed and randomness was requested
    RequestedLotteryWinner { request_id: RequestId },
    /// Winner selected and paid
    WinnerPicked { winner: Pubkey, prize: u64 },
    /// Winner selected but the prize could not be sent
    PayoutFailed { winner: Pubkey, amount: u64 },
}

/// Events emitted by a single successful call, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Receipt {
    pub events: Vec<LotteryEvent>,
}

impl Receipt {
    /// Request id announced by an upkeep, if any
    pub fn request_id(&self) -> Option<RequestId> {
        self.events.iter().find_map(|event| match event {
            LotteryEvent::RequestedLotteryWinner { request_id } => Some(*request_id),
            _ => None,
        })
    }

    /// Winner paid by a callback, if any
    pub fn winner(&self) -> Option<Pubkey> {
        self.events.iter().find_map(|event| match event {
            LotteryEvent::WinnerPicked { winner, .. } => Some(*winner),
            _ => None,
        })
    }
}
