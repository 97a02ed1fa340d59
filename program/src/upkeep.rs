// Solotto - Upkeep evaluation
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::clock::UnixTimestamp;

use crate::state::{Lottery, LotteryState};

/// The four conditions behind an upkeep decision.
///
/// Returned to keepers in encoded form as the diagnostic payload of
/// [`check_upkeep`].
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpkeepStatus {
    pub is_open: bool,
    pub time_passed: bool,
    pub has_players: bool,
    pub has_balance: bool,
}

impl UpkeepStatus {
    pub fn evaluate(lottery: &Lottery, now: UnixTimestamp) -> Self {
        Self {
            is_open: lottery.lottery_state() == LotteryState::Open,
            time_passed: now.saturating_sub(lottery.last_timestamp()) >= lottery.interval(),
            has_players: lottery.num_players() > 0,
            has_balance: lottery.pooled_balance() > 0,
        }
    }

    pub fn upkeep_needed(&self) -> bool {
        self.is_open && self.time_passed && self.has_players && self.has_balance
    }
}

/// Should a randomness request be started at `now`?
///
/// Side-effect free; safe for any caller at any frequency.
pub fn check_upkeep(lottery: &Lottery, now: UnixTimestamp) -> (bool, Vec<u8>) {
    let status = UpkeepStatus::evaluate(lottery, now);
    (status.upkeep_needed(), status.try_to_vec().unwrap_or_default())
}
