// Solotto - Round Ledger
use arrayref::{array_mut_ref, array_ref, array_refs, mut_array_refs};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    clock::UnixTimestamp,
    msg,
    program_error::ProgramError,
    program_pack::{IsInitialized, Pack, Sealed},
    pubkey::Pubkey,
};

use crate::{error::LotteryError, vrf::RequestId};

/// Block confirmations the coordinator waits for before answering
pub const REQUEST_CONFIRMATIONS: u16 = 3;
/// Random words requested per round
pub const NUM_WORDS: u32 = 1;

/// State of the lottery
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LotteryState {
    /// Accepting entries
    Open,
    /// Entries closed, waiting for the randomness callback
    Calculating,
}

impl From<LotteryState> for u8 {
    fn from(state: LotteryState) -> Self {
        match state {
            LotteryState::Open => 0,
            LotteryState::Calculating => 1,
        }
    }
}

/// Immutable round configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundConfig {
    /// Is the config initialized
    pub is_initialized: bool,
    /// Entrance fee in lamports
    pub entrance_fee: u64,
    /// Minimum seconds between two rounds
    pub interval: i64,
    /// Key hash (gas lane) of the randomness source
    pub key_hash: [u8; 32],
    /// Coordinator subscription paying for requests
    pub subscription_id: u64,
    /// Confirmations the coordinator waits for
    pub request_confirmations: u16,
    /// Upper bound on the callback cost
    pub callback_gas_limit: u32,
    /// Number of random words per request
    pub num_words: u32,
    /// The only key allowed to deliver randomness callbacks
    pub coordinator: Pubkey,
}

impl RoundConfig {
    pub fn new(
        entrance_fee: u64,
        interval: i64,
        key_hash: [u8; 32],
        subscription_id: u64,
        callback_gas_limit: u32,
        coordinator: Pubkey,
    ) -> Result<Self, LotteryError> {
        let config = Self {
            is_initialized: true,
            entrance_fee,
            interval,
            key_hash,
            subscription_id,
            request_confirmations: REQUEST_CONFIRMATIONS,
            callback_gas_limit,
            num_words: NUM_WORDS,
            coordinator,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the creation invariants
    pub fn validate(&self) -> Result<(), LotteryError> {
        if self.entrance_fee == 0 {
            msg!("Entrance fee must be greater than zero");
            return Err(LotteryError::InvalidConfig);
        }
        if self.interval <= 0 {
            msg!("Interval must be greater than zero");
            return Err(LotteryError::InvalidConfig);
        }
        if self.num_words == 0 {
            msg!("At least one random word must be requested");
            return Err(LotteryError::InvalidConfig);
        }
        Ok(())
    }
}

impl Sealed for RoundConfig {}

impl IsInitialized for RoundConfig {
    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

impl Pack for RoundConfig {
    const LEN: usize = 1 + 8 + 8 + 32 + 8 + 2 + 4 + 4 + 32;

    fn unpack_from_slice(src: &[u8]) -> Result<Self, ProgramError> {
        let src = array_ref![src, 0, RoundConfig::LEN];
        let (
            is_initialized,
            entrance_fee,
            interval,
            key_hash,
            subscription_id,
            request_confirmations,
            callback_gas_limit,
            num_words,
            coordinator,
        ) = array_refs![src, 1, 8, 8, 32, 8, 2, 4, 4, 32];

        let is_initialized = match is_initialized[0] {
            0 => false,
            1 => true,
            _ => return Err(ProgramError::InvalidAccountData),
        };

        Ok(RoundConfig {
            is_initialized,
            entrance_fee: u64::from_le_bytes(*entrance_fee),
            interval: i64::from_le_bytes(*interval),
            key_hash: *key_hash,
            subscription_id: u64::from_le_bytes(*subscription_id),
            request_confirmations: u16::from_le_bytes(*request_confirmations),
            callback_gas_limit: u32::from_le_bytes(*callback_gas_limit),
            num_words: u32::from_le_bytes(*num_words),
            coordinator: Pubkey::new_from_array(*coordinator),
        })
    }

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let dst = array_mut_ref![dst, 0, RoundConfig::LEN];
        let (
            is_initialized_dst,
            entrance_fee_dst,
            interval_dst,
            key_hash_dst,
            subscription_id_dst,
            request_confirmations_dst,
            callback_gas_limit_dst,
            num_words_dst,
            coordinator_dst,
        ) = mut_array_refs![dst, 1, 8, 8, 32, 8, 2, 4, 4, 32];

        is_initialized_dst[0] = self.is_initialized as u8;
        *entrance_fee_dst = self.entrance_fee.to_le_bytes();
        *interval_dst = self.interval.to_le_bytes();
        key_hash_dst.copy_from_slice(&self.key_hash);
        *subscription_id_dst = self.subscription_id.to_le_bytes();
        *request_confirmations_dst = self.request_confirmations.to_le_bytes();
        *callback_gas_limit_dst = self.callback_gas_limit.to_le_bytes();
        *num_words_dst = self.num_words.to_le_bytes();
        coordinator_dst.copy_from_slice(self.coordinator.as_ref());
    }
}

/// Mutable per-round data
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct RoundLedger {
    /// Current state
    pub state: LotteryState,
    /// Entrants in insertion order
    pub players: Vec<Pubkey>,
    /// Lamports collected this round
    pub pooled_balance: u64,
    /// Last round completion (or creation)
    pub last_timestamp: UnixTimestamp,
    /// In-flight randomness request, set only while calculating
    pub pending_request_id: Option<RequestId>,
    /// Last winner picked
    pub recent_winner: Option<Pubkey>,
    /// Prizes whose payout failed
    pub stranded_balance: u64,
    /// Completed rounds
    pub rounds_completed: u64,
}

/// The single lottery instance: configuration plus the current round.
///
/// Reads are public; every mutation goes through the processor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lottery {
    config: RoundConfig,
    ledger: RoundLedger,
}

impl Lottery {
    pub fn new(config: RoundConfig, now: UnixTimestamp) -> Self {
        Self {
            config,
            ledger: RoundLedger {
                state: LotteryState::Open,
                players: Vec::new(),
                pooled_balance: 0,
                last_timestamp: now,
                pending_request_id: None,
                recent_winner: None,
                stranded_balance: 0,
                rounds_completed: 0,
            },
        }
    }

    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    pub fn ledger(&self) -> &RoundLedger {
        &self.ledger
    }

    pub fn entrance_fee(&self) -> u64 {
        self.config.entrance_fee
    }

    pub fn interval(&self) -> i64 {
        self.config.interval
    }

    pub fn num_words(&self) -> u32 {
        self.config.num_words
    }

    pub fn request_confirmations(&self) -> u16 {
        self.config.request_confirmations
    }

    pub fn num_players(&self) -> usize {
        self.ledger.players.len()
    }

    pub fn players(&self) -> &[Pubkey] {
        &self.ledger.players
    }

    pub fn player(&self, index: usize) -> Result<Pubkey, LotteryError> {
        self.ledger
            .players
            .get(index)
            .copied()
            .ok_or(LotteryError::IndexOutOfRange)
    }

    pub fn lottery_state(&self) -> LotteryState {
        self.ledger.state
    }

    pub fn last_timestamp(&self) -> UnixTimestamp {
        self.ledger.last_timestamp
    }

    pub fn recent_winner(&self) -> Option<Pubkey> {
        self.ledger.recent_winner
    }

    pub fn pooled_balance(&self) -> u64 {
        self.ledger.pooled_balance
    }

    pub fn pending_request_id(&self) -> Option<RequestId> {
        self.ledger.pending_request_id
    }

    pub fn stranded_balance(&self) -> u64 {
        self.ledger.stranded_balance
    }

    pub fn rounds_completed(&self) -> u64 {
        self.ledger.rounds_completed
    }

    pub(crate) fn add_player(&mut self, player: Pubkey, amount: u64) -> Result<(), LotteryError> {
        let pooled_balance = self
            .ledger
            .pooled_balance
            .checked_add(amount)
            .ok_or(LotteryError::MathOverflow)?;
        self.ledger.players.push(player);
        self.ledger.pooled_balance = pooled_balance;
        Ok(())
    }

    pub(crate) fn begin_calculating(&mut self, request_id: RequestId) {
        self.ledger.state = LotteryState::Calculating;
        self.ledger.pending_request_id = Some(request_id);
    }

    /// Reset the round around `winner` and hand back the prize.
    pub(crate) fn close_round(&mut self, winner: Pubkey, now: UnixTimestamp) -> u64 {
        self.ledger.recent_winner = Some(winner);
        self.ledger.players.clear();
        self.ledger.last_timestamp = now;
        self.ledger.state = LotteryState::Open;
        self.ledger.pending_request_id = None;
        self.ledger.rounds_completed = self.ledger.rounds_completed.saturating_add(1);
        std::mem::take(&mut self.ledger.pooled_balance)
    }

    /// Record a prize that could not be paid out. Saturates at `u64::MAX`.
    pub(crate) fn strand(&mut self, amount: u64) {
        self.ledger.stranded_balance = self.ledger.stranded_balance.saturating_add(amount);
    }

    /// Check the ledger invariants that must hold between calls.
    pub fn validate(&self) -> Result<(), LotteryError> {
        let ledger = &self.ledger;
        let calculating = ledger.state == LotteryState::Calculating;
        if calculating != ledger.pending_request_id.is_some() {
            msg!("State and pending request disagree");
            return Err(LotteryError::InvalidSnapshot);
        }
        if calculating && ledger.players.is_empty() {
            msg!("Calculating without players");
            return Err(LotteryError::InvalidSnapshot);
        }
        if ledger.players.is_empty() && ledger.pooled_balance != 0 {
            msg!("Pooled balance {} without players", ledger.pooled_balance);
            return Err(LotteryError::InvalidSnapshot);
        }
        let minimum = (ledger.players.len() as u64)
            .checked_mul(self.config.entrance_fee)
            .ok_or(LotteryError::InvalidSnapshot)?;
        if ledger.pooled_balance < minimum {
            msg!(
                "Pooled balance {} below {} players x {} fee",
                ledger.pooled_balance,
                ledger.players.len(),
                self.config.entrance_fee
            );
            return Err(LotteryError::InvalidSnapshot);
        }
        Ok(())
    }

    /// Serialize the lottery: packed config followed by the borsh ledger.
    pub fn snapshot(&self) -> Result<Vec<u8>, LotteryError> {
        let mut data = vec![0u8; RoundConfig::LEN];
        RoundConfig::pack(self.config, &mut data).map_err(|_| LotteryError::InvalidSnapshot)?;
        self.ledger
            .serialize(&mut data)
            .map_err(|_| LotteryError::InvalidSnapshot)?;
        Ok(data)
    }

    pub fn restore(data: &[u8]) -> Result<Self, LotteryError> {
        if data.len() < RoundConfig::LEN {
            msg!("Snapshot too short: {} bytes", data.len());
            return Err(LotteryError::InvalidSnapshot);
        }
        let (config_data, ledger_data) = data.split_at(RoundConfig::LEN);
        let config = RoundConfig::unpack(config_data).map_err(|_| LotteryError::InvalidSnapshot)?;
        config.validate().map_err(|_| LotteryError::InvalidSnapshot)?;
        let ledger =
            RoundLedger::try_from_slice(ledger_data).map_err(|_| LotteryError::InvalidSnapshot)?;

        let lottery = Self { config, ledger };
        lottery.validate()?;
        Ok(lottery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RoundConfig {
        RoundConfig::new(100, 30, [7u8; 32], 1, 500_000, Pubkey::new_unique()).unwrap()
    }

    #[test]
    fn rejects_zero_fee_and_interval() {
        let coordinator = Pubkey::new_unique();
        assert_eq!(
            RoundConfig::new(0, 30, [0u8; 32], 1, 500_000, coordinator),
            Err(LotteryError::InvalidConfig)
        );
        assert_eq!(
            RoundConfig::new(100, 0, [0u8; 32], 1, 500_000, coordinator),
            Err(LotteryError::InvalidConfig)
        );
    }

    #[test]
    fn config_pack_layout() {
        let config = config();
        let mut data = vec![0u8; RoundConfig::LEN];
        RoundConfig::pack(config, &mut data).unwrap();
        assert_eq!(RoundConfig::LEN, 99);
        assert_eq!(&data[1..9], &100u64.to_le_bytes());
        assert_eq!(RoundConfig::unpack(&data).unwrap(), config);
    }

    #[test]
    fn player_query_out_of_range() {
        let mut lottery = Lottery::new(config(), 1_000);
        assert_eq!(lottery.player(0), Err(LotteryError::IndexOutOfRange));

        let player = Pubkey::new_unique();
        lottery.add_player(player, 100).unwrap();
        assert_eq!(lottery.player(0), Ok(player));
        assert_eq!(lottery.player(1), Err(LotteryError::IndexOutOfRange));
    }

    #[test]
    fn close_round_resets_and_returns_prize() {
        let mut lottery = Lottery::new(config(), 1_000);
        let winner = Pubkey::new_unique();
        lottery.add_player(winner, 100).unwrap();
        lottery.add_player(Pubkey::new_unique(), 100).unwrap();
        lottery.begin_calculating(9);
        lottery.validate().unwrap();

        let prize = lottery.close_round(winner, 2_000);
        assert_eq!(prize, 200);
        assert_eq!(lottery.pooled_balance(), 0);
        assert_eq!(lottery.num_players(), 0);
        assert_eq!(lottery.lottery_state(), LotteryState::Open);
        assert_eq!(lottery.pending_request_id(), None);
        assert_eq!(lottery.recent_winner(), Some(winner));
        assert_eq!(lottery.last_timestamp(), 2_000);
        lottery.validate().unwrap();
    }

    #[test]
    fn snapshot_restores_calculating_round() {
        let mut lottery = Lottery::new(config(), 1_000);
        lottery.add_player(Pubkey::new_unique(), 100).unwrap();
        lottery.begin_calculating(42);

        let data = lottery.snapshot().unwrap();
        let restored = Lottery::restore(&data).unwrap();
        assert_eq!(restored, lottery);
        assert_eq!(restored.pending_request_id(), Some(42));
    }

    #[test]
    fn restore_rejects_inconsistent_ledger() {
        let mut lottery = Lottery::new(config(), 1_000);
        lottery.add_player(Pubkey::new_unique(), 100).unwrap();
        lottery.ledger.state = LotteryState::Calculating;

        let data = lottery.snapshot().unwrap();
        assert_eq!(Lottery::restore(&data), Err(LotteryError::InvalidSnapshot));
        assert_eq!(Lottery::restore(&data[..10]), Err(LotteryError::InvalidSnapshot));

        // an emptied round must not carry lamports over
        let mut orphaned = Lottery::new(config(), 1_000);
        orphaned.ledger.pooled_balance = 500;
        let data = orphaned.snapshot().unwrap();
        assert_eq!(Lottery::restore(&data), Err(LotteryError::InvalidSnapshot));
    }

    #[test]
    fn stranded_balance_saturates() {
        let mut lottery = Lottery::new(config(), 1_000);
        lottery.strand(u64::MAX - 1);
        lottery.strand(10);
        assert_eq!(lottery.stranded_balance(), u64::MAX);
    }
}
