// Solotto - Round state machine
use solana_program::{msg, pubkey::Pubkey};

use crate::{
    clock::ClockSource,
    error::LotteryError,
    events::{LotteryEvent, Receipt},
    instruction::LotteryInstruction,
    state::{Lottery, LotteryState, RoundConfig},
    treasury::Treasury,
    upkeep::{self, UpkeepStatus},
    utils::lamports_to_sol,
    vrf::{self, RandomnessRequest, RequestId, VrfCoordinator},
};

/// Owner of the lottery and the only code path that mutates it.
///
/// Every call runs to completion before returning; callers that share a
/// processor between tasks must serialize access (see `service`).
pub struct Processor<V, T, C> {
    lottery: Lottery,
    coordinator: V,
    treasury: T,
    clock: C,
    event_log: Vec<LotteryEvent>,
}

impl<V, T, C> Processor<V, T, C>
where
    V: VrfCoordinator,
    T: Treasury,
    C: ClockSource,
{
    /// Open the first round at the current time
    pub fn new(config: RoundConfig, coordinator: V, treasury: T, clock: C) -> Self {
        let now = clock.unix_timestamp();
        msg!(
            "Lottery initialized: entrance fee={} SOL, interval={}s",
            lamports_to_sol(config.entrance_fee),
            config.interval
        );
        Self::from_lottery(Lottery::new(config, now), coordinator, treasury, clock)
    }

    /// Resume a lottery restored from a snapshot
    pub fn from_lottery(lottery: Lottery, coordinator: V, treasury: T, clock: C) -> Self {
        Self {
            lottery,
            coordinator,
            treasury,
            clock,
            event_log: Vec::new(),
        }
    }

    pub fn lottery(&self) -> &Lottery {
        &self.lottery
    }

    /// Events emitted by the most recent mutating call, including a failed
    /// one. Each mutating call starts a fresh log.
    pub fn take_event_log(&mut self) -> Vec<LotteryEvent> {
        std::mem::take(&mut self.event_log)
    }

    pub fn check_upkeep(&self) -> (bool, Vec<u8>) {
        upkeep::check_upkeep(&self.lottery, self.clock.unix_timestamp())
    }

    /// Decode and run one instruction on behalf of `caller`
    pub fn process(&mut self, caller: &Pubkey, instruction_data: &[u8]) -> Result<Receipt, LotteryError> {
        let instruction = LotteryInstruction::unpack(instruction_data)?;

        match instruction {
            LotteryInstruction::EnterLottery { amount } => {
                msg!("Instruction: Enter Lottery");
                self.enter_lottery(caller, amount)
            }
            LotteryInstruction::PerformUpkeep { perform_data } => {
                msg!("Instruction: Perform Upkeep");
                self.perform_upkeep(&perform_data)
            }
            LotteryInstruction::FulfillRandomWords {
                request_id,
                random_words,
            } => {
                msg!("Instruction: Fulfill Random Words");
                self.fulfill_random_words(caller, request_id, &random_words)
            }
        }
    }

    pub fn enter_lottery(&mut self, player: &Pubkey, amount: u64) -> Result<Receipt, LotteryError> {
        self.event_log.clear();
        if self.lottery.lottery_state() != LotteryState::Open {
            msg!("Lottery is not open");
            return Err(LotteryError::RoundNotOpen);
        }

        let entrance_fee = self.lottery.entrance_fee();
        if amount < entrance_fee {
            msg!("Entrance fee is {} lamports, got {} lamports", entrance_fee, amount);
            return Err(LotteryError::InsufficientFee);
        }

        self.lottery
            .pooled_balance()
            .checked_add(amount)
            .ok_or(LotteryError::MathOverflow)?;

        self.treasury.deposit(player, amount).map_err(|e| {
            msg!("Could not collect entrance payment from {}: {}", player, e);
            LotteryError::PaymentFailed
        })?;
        self.lottery.add_player(*player, amount)?;

        msg!(
            "Player {} entered with {} SOL, {} players in the round",
            player,
            lamports_to_sol(amount),
            self.lottery.num_players()
        );

        let mut receipt = Receipt::default();
        self.emit(&mut receipt, LotteryEvent::LotteryEnter {
            player: *player,
            amount,
        });
        Ok(receipt)
    }

    /// Close entries and request randomness.
    ///
    /// Anyone may call this; the upkeep predicate is evaluated here and the
    /// caller's data plays no part in the decision.
    pub fn perform_upkeep(&mut self, perform_data: &[u8]) -> Result<Receipt, LotteryError> {
        self.event_log.clear();
        let status = UpkeepStatus::evaluate(&self.lottery, self.clock.unix_timestamp());
        if !status.upkeep_needed() {
            msg!(
                "Upkeep not needed: balance={}, players={}, state={}",
                self.lottery.pooled_balance(),
                self.lottery.num_players(),
                u8::from(self.lottery.lottery_state())
            );
            return Err(LotteryError::UpkeepNotNeeded);
        }
        if !perform_data.is_empty() {
            msg!("Ignoring {} bytes of perform data", perform_data.len());
        }

        let request = RandomnessRequest::from(self.lottery.config());
        let request_id = self
            .coordinator
            .request_random_words(&request)
            .map_err(|e| {
                msg!("Randomness request rejected by coordinator: {}", e);
                LotteryError::RandomnessRequestFailed
            })?;

        self.lottery.begin_calculating(request_id);
        msg!(
            "Requested {} random words, request id {}",
            request.num_words,
            request_id
        );

        let mut receipt = Receipt::default();
        self.emit(&mut receipt, LotteryEvent::RequestedLotteryWinner { request_id });
        Ok(receipt)
    }

    /// Randomness callback: pick the winner, reset the round, then pay out.
    ///
    /// The round is reset before the transfer is attempted. A failed
    /// transfer leaves the reset in place and moves the prize to the
    /// stranded balance instead of retrying.
    pub fn fulfill_random_words(
        &mut self,
        caller: &Pubkey,
        request_id: RequestId,
        random_words: &[u64],
    ) -> Result<Receipt, LotteryError> {
        self.event_log.clear();
        if *caller != self.lottery.config().coordinator {
            msg!("Randomness delivered by {}, expected the coordinator", caller);
            return Err(LotteryError::OnlyCoordinatorCanFulfill);
        }

        if self.lottery.lottery_state() != LotteryState::Calculating
            || self.lottery.pending_request_id() != Some(request_id)
        {
            msg!(
                "Unrecognized request {}, pending: {:?}",
                request_id,
                self.lottery.pending_request_id()
            );
            return Err(LotteryError::UnrecognizedRequest);
        }

        let random_word = *random_words.first().ok_or_else(|| {
            msg!("Callback for request {} carried no random words", request_id);
            LotteryError::InvalidRandomWords
        })?;

        let winner_index = vrf::get_random_winner_index(random_word, self.lottery.num_players())
            .ok_or(LotteryError::NoPlayers)?;
        let winner = self.lottery.player(winner_index)?;
        msg!("Random winner index: {} of {}", winner_index, self.lottery.num_players());

        let prize = self.lottery.close_round(winner, self.clock.unix_timestamp());

        let mut receipt = Receipt::default();
        match self.treasury.transfer(&winner, prize) {
            Ok(()) => {
                msg!("Winner {} paid {} SOL", winner, lamports_to_sol(prize));
                self.emit(&mut receipt, LotteryEvent::WinnerPicked { winner, prize });
                Ok(receipt)
            }
            Err(e) => {
                msg!("Payout of {} lamports to {} failed: {}", prize, winner, e);
                self.lottery.strand(prize);
                self.emit(&mut receipt, LotteryEvent::PayoutFailed {
                    winner,
                    amount: prize,
                });
                Err(LotteryError::PayoutFailed)
            }
        }
    }

    fn emit(&mut self, receipt: &mut Receipt, event: LotteryEvent) {
        msg!("Event: {:?}", event);
        receipt.events.push(event.clone());
        self.event_log.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        treasury::LamportVault,
        vrf::CoordinatorError,
    };

    const FEE: u64 = 100;
    const INTERVAL: i64 = 30;
    const START: i64 = 1_000;

    /// Hands out sequential ids, or refuses every request.
    struct StubCoordinator {
        next_id: RequestId,
        requests: Vec<RandomnessRequest>,
        refuse: bool,
    }

    impl VrfCoordinator for StubCoordinator {
        fn request_random_words(
            &mut self,
            request: &RandomnessRequest,
        ) -> Result<RequestId, CoordinatorError> {
            if self.refuse {
                return Err(CoordinatorError::InsufficientBalance);
            }
            self.requests.push(*request);
            self.next_id += 1;
            Ok(self.next_id)
        }
    }

    struct Fixture {
        processor: Processor<StubCoordinator, LamportVault, ManualClock>,
        vault: LamportVault,
        clock: ManualClock,
        coordinator: Pubkey,
    }

    fn setup() -> Fixture {
        let coordinator = Pubkey::new_unique();
        let config = RoundConfig::new(FEE, INTERVAL, [1u8; 32], 7, 500_000, coordinator).unwrap();
        let vault = LamportVault::new();
        let clock = ManualClock::new(START);
        let stub = StubCoordinator {
            next_id: 0,
            requests: Vec::new(),
            refuse: false,
        };
        Fixture {
            processor: Processor::new(config, stub, vault.clone(), clock.clone()),
            vault,
            clock,
            coordinator,
        }
    }

    fn funded_player(fixture: &Fixture) -> Pubkey {
        let player = Pubkey::new_unique();
        fixture.vault.airdrop(&player, 10 * FEE);
        player
    }

    /// Enter `count` players, let the interval pass and start a request.
    fn calculating(fixture: &mut Fixture, count: usize) -> (Vec<Pubkey>, RequestId) {
        let players: Vec<Pubkey> = (0..count).map(|_| funded_player(fixture)).collect();
        for player in &players {
            fixture.processor.enter_lottery(player, FEE).unwrap();
        }
        fixture.clock.advance(INTERVAL + 1);
        let receipt = fixture.processor.perform_upkeep(&[]).unwrap();
        (players, receipt.request_id().unwrap())
    }

    #[test]
    fn initializes_open() {
        let fixture = setup();
        let lottery = fixture.processor.lottery();
        assert_eq!(lottery.lottery_state(), LotteryState::Open);
        assert_eq!(u8::from(lottery.lottery_state()), 0);
        assert_eq!(lottery.interval(), INTERVAL);
        assert_eq!(lottery.last_timestamp(), START);
        assert_eq!(lottery.recent_winner(), None);
    }

    #[test]
    fn entrance_fee_boundary() {
        let mut fixture = setup();
        let player = funded_player(&fixture);

        for amount in [0, 1, FEE - 1] {
            assert_eq!(
                fixture.processor.enter_lottery(&player, amount),
                Err(LotteryError::InsufficientFee)
            );
        }
        assert_eq!(fixture.processor.lottery().num_players(), 0);

        let receipt = fixture.processor.enter_lottery(&player, FEE).unwrap();
        assert_eq!(
            receipt.events,
            vec![LotteryEvent::LotteryEnter { player, amount: FEE }]
        );
        assert_eq!(fixture.processor.lottery().num_players(), 1);

        fixture.processor.enter_lottery(&player, FEE + 1).unwrap();
        assert_eq!(fixture.processor.lottery().num_players(), 2);
        assert_eq!(fixture.processor.lottery().player(1), Ok(player));
    }

    #[test]
    fn unfunded_entry_changes_nothing() {
        let mut fixture = setup();
        let broke = Pubkey::new_unique();
        assert_eq!(
            fixture.processor.enter_lottery(&broke, FEE),
            Err(LotteryError::PaymentFailed)
        );
        assert_eq!(fixture.processor.lottery().num_players(), 0);
        assert_eq!(fixture.processor.lottery().pooled_balance(), 0);
    }

    #[test]
    fn rejects_entry_while_calculating() {
        let mut fixture = setup();
        calculating(&mut fixture, 1);
        let late = funded_player(&fixture);

        for amount in [0, FEE, 5 * FEE] {
            assert_eq!(
                fixture.processor.enter_lottery(&late, amount),
                Err(LotteryError::RoundNotOpen)
            );
        }
        assert_eq!(fixture.vault.lamports(&late), 10 * FEE);
    }

    #[test]
    fn upkeep_not_needed_leaves_state() {
        let mut fixture = setup();
        let player = funded_player(&fixture);
        fixture.processor.enter_lottery(&player, FEE).unwrap();
        let before = fixture.processor.lottery().clone();

        // interval has not passed yet
        assert_eq!(
            fixture.processor.perform_upkeep(&[1, 2, 3]),
            Err(LotteryError::UpkeepNotNeeded)
        );
        assert_eq!(fixture.processor.lottery(), &before);
        assert!(fixture.processor.coordinator.requests.is_empty());
    }

    #[test]
    fn upkeep_requests_randomness() {
        let mut fixture = setup();
        let (players, request_id) = calculating(&mut fixture, 2);

        let lottery = fixture.processor.lottery();
        assert_eq!(lottery.lottery_state(), LotteryState::Calculating);
        assert_eq!(lottery.pending_request_id(), Some(request_id));
        assert_eq!(lottery.players(), players.as_slice());
        assert_eq!(lottery.pooled_balance(), 2 * FEE);

        let request = fixture.processor.coordinator.requests[0];
        assert_eq!(request.key_hash, [1u8; 32]);
        assert_eq!(request.subscription_id, 7);
        assert_eq!(request.request_confirmations, 3);
        assert_eq!(request.callback_gas_limit, 500_000);
        assert_eq!(request.num_words, 1);

        // a second trigger cannot open an overlapping request
        assert_eq!(
            fixture.processor.perform_upkeep(&[]),
            Err(LotteryError::UpkeepNotNeeded)
        );
        assert_eq!(fixture.processor.coordinator.requests.len(), 1);
    }

    #[test]
    fn failed_request_keeps_round_open() {
        let mut fixture = setup();
        let player = funded_player(&fixture);
        fixture.processor.enter_lottery(&player, FEE).unwrap();
        fixture.clock.advance(INTERVAL);
        fixture.processor.coordinator.refuse = true;

        assert_eq!(
            fixture.processor.perform_upkeep(&[]),
            Err(LotteryError::RandomnessRequestFailed)
        );
        assert_eq!(fixture.processor.lottery().lottery_state(), LotteryState::Open);
        assert_eq!(fixture.processor.lottery().pending_request_id(), None);
    }

    #[test]
    fn only_coordinator_can_fulfill() {
        let mut fixture = setup();
        let (_, request_id) = calculating(&mut fixture, 1);
        let stranger = Pubkey::new_unique();

        assert_eq!(
            fixture.processor.fulfill_random_words(&stranger, request_id, &[0]),
            Err(LotteryError::OnlyCoordinatorCanFulfill)
        );
        assert_eq!(
            fixture.processor.lottery().lottery_state(),
            LotteryState::Calculating
        );
    }

    #[test]
    fn wrong_request_id_is_rejected() {
        let mut fixture = setup();
        let (_, request_id) = calculating(&mut fixture, 3);
        let coordinator = fixture.coordinator;

        assert_eq!(
            fixture.processor.fulfill_random_words(&coordinator, request_id + 1, &[4]),
            Err(LotteryError::UnrecognizedRequest)
        );
        assert_eq!(
            fixture.processor.fulfill_random_words(&coordinator, request_id, &[]),
            Err(LotteryError::InvalidRandomWords)
        );
        let lottery = fixture.processor.lottery();
        assert_eq!(lottery.lottery_state(), LotteryState::Calculating);
        assert_eq!(lottery.pending_request_id(), Some(request_id));
        assert_eq!(lottery.num_players(), 3);
    }

    #[test]
    fn fulfill_before_upkeep_is_rejected() {
        let mut fixture = setup();
        let coordinator = fixture.coordinator;
        for request_id in [0, 1] {
            assert_eq!(
                fixture.processor.fulfill_random_words(&coordinator, request_id, &[1]),
                Err(LotteryError::UnrecognizedRequest)
            );
        }
    }

    #[test]
    fn picks_winner_resets_and_pays() {
        let mut fixture = setup();
        let (players, request_id) = calculating(&mut fixture, 3);
        let coordinator = fixture.coordinator;
        fixture.clock.advance(5);

        // 7 mod 3 == 1
        let receipt = fixture
            .processor
            .fulfill_random_words(&coordinator, request_id, &[7])
            .unwrap();
        let winner = players[1];
        assert_eq!(receipt.winner(), Some(winner));
        assert_eq!(
            receipt.events,
            vec![LotteryEvent::WinnerPicked {
                winner,
                prize: 3 * FEE
            }]
        );

        let lottery = fixture.processor.lottery();
        assert_eq!(lottery.recent_winner(), Some(winner));
        assert_eq!(lottery.num_players(), 0);
        assert_eq!(lottery.player(0), Err(LotteryError::IndexOutOfRange));
        assert_eq!(lottery.pooled_balance(), 0);
        assert_eq!(lottery.lottery_state(), LotteryState::Open);
        assert_eq!(lottery.pending_request_id(), None);
        assert_eq!(lottery.last_timestamp(), START + INTERVAL + 1 + 5);
        assert_eq!(lottery.rounds_completed(), 1);
        lottery.validate().unwrap();

        assert_eq!(fixture.vault.lamports(&winner), 9 * FEE + 3 * FEE);
        assert_eq!(fixture.vault.balance(), 0);

        // the same callback again is stale
        assert_eq!(
            fixture.processor.fulfill_random_words(&coordinator, request_id, &[7]),
            Err(LotteryError::UnrecognizedRequest)
        );
        assert_eq!(fixture.vault.lamports(&winner), 12 * FEE);
    }

    #[test]
    fn failed_payout_keeps_reset_and_strands_prize() {
        let mut fixture = setup();
        let (players, request_id) = calculating(&mut fixture, 2);
        let coordinator = fixture.coordinator;
        fixture.vault.reject_transfers_to(&players[0]);
        fixture.processor.take_event_log();

        assert_eq!(
            fixture.processor.fulfill_random_words(&coordinator, request_id, &[4]),
            Err(LotteryError::PayoutFailed)
        );

        let lottery = fixture.processor.lottery();
        assert_eq!(lottery.lottery_state(), LotteryState::Open);
        assert_eq!(lottery.pending_request_id(), None);
        assert_eq!(lottery.recent_winner(), Some(players[0]));
        assert_eq!(lottery.num_players(), 0);
        assert_eq!(lottery.pooled_balance(), 0);
        assert_eq!(lottery.stranded_balance(), 2 * FEE);
        assert_eq!(fixture.vault.balance(), 2 * FEE);
        assert_eq!(
            fixture.processor.take_event_log(),
            vec![LotteryEvent::PayoutFailed {
                winner: players[0],
                amount: 2 * FEE
            }]
        );

        // the callback is not honored twice
        assert_eq!(
            fixture.processor.fulfill_random_words(&coordinator, request_id, &[4]),
            Err(LotteryError::UnrecognizedRequest)
        );

        // a fresh round starts from an empty pool
        let player = funded_player(&fixture);
        fixture.processor.enter_lottery(&player, FEE).unwrap();
        assert_eq!(fixture.processor.lottery().pooled_balance(), FEE);
        assert_eq!(fixture.processor.lottery().stranded_balance(), 2 * FEE);
    }

    #[test]
    fn failed_payout_is_reported_when_stranded_balance_is_full() {
        let mut fixture = setup();
        let (players, request_id) = calculating(&mut fixture, 1);
        let coordinator = fixture.coordinator;
        fixture.vault.reject_transfers_to(&players[0]);
        fixture.processor.lottery.strand(u64::MAX);

        assert_eq!(
            fixture.processor.fulfill_random_words(&coordinator, request_id, &[0]),
            Err(LotteryError::PayoutFailed)
        );
        assert_eq!(fixture.processor.lottery().stranded_balance(), u64::MAX);
        assert_eq!(
            fixture.processor.take_event_log(),
            vec![LotteryEvent::PayoutFailed {
                winner: players[0],
                amount: FEE
            }]
        );
    }

    #[test]
    fn event_log_holds_only_the_last_call() {
        let mut fixture = setup();
        let first = funded_player(&fixture);
        let second = funded_player(&fixture);
        fixture.processor.enter_lottery(&first, FEE).unwrap();
        fixture.processor.enter_lottery(&second, FEE).unwrap();

        assert_eq!(
            fixture.processor.take_event_log(),
            vec![LotteryEvent::LotteryEnter {
                player: second,
                amount: FEE
            }]
        );
        assert!(fixture.processor.take_event_log().is_empty());
    }

    #[test]
    fn process_decodes_instructions() {
        let mut fixture = setup();
        let player = funded_player(&fixture);

        let data = LotteryInstruction::EnterLottery { amount: FEE }.pack();
        fixture.processor.process(&player, &data).unwrap();
        assert_eq!(fixture.processor.lottery().num_players(), 1);

        assert_eq!(
            fixture.processor.process(&player, &[42]),
            Err(LotteryError::InvalidInstruction)
        );

        fixture.clock.advance(INTERVAL);
        let data = LotteryInstruction::PerformUpkeep {
            perform_data: vec![0],
        }
        .pack();
        let request_id = fixture
            .processor
            .process(&player, &data)
            .unwrap()
            .request_id()
            .unwrap();

        let coordinator = fixture.coordinator;
        let data = LotteryInstruction::FulfillRandomWords {
            request_id,
            random_words: vec![123],
        }
        .pack();
        let receipt = fixture.processor.process(&coordinator, &data).unwrap();
        assert_eq!(receipt.winner(), Some(player));
    }
}
