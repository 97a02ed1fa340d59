// Local VRF coordinator for development clusters and tests
use solana_program::{keccak, msg, pubkey::Pubkey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    error::LotteryError,
    events::Receipt,
    service::LotteryHandle,
    vrf::{CoordinatorError, RandomnessRequest, RequestId, VrfCoordinator},
};

/// Flat fee per fulfilled request: 0.25 LINK in juels
pub const BASE_FEE: u128 = 250_000_000_000_000_000;
/// Juels charged per unit of callback gas
pub const GAS_PRICE_LINK: u128 = 1_000_000_000;
/// Default subscription funding: 1000 LINK in juels
pub const FUND_AMOUNT: u128 = 1_000_000_000_000_000_000_000;

const MAX_NUM_WORDS: u32 = 500;

#[derive(Debug)]
struct PendingRequest {
    subscription_id: u64,
    callback_gas_limit: u32,
    num_words: u32,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    next_subscription_id: u64,
    next_request_id: RequestId,
    subscriptions: HashMap<u64, u128>,
    requests: HashMap<RequestId, PendingRequest>,
}

/// Subscription-funded coordinator that answers requests on demand.
///
/// Clones share state: the lottery keeps one to issue requests, the test or
/// local oracle keeps another to fulfill them.
#[derive(Clone, Debug)]
pub struct MockVrfCoordinator {
    authority: Pubkey,
    base_fee: u128,
    gas_price_link: u128,
    state: Arc<Mutex<CoordinatorState>>,
}

impl Default for MockVrfCoordinator {
    fn default() -> Self {
        Self::new(BASE_FEE, GAS_PRICE_LINK)
    }
}

impl MockVrfCoordinator {
    pub fn new(base_fee: u128, gas_price_link: u128) -> Self {
        Self {
            authority: Pubkey::new_unique(),
            base_fee,
            gas_price_link,
            state: Arc::new(Mutex::new(CoordinatorState::default())),
        }
    }

    /// Identity the coordinator signs callbacks with
    pub fn authority(&self) -> Pubkey {
        self.authority
    }

    fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_subscription(&self) -> u64 {
        let mut state = self.state();
        state.next_subscription_id += 1;
        let subscription_id = state.next_subscription_id;
        state.subscriptions.insert(subscription_id, 0);
        msg!("Subscription {} created", subscription_id);
        subscription_id
    }

    pub fn fund_subscription(&self, subscription_id: u64, amount: u128) -> Result<(), CoordinatorError> {
        let mut state = self.state();
        let balance = state
            .subscriptions
            .get_mut(&subscription_id)
            .ok_or(CoordinatorError::InvalidSubscription)?;
        *balance = balance.saturating_add(amount);
        msg!("Subscription {} funded, balance {}", subscription_id, balance);
        Ok(())
    }

    pub fn subscription_balance(&self, subscription_id: u64) -> Result<u128, CoordinatorError> {
        self.state()
            .subscriptions
            .get(&subscription_id)
            .copied()
            .ok_or(CoordinatorError::InvalidSubscription)
    }

    /// Ids of requests not fulfilled yet, oldest first
    pub fn pending_requests(&self) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> = self.state().requests.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Answer `request_id` with words derived from the id
    pub fn fulfill_random_words(&self, request_id: RequestId) -> Result<Vec<u64>, CoordinatorError> {
        let num_words = self
            .state()
            .requests
            .get(&request_id)
            .map(|request| request.num_words)
            .ok_or(CoordinatorError::NonexistentRequest)?;
        let words = (0..num_words as u64)
            .map(|index| {
                let hash = keccak::hashv(&[&request_id.to_le_bytes(), &index.to_le_bytes()]);
                let mut word = [0u8; 8];
                word.copy_from_slice(&hash.to_bytes()[..8]);
                u64::from_le_bytes(word)
            })
            .collect();
        self.fulfill_random_words_with_override(request_id, words)
    }

    /// Answer `request_id` with caller-chosen words
    pub fn fulfill_random_words_with_override(
        &self,
        request_id: RequestId,
        words: Vec<u64>,
    ) -> Result<Vec<u64>, CoordinatorError> {
        let mut state = self.state();
        let request = state
            .requests
            .get(&request_id)
            .ok_or(CoordinatorError::NonexistentRequest)?;
        if words.len() != request.num_words as usize {
            return Err(CoordinatorError::InvalidNumWords);
        }

        let payment = self
            .gas_price_link
            .checked_mul(request.callback_gas_limit as u128)
            .and_then(|gas| gas.checked_add(self.base_fee))
            .ok_or(CoordinatorError::InsufficientBalance)?;
        let subscription_id = request.subscription_id;
        let balance = state
            .subscriptions
            .get_mut(&subscription_id)
            .ok_or(CoordinatorError::InvalidSubscription)?;
        if *balance < payment {
            msg!("Subscription {} cannot pay {} juels", subscription_id, payment);
            return Err(CoordinatorError::InsufficientBalance);
        }
        *balance -= payment;
        state.requests.remove(&request_id);

        msg!("Request {} fulfilled, charged {} juels", request_id, payment);
        Ok(words)
    }

    /// Fulfill every pending request and deliver it to `lottery`
    pub async fn deliver_pending(&self, lottery: &LotteryHandle) -> Vec<Result<Receipt, LotteryError>> {
        let mut results = Vec::new();
        for request_id in self.pending_requests() {
            let words = match self.fulfill_random_words(request_id) {
                Ok(words) => words,
                Err(e) => {
                    msg!("Request {} left pending: {}", request_id, e);
                    continue;
                }
            };
            results.push(
                lottery
                    .fulfill_random_words(&self.authority, request_id, words)
                    .await,
            );
        }
        results
    }
}

impl VrfCoordinator for MockVrfCoordinator {
    fn request_random_words(
        &mut self,
        request: &RandomnessRequest,
    ) -> Result<RequestId, CoordinatorError> {
        if request.num_words == 0 || request.num_words > MAX_NUM_WORDS {
            return Err(CoordinatorError::InvalidNumWords);
        }

        let mut state = self.state();
        if !state.subscriptions.contains_key(&request.subscription_id) {
            return Err(CoordinatorError::InvalidSubscription);
        }

        state.next_request_id += 1;
        let request_id = state.next_request_id;
        state.requests.insert(
            request_id,
            PendingRequest {
                subscription_id: request.subscription_id,
                callback_gas_limit: request.callback_gas_limit,
                num_words: request.num_words,
            },
        );
        msg!(
            "Random words requested: id={}, subscription={}, confirmations={}",
            request_id,
            request.subscription_id,
            request.request_confirmations
        );
        Ok(request_id)
    }
}
