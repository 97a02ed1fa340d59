// VRF coordinator integration for the Solotto lottery
use thiserror::Error;

use crate::state::RoundConfig;

/// Correlation id pairing a randomness request with its callback
pub type RequestId = u64;

/// Arguments of an outbound randomness request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomnessRequest {
    /// Key hash (gas lane) selecting the proving key
    pub key_hash: [u8; 32],
    /// Subscription charged for the request
    pub subscription_id: u64,
    /// Confirmations to wait before answering
    pub request_confirmations: u16,
    /// Upper bound on the callback cost
    pub callback_gas_limit: u32,
    /// Number of words to deliver
    pub num_words: u32,
}

impl From<&RoundConfig> for RandomnessRequest {
    fn from(config: &RoundConfig) -> Self {
        Self {
            key_hash: config.key_hash,
            subscription_id: config.subscription_id,
            request_confirmations: config.request_confirmations,
            callback_gas_limit: config.callback_gas_limit,
            num_words: config.num_words,
        }
    }
}

/// Errors a coordinator may answer a request with
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Invalid subscription")]
    InvalidSubscription,

    #[error("Subscription balance too low")]
    InsufficientBalance,

    #[error("Unknown request id")]
    NonexistentRequest,

    #[error("Invalid number of words")]
    InvalidNumWords,
}

/// Outbound half of the randomness protocol.
///
/// The coordinator answers later by calling back into the lottery with the
/// returned id and the random words.
pub trait VrfCoordinator {
    fn request_random_words(
        &mut self,
        request: &RandomnessRequest,
    ) -> Result<RequestId, CoordinatorError>;
}

// Get a random winner index from a VRF word
pub fn get_random_winner_index(random_word: u64, total_players: usize) -> Option<usize> {
    if total_players == 0 {
        return None;
    }
    Some((random_word % total_players as u64) as usize)
}
