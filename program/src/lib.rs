// Solotto
// A self-operating lottery: entries pool fees, a keeper closes the round
// after the interval and verifiable randomness picks the winner

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod instruction;
pub mod keeper;
pub mod processor;
pub mod service;
pub mod state;
pub mod treasury;
pub mod upkeep;
pub mod utils;

// Randomness
pub mod vrf;
pub mod vrf_mock;

pub use error::LotteryError;
pub use events::{LotteryEvent, Receipt};
pub use processor::Processor;
pub use service::{LotteryHandle, LotteryService};
pub use state::{Lottery, LotteryState, RoundConfig};
