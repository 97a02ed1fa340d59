// Solotto - Upkeep automation
use solana_program::{msg, pubkey::Pubkey};
use std::time::Duration;
use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};

use crate::{error::LotteryError, service::LotteryHandle, vrf::RequestId};

/// Polls `check_upkeep` and triggers `perform_upkeep` when it says so.
pub struct Keeper {
    handle: LotteryHandle,
    caller: Pubkey,
    period: Duration,
}

impl Keeper {
    pub fn new(handle: LotteryHandle, caller: Pubkey, period: Duration) -> Self {
        Self {
            handle,
            caller,
            period,
        }
    }

    /// One evaluation. Returns the request id when a round was closed.
    pub async fn poll(&self) -> Result<Option<RequestId>, LotteryError> {
        let (upkeep_needed, perform_data) = self.handle.check_upkeep().await?;
        if !upkeep_needed {
            return Ok(None);
        }

        let receipt = self.handle.perform_upkeep(&self.caller, perform_data).await?;
        Ok(receipt.request_id())
    }

    /// Poll every period until `shutdown` turns true or the service stops.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.poll().await {
                    Ok(Some(request_id)) => msg!("Keeper closed the round, request id {}", request_id),
                    Ok(None) => {}
                    Err(LotteryError::ServiceStopped) => break,
                    // lost a race with another keeper
                    Err(LotteryError::UpkeepNotNeeded) => {}
                    Err(e) => msg!("Keeper upkeep failed: {}", e),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        msg!("Keeper stopped");
    }
}
