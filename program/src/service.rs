// Solotto - Single-writer lottery service
use solana_program::{clock::UnixTimestamp, msg, pubkey::Pubkey};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::{
    clock::ClockSource,
    error::LotteryError,
    events::{LotteryEvent, Receipt},
    instruction::LotteryInstruction,
    processor::Processor,
    state::{Lottery, LotteryState},
    treasury::Treasury,
    vrf::{RequestId, VrfCoordinator},
};

const COMMAND_QUEUE_DEPTH: usize = 64;
const EVENT_CAPACITY: usize = 256;

enum Command {
    Submit {
        caller: Pubkey,
        instruction_data: Vec<u8>,
        reply: oneshot::Sender<Result<Receipt, LotteryError>>,
    },
    CheckUpkeep {
        reply: oneshot::Sender<(bool, Vec<u8>)>,
    },
    Snapshot {
        reply: oneshot::Sender<Lottery>,
    },
}

/// Spawns the task that owns a [`Processor`].
///
/// The task handles one command at a time, so instructions never interleave.
/// It stops once every [`LotteryHandle`] has been dropped.
pub struct LotteryService;

impl LotteryService {
    pub fn spawn<V, T, C>(processor: Processor<V, T, C>) -> LotteryHandle
    where
        V: VrfCoordinator + Send + 'static,
        T: Treasury + Send + 'static,
        C: ClockSource + Send + 'static,
    {
        let (commands, receiver) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        tokio::spawn(Self::run(processor, receiver, events.clone()));
        LotteryHandle { commands, events }
    }

    async fn run<V, T, C>(
        mut processor: Processor<V, T, C>,
        mut receiver: mpsc::Receiver<Command>,
        events: broadcast::Sender<LotteryEvent>,
    ) where
        V: VrfCoordinator,
        T: Treasury,
        C: ClockSource,
    {
        while let Some(command) = receiver.recv().await {
            match command {
                Command::Submit {
                    caller,
                    instruction_data,
                    reply,
                } => {
                    let result = processor.process(&caller, &instruction_data);
                    if let Err(e) = &result {
                        msg!("Instruction from {} failed: {}", caller, e);
                    }
                    for event in processor.take_event_log() {
                        // no subscribers is fine
                        let _ = events.send(event);
                    }
                    let _ = reply.send(result);
                }
                Command::CheckUpkeep { reply } => {
                    let _ = reply.send(processor.check_upkeep());
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(processor.lottery().clone());
                }
            }
        }
        msg!("Lottery service stopped");
    }
}

/// Cloneable client of a running [`LotteryService`]
#[derive(Clone)]
pub struct LotteryHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<LotteryEvent>,
}

impl LotteryHandle {
    /// Receive every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<LotteryEvent> {
        self.events.subscribe()
    }

    pub async fn submit(
        &self,
        caller: &Pubkey,
        instruction: &LotteryInstruction,
    ) -> Result<Receipt, LotteryError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Submit {
            caller: *caller,
            instruction_data: instruction.pack(),
            reply,
        })
        .await?;
        response.await.map_err(|_| LotteryError::ServiceStopped)?
    }

    pub async fn enter_lottery(&self, player: &Pubkey, amount: u64) -> Result<Receipt, LotteryError> {
        self.submit(player, &LotteryInstruction::EnterLottery { amount })
            .await
    }

    pub async fn perform_upkeep(
        &self,
        caller: &Pubkey,
        perform_data: Vec<u8>,
    ) -> Result<Receipt, LotteryError> {
        self.submit(caller, &LotteryInstruction::PerformUpkeep { perform_data })
            .await
    }

    pub async fn fulfill_random_words(
        &self,
        coordinator: &Pubkey,
        request_id: RequestId,
        random_words: Vec<u64>,
    ) -> Result<Receipt, LotteryError> {
        self.submit(
            coordinator,
            &LotteryInstruction::FulfillRandomWords {
                request_id,
                random_words,
            },
        )
        .await
    }

    pub async fn check_upkeep(&self) -> Result<(bool, Vec<u8>), LotteryError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::CheckUpkeep { reply }).await?;
        response.await.map_err(|_| LotteryError::ServiceStopped)
    }

    /// Consistent copy of the lottery between two instructions
    pub async fn lottery(&self) -> Result<Lottery, LotteryError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        response.await.map_err(|_| LotteryError::ServiceStopped)
    }

    pub async fn entrance_fee(&self) -> Result<u64, LotteryError> {
        Ok(self.lottery().await?.entrance_fee())
    }

    pub async fn interval(&self) -> Result<i64, LotteryError> {
        Ok(self.lottery().await?.interval())
    }

    pub async fn num_players(&self) -> Result<usize, LotteryError> {
        Ok(self.lottery().await?.num_players())
    }

    pub async fn player(&self, index: usize) -> Result<Pubkey, LotteryError> {
        self.lottery().await?.player(index)
    }

    pub async fn lottery_state(&self) -> Result<LotteryState, LotteryError> {
        Ok(self.lottery().await?.lottery_state())
    }

    pub async fn last_timestamp(&self) -> Result<UnixTimestamp, LotteryError> {
        Ok(self.lottery().await?.last_timestamp())
    }

    pub async fn recent_winner(&self) -> Result<Option<Pubkey>, LotteryError> {
        Ok(self.lottery().await?.recent_winner())
    }

    async fn send(&self, command: Command) -> Result<(), LotteryError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| LotteryError::ServiceStopped)
    }
}
