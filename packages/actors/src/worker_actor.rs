//! Worker actor that hosts the chunked job driver.

use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::driver::ChunkedJobDriver;
use crate::messages::{QueueMessage, WorkerMessage};

/// State for the worker actor.
pub struct WorkerActorState {
    /// Queue actor that receives progress and outcomes.
    pub queue: ActorRef<QueueMessage>,
    /// Driver executing the step protocol.
    pub driver: ChunkedJobDriver,
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub queue: ActorRef<QueueMessage>,
    pub driver: ChunkedJobDriver,
}

/// Worker actor that runs one item at a time.
///
/// While an item is processing the worker does not read its mailbox, so the
/// queue actor never has more than one item in flight.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!("Starting translation worker");
        Ok(WorkerActorState {
            queue: args.queue,
            driver: args.driver,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Process {
                run_id,
                item,
                cancel,
            } => {
                let item = *item;
                let key = item.key();
                let queue = state.queue.clone();

                let outcome = state
                    .driver
                    .run(&item, &cancel, |progress| {
                        let _ = queue.send_message(QueueMessage::StepStarted {
                            run_id,
                            key: key.clone(),
                            progress: progress.clone(),
                        });
                    })
                    .await;

                if state
                    .queue
                    .send_message(QueueMessage::ItemFinished {
                        run_id,
                        key,
                        outcome,
                    })
                    .is_err()
                {
                    tracing::warn!("Queue actor is gone, stopping worker");
                    myself.stop(None);
                }
            }
        }

        Ok(())
    }
}
