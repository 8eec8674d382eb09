use std::sync::Arc;
use std::time::Duration;

use ww_store::Datastore;
use ww_types::CombatantId;

use crate::cancel::Cancellation;
use crate::dispatch::{ShotDispatcher, ShotOutcome};
use crate::error::TargetError;
use crate::queue::{ShotQueue, ShotTrigger};
use crate::target::TargetSelector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Winner,
    /// The run context was cancelled, normally because this replica died.
    Cancelled,
}

/// The shooting loop: the only driver of outbound shots for a replica.
pub struct ShotScheduler<S, D> {
    id: CombatantId,
    damage: u64,
    interval: Duration,
    selector: TargetSelector<S>,
    dispatcher: Arc<D>,
}

impl<S: Datastore, D: ShotDispatcher> ShotScheduler<S, D> {
    pub fn new(
        id: CombatantId,
        damage: u64,
        interval: Duration,
        selector: TargetSelector<S>,
        dispatcher: Arc<D>,
    ) -> Self {
        ShotScheduler { id, damage, interval, selector, dispatcher }
    }

    /// Shoot until this replica wins or `cancel` fires.
    ///
    /// Only [`TargetError::InvalidDatastoreState`] escapes as an error; store
    /// and dispatch faults are logged and the attempt is skipped until the
    /// next tick.
    pub async fn run(&self, cancel: &Cancellation) -> Result<LoopExit, TargetError> {
        let mut queue = ShotQueue::new();
        let timer = queue.start_timer(self.interval, cancel.clone());
        let exit = self.shoot_until_done(&mut queue, cancel).await;
        timer.abort();
        exit
    }

    async fn shoot_until_done(
        &self,
        queue: &mut ShotQueue,
        cancel: &Cancellation,
    ) -> Result<LoopExit, TargetError> {
        let trigger = queue.trigger();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(LoopExit::Cancelled),
                _ = queue.next_shot() => {
                    if let Some(exit) = self.attempt(&trigger).await? {
                        return Ok(exit);
                    }
                }
            }
        }
    }

    async fn attempt(&self, trigger: &ShotTrigger) -> Result<Option<LoopExit>, TargetError> {
        let target = match self.selector.random_target().await {
            Ok(target) => target,
            Err(TargetError::IAmTheWinner) => return Ok(Some(LoopExit::Winner)),
            Err(TargetError::Store(e)) => {
                tracing::error!(error = %e, "error selecting target");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match self.dispatcher.shoot(target, self.id, self.damage).await {
            Ok(ShotOutcome::Hit { remaining_health }) => {
                tracing::debug!(target, remaining_health, "shot landed");
            }
            Ok(ShotOutcome::Missed(reason)) => {
                tracing::debug!(target, ?reason, "shot missed, retrying");
                trigger.queue_shot();
            }
            Err(e) => {
                tracing::error!(target, error = %e, "error shooting cowboy");
            }
        }
        Ok(None)
    }
}
