use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::cancel::Cancellation;

/// Producer side of a [`ShotQueue`].
#[derive(Clone, Debug)]
pub struct ShotTrigger {
    tx: mpsc::Sender<()>,
}

impl ShotTrigger {
    /// Never blocks. Returns `false` when an attempt is already pending and
    /// this trigger was dropped.
    pub fn queue_shot(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// At most one pending "attempt a shot now" trigger.
pub struct ShotQueue {
    trigger: ShotTrigger,
    rx: mpsc::Receiver<()>,
}

impl ShotQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        ShotQueue { trigger: ShotTrigger { tx }, rx }
    }

    pub fn trigger(&self) -> ShotTrigger {
        self.trigger.clone()
    }

    pub async fn next_shot(&mut self) {
        // The queue holds a sender itself, so the channel never closes.
        let _ = self.rx.recv().await;
    }

    /// Queue a trigger every `interval` until `cancel` fires or the handle is
    /// aborted. The first tick comes one full interval after the call.
    pub fn start_timer(&self, interval: Duration, cancel: Cancellation) -> JoinHandle<()> {
        let trigger = self.trigger();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        trigger.queue_shot();
                    }
                }
            }
        })
    }
}

impl Default for ShotQueue {
    fn default() -> Self {
        Self::new()
    }
}
