use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;

use ww_store::Datastore;
use ww_types::{cowboy_key, CombatantId, Combatant, StoreError};

use crate::cancel::Cancellation;
use crate::dispatch::ShotDispatcher;
use crate::error::StartupError;
use crate::scheduler::{LoopExit, ShotScheduler};
use crate::{parse_health, with_deadline};

// ---------------------------------------------------------------------------
// StartSignal
// ---------------------------------------------------------------------------

/// Holds the start instant broadcast by the controller. Only the first
/// delivery counts; later ones are acknowledged and ignored.
#[derive(Debug)]
pub struct StartSignal {
    tx: watch::Sender<Option<SystemTime>>,
}

impl StartSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        StartSignal { tx }
    }

    /// Returns `true` if this delivery set the instant.
    pub fn deliver(&self, instant: SystemTime) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(instant);
            true
        })
    }

    pub fn instant(&self) -> Option<SystemTime> {
        *self.tx.borrow()
    }

    /// Wait for the first delivery.
    pub async fn received(&self) -> SystemTime {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(instant) = *rx.borrow_and_update() {
                return instant;
            }
            // The sender lives in `self`, so the channel cannot close here.
            let _ = rx.changed().await;
        }
    }
}

impl Default for StartSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// StartupSynchronizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupState {
    Unregistered,
    AwaitingStart,
    Active,
    DeadOnArrival,
}

impl StartupState {
    /// Every state past the initial lookup counts as "process initialized".
    pub fn is_ready(self) -> bool {
        self != StartupState::Unregistered
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    Winner,
    /// Killed during the contest (or while waiting for it to start).
    Defeated,
    /// Already at 0 health when this process booted.
    DeadOnArrival,
}

/// How the boot-time lookup of our own record turned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    Fresh,
    Resumed { health: u64 },
    Dead,
}

/// Drives a replica from boot to its terminal outcome:
/// `Unregistered -> AwaitingStart -> Active`, or `Unregistered -> Active` on
/// restart mid-contest, or `Unregistered -> DeadOnArrival`.
pub struct StartupSynchronizer<S> {
    id: CombatantId,
    combatant: Combatant,
    store: Arc<S>,
    start: Arc<StartSignal>,
    store_timeout: Duration,
    start_wait_timeout: Option<Duration>,
    state: watch::Sender<StartupState>,
}

impl<S: Datastore> StartupSynchronizer<S> {
    pub fn new(
        id: CombatantId,
        combatant: Combatant,
        store: Arc<S>,
        start: Arc<StartSignal>,
        store_timeout: Duration,
    ) -> Self {
        let (state, _rx) = watch::channel(StartupState::Unregistered);
        StartupSynchronizer {
            id,
            combatant,
            store,
            start,
            store_timeout,
            start_wait_timeout: None,
            state,
        }
    }

    /// Stop waiting for the controller after `timeout` and start anyway.
    pub fn with_start_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.start_wait_timeout = timeout;
        self
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> StartupState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<StartupState> {
        self.state.subscribe()
    }

    /// Run to completion. A dead-on-arrival replica returns immediately;
    /// the caller keeps serving RPCs so peers see it as a dead target.
    pub async fn run<D: ShotDispatcher>(
        &self,
        scheduler: &ShotScheduler<S, D>,
        cancel: &Cancellation,
    ) -> Result<StartupOutcome, StartupError> {
        match self.register().await? {
            Registration::Dead => {
                tracing::debug!("found health already in the database, but we're already dead");
                self.state.send_replace(StartupState::DeadOnArrival);
                return Ok(StartupOutcome::DeadOnArrival);
            }
            Registration::Resumed { health } => {
                tracing::info!(health, "restarted mid-contest, resuming immediately");
                self.state.send_replace(StartupState::Active);
            }
            Registration::Fresh => {
                self.state.send_replace(StartupState::AwaitingStart);
                tracing::info!("waiting to begin shootout...");
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(StartupOutcome::Defeated),
                    _ = self.wait_for_start() => {}
                }
                self.state.send_replace(StartupState::Active);
                tracing::info!("beginning shootout!");
            }
        }

        match scheduler.run(cancel).await.map_err(StartupError::Loop)? {
            LoopExit::Winner => Ok(StartupOutcome::Winner),
            LoopExit::Cancelled => Ok(StartupOutcome::Defeated),
        }
    }

    async fn register(&self) -> Result<Registration, StartupError> {
        let key = cowboy_key(self.id);
        match with_deadline(self.store_timeout, self.store.get(&key)).await {
            Ok(value) => match parse_health(&key, &value)? {
                0 => Ok(Registration::Dead),
                health => Ok(Registration::Resumed { health }),
            },
            Err(StoreError::NotFound) => {
                tracing::debug!("didn't find health already in the database");
                let health = self.combatant.health.to_string();
                with_deadline(self.store_timeout, self.store.put(&key, &health))
                    .await
                    .map_err(StartupError::Register)?;
                Ok(Registration::Fresh)
            }
            Err(e) => Err(StartupError::Lookup(e)),
        }
    }

    async fn wait_for_start(&self) {
        let instant = match self.start_wait_timeout {
            None => self.start.received().await,
            Some(limit) => match tokio::time::timeout(limit, self.start.received()).await {
                Ok(instant) => instant,
                Err(_) => {
                    tracing::warn!(?limit, "no start instant received, starting now");
                    return;
                }
            },
        };
        let delay = instant.duration_since(SystemTime::now()).unwrap_or_default();
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use ww_store::MemDatastore;

    use super::*;
    use crate::dispatch::{MissReason, ShotOutcome};
    use crate::error::ShotError;
    use crate::target::TargetSelector;

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct AlwaysMiss;

    impl ShotDispatcher for AlwaysMiss {
        async fn shoot(&self, _: CombatantId, _: CombatantId, _: u64) -> Result<ShotOutcome, ShotError> {
            Ok(ShotOutcome::Missed(MissReason::VictimDead))
        }
    }

    fn cowboy(health: u64) -> Combatant {
        Combatant { name: "John".into(), health, damage: 1 }
    }

    fn fixture(
        store: &Arc<MemDatastore>,
        start: &Arc<StartSignal>,
    ) -> (StartupSynchronizer<MemDatastore>, ShotScheduler<MemDatastore, AlwaysMiss>) {
        let sync = StartupSynchronizer::new(0, cowboy(10), store.clone(), start.clone(), TIMEOUT);
        let scheduler = ShotScheduler::new(
            0,
            1,
            Duration::from_millis(2),
            TargetSelector::new(0, store.clone(), TIMEOUT),
            Arc::new(AlwaysMiss),
        );
        (sync, scheduler)
    }

    #[test]
    fn only_first_delivery_counts() {
        let signal = StartSignal::new();
        let first = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let second = SystemTime::UNIX_EPOCH + Duration::from_secs(200);
        assert!(signal.deliver(first));
        assert!(!signal.deliver(second));
        assert_eq!(signal.instant(), Some(first));
    }

    #[tokio::test]
    async fn fresh_boot_registers_and_waits_for_start() {
        let store = Arc::new(MemDatastore::new());
        store.put(&cowboy_key(1), "0").await.unwrap();
        let start = Arc::new(StartSignal::new());
        let (sync, scheduler) = fixture(&store, &start);
        let mut states = sync.subscribe();
        let cancel = Cancellation::new();

        let run = sync.run(&scheduler, &cancel);
        let drive = async {
            states.wait_for(|s| *s == StartupState::AwaitingStart).await.unwrap();
            assert_eq!(store.get(&cowboy_key(0)).await.unwrap(), "10");
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(*states.borrow(), StartupState::AwaitingStart);
            start.deliver(SystemTime::now() + Duration::from_millis(50));
            states.wait_for(|s| *s == StartupState::Active).await.unwrap();
        };
        let (outcome, ()) =
            tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(run, drive) })
                .await
                .unwrap();
        // cowboy-1 is dead, so the only registered survivor wins
        assert_eq!(outcome.unwrap(), StartupOutcome::Winner);
    }

    #[tokio::test]
    async fn restart_with_health_skips_the_wait() {
        let store = Arc::new(MemDatastore::new());
        store.put(&cowboy_key(0), "4").await.unwrap();
        store.put(&cowboy_key(1), "0").await.unwrap();
        let start = Arc::new(StartSignal::new());
        let (sync, scheduler) = fixture(&store, &start);

        let outcome = tokio::time::timeout(Duration::from_secs(5), sync.run(&scheduler, &Cancellation::new()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, StartupOutcome::Winner);
        assert_eq!(store.get(&cowboy_key(0)).await.unwrap(), "4", "health is not re-registered");
        assert_eq!(start.instant(), None);
    }

    #[tokio::test]
    async fn dead_record_means_dead_on_arrival() {
        let store = Arc::new(MemDatastore::new());
        store.put(&cowboy_key(0), "0").await.unwrap();
        store.put(&cowboy_key(1), "9").await.unwrap();
        let start = Arc::new(StartSignal::new());
        let (sync, scheduler) = fixture(&store, &start);

        let outcome = sync.run(&scheduler, &Cancellation::new()).await.unwrap();
        assert_eq!(outcome, StartupOutcome::DeadOnArrival);
        assert_eq!(sync.state(), StartupState::DeadOnArrival);
        assert!(sync.state().is_ready());
    }

    #[tokio::test]
    async fn death_while_waiting_ends_the_run() {
        let store = Arc::new(MemDatastore::new());
        let start = Arc::new(StartSignal::new());
        let (sync, scheduler) = fixture(&store, &start);
        let mut states = sync.subscribe();
        let cancel = Cancellation::new();

        let run = sync.run(&scheduler, &cancel);
        let kill = async {
            states.wait_for(|s| *s == StartupState::AwaitingStart).await.unwrap();
            cancel.cancel();
        };
        let (outcome, ()) =
            tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(run, kill) })
                .await
                .unwrap();
        assert_eq!(outcome.unwrap(), StartupOutcome::Defeated);
    }

    #[tokio::test]
    async fn start_wait_timeout_proceeds_without_controller() {
        let store = Arc::new(MemDatastore::new());
        store.put(&cowboy_key(1), "0").await.unwrap();
        let start = Arc::new(StartSignal::new());
        let (sync, scheduler) = fixture(&store, &start);
        let sync = sync.with_start_wait_timeout(Some(Duration::from_millis(20)));

        let outcome = tokio::time::timeout(Duration::from_secs(5), sync.run(&scheduler, &Cancellation::new()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, StartupOutcome::Winner);
    }

    #[tokio::test]
    async fn corrupt_record_aborts_startup() {
        let store = Arc::new(MemDatastore::new());
        store.put(&cowboy_key(0), "ten").await.unwrap();
        let start = Arc::new(StartSignal::new());
        let (sync, scheduler) = fixture(&store, &start);
        assert!(matches!(
            sync.run(&scheduler, &Cancellation::new()).await,
            Err(StartupError::Record(_))
        ));
        assert_eq!(sync.state(), StartupState::Unregistered);
    }
}
