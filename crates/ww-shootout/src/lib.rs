pub mod cancel;
pub mod coordinator;
pub mod damage;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod queue;
pub mod roster;
pub mod scheduler;
pub mod startup;
pub mod target;

use std::future::Future;
use std::time::Duration;

use ww_types::StoreError;

pub use cancel::Cancellation;
pub use coordinator::{
    BroadcastCoordinator, BroadcastReport, CoordinatorConfig, CoordinatorError, DeliveryError,
    DnsResolver, NameResolver, StartBroadcaster,
};
pub use damage::DamageEngine;
pub use dispatch::{LocalShotDispatcher, MissReason, ShotDispatcher, ShotOutcome};
pub use error::{BoxError, DamageError, ShotError, StartupError, TargetError};
pub use scheduler::{LoopExit, ShotScheduler};
pub use startup::{StartSignal, StartupOutcome, StartupState, StartupSynchronizer};
pub use target::TargetSelector;

/// Bound a store call by `limit`; expiry surfaces as [`StoreError::Timeout`].
pub async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, fut).await.map_err(|_| StoreError::Timeout)?
}

/// Parse a stored health value.
pub(crate) fn parse_health(key: &str, value: &str) -> Result<u64, DamageError> {
    value.parse().map_err(|_| DamageError::CorruptRecord {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::SystemTime;

    use rand::Rng;
    use ww_store::{Datastore, MemDatastore};
    use ww_types::Combatant;

    use super::*;

    const REPLICAS: u64 = 1000;
    const STORE_TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn thousand_replicas_leave_one_winner() {
        let store = Arc::new(MemDatastore::new());
        let deaths = Arc::new(AtomicUsize::new(0));

        let cancels: Vec<Cancellation> = (0..REPLICAS).map(|_| Cancellation::new()).collect();
        let roster: Vec<Combatant> = {
            let mut rng = rand::thread_rng();
            (0..REPLICAS)
                .map(|id| Combatant {
                    name: format!("cowboy {id}"),
                    health: rng.gen_range(1..=10),
                    damage: rng.gen_range(1..=10),
                })
                .collect()
        };

        let engines: HashMap<_, _> = (0..REPLICAS)
            .map(|id| {
                let cancel = cancels[id as usize].clone();
                let deaths = deaths.clone();
                let engine = DamageEngine::new(id, store.clone(), STORE_TIMEOUT, move || {
                    deaths.fetch_add(1, Ordering::SeqCst);
                    cancel.cancel();
                });
                (id, Arc::new(engine))
            })
            .collect();
        let dispatcher = Arc::new(LocalShotDispatcher::new(Arc::new(engines)));

        let start = Arc::new(StartSignal::new());
        let mut states = Vec::new();
        let mut handles = Vec::new();
        for (id, combatant) in (0..REPLICAS).zip(roster) {
            let scheduler = ShotScheduler::new(
                id,
                combatant.damage,
                Duration::from_millis(20),
                TargetSelector::new(id, store.clone(), STORE_TIMEOUT),
                dispatcher.clone(),
            );
            let sync = StartupSynchronizer::new(id, combatant, store.clone(), start.clone(), STORE_TIMEOUT);
            states.push(sync.subscribe());
            let cancel = cancels[id as usize].clone();
            handles.push(tokio::spawn(async move { sync.run(&scheduler, &cancel).await }));
        }

        // every replica registers before anyone may shoot
        for rx in &mut states {
            rx.wait_for(|s| *s == StartupState::AwaitingStart).await.unwrap();
        }
        assert!(start.deliver(SystemTime::now() + Duration::from_millis(100)));

        let mut outcomes = Vec::new();
        for h in handles {
            let outcome = tokio::time::timeout(Duration::from_secs(120), h).await.unwrap().unwrap();
            outcomes.push(outcome.unwrap());
        }
        let winners = outcomes.iter().filter(|o| **o == StartupOutcome::Winner).count();
        let defeated = outcomes.iter().filter(|o| **o == StartupOutcome::Defeated).count();
        assert_eq!(winners, 1);
        assert_eq!(defeated, REPLICAS as usize - 1);
        assert_eq!(deaths.load(Ordering::SeqCst), REPLICAS as usize - 1);

        let alive: Vec<_> = store
            .get_prefix(ww_types::COWBOY_KEY_PREFIX)
            .await
            .unwrap()
            .into_values()
            .filter(|v| ww_types::is_alive_value(v))
            .collect();
        assert_eq!(alive.len(), 1);
    }
}
