use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use ww_store::Datastore;
use ww_types::{cowboy_key, CombatantId, Compare, CompareOp, StoreError, Txn, TxnOp};

use crate::error::DamageError;
use crate::{parse_health, with_deadline};

type DeathObserver = Box<dyn Fn() + Send + Sync>;

/// Applies inbound shots to this replica's own health record.
///
/// The local lock only keeps concurrent inbound shots from racing each
/// other's read step inside one process. Cross-process correctness comes from
/// the commit preconditions: attacker alive and defender alive at commit time.
pub struct DamageEngine<S> {
    id: CombatantId,
    key: String,
    store: Arc<S>,
    lock: RwLock<()>,
    on_death: DeathObserver,
    store_timeout: Duration,
}

impl<S: Datastore> DamageEngine<S> {
    pub fn new(
        id: CombatantId,
        store: Arc<S>,
        store_timeout: Duration,
        on_death: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        DamageEngine {
            id,
            key: cowboy_key(id),
            store,
            lock: RwLock::new(()),
            on_death: Box::new(on_death),
            store_timeout,
        }
    }

    pub fn id(&self) -> CombatantId {
        self.id
    }

    /// Apply `damage` from `attacker` and return the remaining health.
    ///
    /// * [`DamageError::VictimDead`]: health was already 0, nothing written.
    /// * [`DamageError::TransactionUnsuccessful`]: attacker or defender died
    ///   between the read and the commit, nothing written.
    ///
    /// The death observer runs on the commit that takes health to 0. Later
    /// commits cannot pass the `defender > 0` precondition, so it runs once.
    pub async fn apply_damage(
        &self,
        attacker: CombatantId,
        damage: u64,
    ) -> Result<u64, DamageError> {
        let _guard = self.lock.write().await;

        let current = self.read_health().await?;
        if current == 0 {
            return Err(DamageError::VictimDead);
        }
        let new_health = current.saturating_sub(damage);

        let txn = Txn::new()
            .when([
                Compare::new(cowboy_key(attacker), CompareOp::Greater, "0"),
                Compare::new(self.key.clone(), CompareOp::Greater, "0"),
            ])
            .then([TxnOp::put(self.key.clone(), new_health.to_string())]);
        match with_deadline(self.store_timeout, self.store.commit(txn)).await {
            Ok(()) => {}
            Err(StoreError::TxnUnsuccessful) => return Err(DamageError::TransactionUnsuccessful),
            Err(e) => return Err(e.into()),
        }

        if new_health == 0 {
            (self.on_death)();
            tracing::info!(from = attacker, damage, health = 0, "killing shot received");
            return Ok(0);
        }
        tracing::info!(from = attacker, damage, health = new_health, "shot received");
        Ok(new_health)
    }

    /// Current recorded health of this replica.
    pub async fn health(&self) -> Result<u64, DamageError> {
        let _guard = self.lock.read().await;
        self.read_health().await
    }

    async fn read_health(&self) -> Result<u64, DamageError> {
        match with_deadline(self.store_timeout, self.store.get(&self.key)).await {
            Ok(value) => parse_health(&self.key, &value),
            Err(StoreError::NotFound) => Err(DamageError::MissingRecord { key: self.key.clone() }),
            Err(e) => Err(e.into()),
        }
    }
}
