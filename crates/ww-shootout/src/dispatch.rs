use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use ww_store::Datastore;
use ww_types::CombatantId;

use crate::damage::DamageEngine;
use crate::error::ShotError;

/// Why a shot landed nowhere. Both are expected contention: the attacker
/// should pick a new target and try again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    VictimDead,
    TransactionUnsuccessful,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotOutcome {
    Hit { remaining_health: u64 },
    Missed(MissReason),
}

/// Delivers one shot from `attacker` to `target`.
///
/// Contention comes back as `Ok(ShotOutcome::Missed(_))`; everything else
/// that went wrong is a [`ShotError`] and is not retried here.
pub trait ShotDispatcher: Send + Sync + 'static {
    fn shoot(
        &self,
        target: CombatantId,
        attacker: CombatantId,
        damage: u64,
    ) -> impl Future<Output = Result<ShotOutcome, ShotError>> + Send;
}

/// Calls the target's [`DamageEngine`] directly. Used to run many replicas
/// inside one process against a shared store.
pub struct LocalShotDispatcher<S> {
    engines: Arc<HashMap<CombatantId, Arc<DamageEngine<S>>>>,
}

impl<S: Datastore> LocalShotDispatcher<S> {
    pub fn new(engines: Arc<HashMap<CombatantId, Arc<DamageEngine<S>>>>) -> Self {
        LocalShotDispatcher { engines }
    }
}

impl<S: Datastore> ShotDispatcher for LocalShotDispatcher<S> {
    async fn shoot(
        &self,
        target: CombatantId,
        attacker: CombatantId,
        damage: u64,
    ) -> Result<ShotOutcome, ShotError> {
        let engine = self.engines.get(&target).ok_or(ShotError::UnknownTarget(target))?;
        match engine.apply_damage(attacker, damage).await {
            Ok(remaining_health) => Ok(ShotOutcome::Hit { remaining_health }),
            Err(e) => match e.miss_reason() {
                Some(reason) => Ok(ShotOutcome::Missed(reason)),
                None => Err(ShotError::Local { target, source: e }),
            },
        }
    }
}
