use ww_types::{CombatantId, StoreError};

use crate::dispatch::MissReason;

/// Transport failure from whichever network layer carries shots or the
/// start instant.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum DamageError {
    #[error("victim is dead")]
    VictimDead,
    #[error("transaction unsuccessful")]
    TransactionUnsuccessful,
    /// Own record is registered before any shot can arrive, so this is a
    /// deployment fault rather than contention.
    #[error("health record '{key}' is missing")]
    MissingRecord { key: String },
    #[error("health record '{key}' holds non-numeric value {value:?}")]
    CorruptRecord { key: String, value: String },
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

impl DamageError {
    /// `Some` for the contention outcomes an attacker should simply retry.
    pub fn miss_reason(&self) -> Option<MissReason> {
        match self {
            DamageError::VictimDead => Some(MissReason::VictimDead),
            DamageError::TransactionUnsuccessful => Some(MissReason::TransactionUnsuccessful),
            _ => None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TargetError {
    /// Not a fault: the caller is the last combatant standing.
    #[error("i am the winner")]
    IAmTheWinner,
    #[error("invalid datastore state: no combatant is alive")]
    InvalidDatastoreState,
    #[error("get alive cowboys: {0}")]
    Store(#[from] StoreError),
}

#[derive(thiserror::Error, Debug)]
pub enum ShotError {
    #[error("invalid endpoint for cowboy {target}: {source}")]
    Endpoint {
        target: CombatantId,
        #[source]
        source: BoxError,
    },
    #[error("send damage to cowboy {target}: {source}")]
    Rpc {
        target: CombatantId,
        #[source]
        source: BoxError,
    },
    #[error("cowboy {target} answered with unknown outcome {outcome}")]
    UnknownOutcome { target: CombatantId, outcome: i32 },
    #[error("no damage engine for cowboy {0}")]
    UnknownTarget(CombatantId),
    #[error("apply damage to cowboy {target}: {source}")]
    Local {
        target: CombatantId,
        #[source]
        source: DamageError,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error("look up own health: {0}")]
    Lookup(#[source] StoreError),
    #[error("set initial health value: {0}")]
    Register(#[source] StoreError),
    #[error(transparent)]
    Record(#[from] DamageError),
    #[error("shooting loop aborted: {0}")]
    Loop(#[source] TargetError),
}
