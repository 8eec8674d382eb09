use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use ww_store::Datastore;
use ww_types::{is_alive_value, parse_cowboy_key, CombatantId, StoreError, COWBOY_KEY_PREFIX};

use crate::error::TargetError;
use crate::with_deadline;

/// Picks a uniformly random living opponent from a prefix scan.
///
/// The scan is not a snapshot, so it may mix pre- and post-update records.
/// That is tolerable because health only ever decreases.
pub struct TargetSelector<S> {
    id: CombatantId,
    store: Arc<S>,
    store_timeout: Duration,
}

impl<S: Datastore> TargetSelector<S> {
    pub fn new(id: CombatantId, store: Arc<S>, store_timeout: Duration) -> Self {
        TargetSelector { id, store, store_timeout }
    }

    pub async fn random_target(&self) -> Result<CombatantId, TargetError> {
        let records =
            match with_deadline(self.store_timeout, self.store.get_prefix(COWBOY_KEY_PREFIX)).await {
                Ok(records) => records,
                Err(StoreError::NotFound) => Default::default(),
                Err(e) => return Err(e.into()),
            };

        // Keys under the prefix that are not `cowboy-<id>` are ignored.
        let alive: Vec<CombatantId> = records
            .iter()
            .filter(|(_, value)| is_alive_value(value))
            .filter_map(|(key, _)| parse_cowboy_key(key))
            .collect();

        match alive.as_slice() {
            [] => Err(TargetError::InvalidDatastoreState),
            [only] if *only == self.id => Err(TargetError::IAmTheWinner),
            _ => Ok(self.pick(&alive)),
        }
    }

    /// Uniform over `alive` minus self, by redrawing on self.
    fn pick(&self, alive: &[CombatantId]) -> CombatantId {
        let mut rng = rand::thread_rng();
        loop {
            let candidate = alive[rng.gen_range(0..alive.len())];
            if candidate != self.id {
                return candidate;
            }
        }
    }
}
