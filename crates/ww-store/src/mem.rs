use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use ww_types::{StoreError, Txn, TxnOp};

use crate::traits::Datastore;

/// In-memory `Datastore` backed by a `BTreeMap`.
///
/// Every commit runs under the write guard, so transactions are atomic and
/// totally ordered. Used by tests and served over gRPC by the `store`
/// subcommand; not persisted across restarts.
#[derive(Clone)]
pub struct MemDatastore {
    inner: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemDatastore {
    pub fn new() -> Self {
        MemDatastore { inner: Arc::new(RwLock::new(BTreeMap::new())) }
    }
}

impl Default for MemDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl Datastore for MemDatastore {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        self.inner.read().await.get(key).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_prefix(&self, prefix: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let g = self.inner.read().await;
        let found: BTreeMap<String, String> = g
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if found.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(found)
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidArgument("key must not be empty".into()));
        }
        self.inner.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn commit(&self, txn: Txn) -> Result<(), StoreError> {
        let mut g = self.inner.write().await;
        let holds = txn
            .when
            .iter()
            .all(|cmp| cmp.holds(g.get(&cmp.key).map(String::as_str)));
        if !holds {
            return Err(StoreError::TxnUnsuccessful);
        }
        for op in txn.then {
            match op {
                TxnOp::Put { key, value } => {
                    g.insert(key, value);
                }
            }
        }
        Ok(())
    }
}
