use std::collections::BTreeMap;
use std::future::Future;

use ww_types::{StoreError, Txn};

/// Linearizable key-value store holding the authoritative combatant records.
///
/// Methods use RPITIT (`-> impl Future + Send`) so generic callers can
/// `.await` across thread boundaries without an `async-trait` dependency.
/// Implementations need not enforce deadlines; callers bound each call.
pub trait Datastore: Send + Sync + 'static {
    /// Current value of `key`, or [`StoreError::NotFound`].
    fn get(&self, key: &str) -> impl Future<Output = Result<String, StoreError>> + Send;

    /// Every pair whose key starts with `prefix`, ordered by key.
    /// [`StoreError::NotFound`] when nothing matches.
    fn get_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, String>, StoreError>> + Send;

    /// Unconditional write.
    fn put(&self, key: &str, value: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically apply `txn.then` iff every `txn.when` comparison holds.
    /// A failed precondition is reported as [`StoreError::TxnUnsuccessful`]
    /// and leaves the store untouched.
    fn commit(&self, txn: Txn) -> impl Future<Output = Result<(), StoreError>> + Send;
}
