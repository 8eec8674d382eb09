use std::collections::BTreeMap;
use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request, Status};

use ww_proto::v1::{
    store_service_client::StoreServiceClient, CommitRequest, Compare as ProtoCompare,
    CompareOp as ProtoCompareOp, GetPrefixRequest, GetRequest, PutOp, PutRequest,
};
use ww_types::{CompareOp, StoreError, Txn, TxnOp};

use crate::traits::Datastore;

/// `Datastore` backed by a `wildwest.v1.StoreService` over gRPC.
///
/// The channel is lazily connected and multiplexed; cloning the client per
/// call is cheap.
#[derive(Clone)]
pub struct RemoteDatastore {
    client: StoreServiceClient<Channel>,
    timeout: Duration,
}

impl RemoteDatastore {
    pub fn connect_lazy(endpoint: &str, timeout: Duration) -> Result<Self, StoreError> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| StoreError::InvalidArgument(e.to_string()))?
            .connect_timeout(timeout)
            .timeout(timeout)
            .connect_lazy();
        Ok(RemoteDatastore { client: StoreServiceClient::new(channel), timeout })
    }

    fn request<T>(&self, msg: T) -> Request<T> {
        let mut req = Request::new(msg);
        req.set_timeout(self.timeout);
        req
    }
}

pub(crate) fn status_to_store(status: Status) -> StoreError {
    match status.code() {
        Code::NotFound => StoreError::NotFound,
        Code::DeadlineExceeded => StoreError::Timeout,
        Code::InvalidArgument => StoreError::InvalidArgument(status.message().to_string()),
        _ => StoreError::Unavailable(status.to_string()),
    }
}

fn compare_op_to_proto(op: CompareOp) -> ProtoCompareOp {
    match op {
        CompareOp::Equal => ProtoCompareOp::Equal,
        CompareOp::NotEqual => ProtoCompareOp::NotEqual,
        CompareOp::Greater => ProtoCompareOp::Greater,
        CompareOp::Less => ProtoCompareOp::Less,
    }
}

impl Datastore for RemoteDatastore {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        let resp = self
            .client
            .clone()
            .get(self.request(GetRequest { key: key.to_string() }))
            .await
            .map_err(status_to_store)?
            .into_inner();
        resp.kv.map(|kv| kv.value).ok_or(StoreError::NotFound)
    }

    async fn get_prefix(&self, prefix: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let resp = self
            .client
            .clone()
            .get_prefix(self.request(GetPrefixRequest { prefix: prefix.to_string() }))
            .await
            .map_err(status_to_store)?
            .into_inner();
        if resp.kvs.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(resp.kvs.into_iter().map(|kv| (kv.key, kv.value)).collect())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.client
            .clone()
            .put(self.request(PutRequest { key: key.to_string(), value: value.to_string() }))
            .await
            .map_err(status_to_store)?;
        Ok(())
    }

    async fn commit(&self, txn: Txn) -> Result<(), StoreError> {
        let compares = txn
            .when
            .into_iter()
            .map(|cmp| ProtoCompare {
                key: cmp.key,
                op: compare_op_to_proto(cmp.op) as i32,
                value: cmp.value,
            })
            .collect();
        let puts = txn
            .then
            .into_iter()
            .map(|op| match op {
                TxnOp::Put { key, value } => PutOp { key, value },
            })
            .collect();
        let resp = self
            .client
            .clone()
            .commit(self.request(CommitRequest { compares, puts }))
            .await
            .map_err(status_to_store)?
            .into_inner();
        if !resp.succeeded {
            tracing::trace!("commit preconditions failed");
            return Err(StoreError::TxnUnsuccessful);
        }
        Ok(())
    }
}
