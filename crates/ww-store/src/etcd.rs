use std::collections::BTreeMap;
use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use ww_proto::etcd::{
    compare::{CompareResult, CompareTarget, TargetUnion},
    kv_client::KvClient,
    request_op, Compare as EtcdCompare, PutRequest, RangeRequest, RequestOp, TxnRequest,
};
use ww_types::{Compare, CompareOp, StoreError, Txn, TxnOp};

use crate::remote::status_to_store;
use crate::traits::Datastore;

/// `Datastore` backed by an etcd v3 cluster.
///
/// Prefix reads are `[prefix, prefix_range_end(prefix))` range requests and
/// commits are etcd transactions with value compares.
#[derive(Clone)]
pub struct EtcdDatastore {
    client: KvClient<Channel>,
    timeout: Duration,
}

impl EtcdDatastore {
    pub fn connect_lazy(endpoint: &str, timeout: Duration) -> Result<Self, StoreError> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| StoreError::InvalidArgument(e.to_string()))?
            .connect_timeout(timeout)
            .timeout(timeout)
            .connect_lazy();
        Ok(EtcdDatastore { client: KvClient::new(channel), timeout })
    }

    fn request<T>(&self, msg: T) -> Request<T> {
        let mut req = Request::new(msg);
        req.set_timeout(self.timeout);
        req
    }
}

/// Smallest key greater than every key starting with `prefix`. An all-`0xff`
/// or empty prefix yields `"\0"`, which etcd reads as "to the end".
pub(crate) fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    vec![0]
}

fn compare_to_etcd(cmp: Compare) -> EtcdCompare {
    let result = match cmp.op {
        CompareOp::Equal => CompareResult::Equal,
        CompareOp::NotEqual => CompareResult::NotEqual,
        CompareOp::Greater => CompareResult::Greater,
        CompareOp::Less => CompareResult::Less,
    };
    EtcdCompare {
        result: result as i32,
        target: CompareTarget::Value as i32,
        key: cmp.key.into_bytes(),
        target_union: Some(TargetUnion::Value(cmp.value.into_bytes())),
        range_end: Vec::new(),
    }
}

fn txn_to_etcd(txn: Txn) -> TxnRequest {
    TxnRequest {
        compare: txn.when.into_iter().map(compare_to_etcd).collect(),
        success: txn
            .then
            .into_iter()
            .map(|op| match op {
                TxnOp::Put { key, value } => RequestOp {
                    request: Some(request_op::Request::RequestPut(PutRequest {
                        key: key.into_bytes(),
                        value: value.into_bytes(),
                        ..Default::default()
                    })),
                },
            })
            .collect(),
        failure: Vec::new(),
    }
}

fn text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

impl Datastore for EtcdDatastore {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        let resp = self
            .client
            .clone()
            .range(self.request(RangeRequest { key: key.as_bytes().to_vec(), ..Default::default() }))
            .await
            .map_err(status_to_store)?
            .into_inner();
        resp.kvs.into_iter().next().map(|kv| text(kv.value)).ok_or(StoreError::NotFound)
    }

    async fn get_prefix(&self, prefix: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let key = if prefix.is_empty() { vec![0] } else { prefix.as_bytes().to_vec() };
        let range_end = prefix_range_end(prefix.as_bytes());
        let resp = self
            .client
            .clone()
            .range(self.request(RangeRequest { key, range_end, ..Default::default() }))
            .await
            .map_err(status_to_store)?
            .into_inner();
        if resp.kvs.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(resp.kvs.into_iter().map(|kv| (text(kv.key), text(kv.value))).collect())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let req = PutRequest {
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
            ..Default::default()
        };
        self.client.clone().put(self.request(req)).await.map_err(status_to_store)?;
        Ok(())
    }

    async fn commit(&self, txn: Txn) -> Result<(), StoreError> {
        let resp = self
            .client
            .clone()
            .txn(self.request(txn_to_etcd(txn)))
            .await
            .map_err(status_to_store)?
            .into_inner();
        if !resp.succeeded {
            tracing::trace!("etcd txn compares failed");
            return Err(StoreError::TxnUnsuccessful);
        }
        Ok(())
    }
}
