use std::sync::Arc;

use tonic::{Request, Response, Status};

use ww_proto::v1::{
    store_service_server::StoreService, CommitRequest, CommitResponse, GetPrefixRequest,
    GetPrefixResponse, GetRequest, GetResponse, KeyValue, PutRequest, PutResponse,
};
use ww_store::Datastore;
use ww_types::{StoreError, Txn};

use crate::convert::{kv_to_proto, proto_compare, proto_put, store_to_status};

pub struct StoreServiceImpl<S> {
    store: Arc<S>,
}

impl<S: Datastore> StoreServiceImpl<S> {
    pub fn new(store: Arc<S>) -> Self {
        StoreServiceImpl { store }
    }
}

#[tonic::async_trait]
impl<S: Datastore> StoreService for StoreServiceImpl<S> {
    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let req = request.into_inner();
        if req.key.is_empty() {
            return Err(Status::invalid_argument("key must not be empty"));
        }
        match self.store.get(&req.key).await {
            Ok(value) => Ok(Response::new(GetResponse {
                kv: Some(KeyValue { key: req.key, value }),
            })),
            Err(StoreError::NotFound) => {
                Err(Status::not_found(format!("key '{}' not found", req.key)))
            }
            Err(e) => Err(store_to_status(e)),
        }
    }

    async fn get_prefix(
        &self,
        request: Request<GetPrefixRequest>,
    ) -> Result<Response<GetPrefixResponse>, Status> {
        let req = request.into_inner();
        let kvs = match self.store.get_prefix(&req.prefix).await {
            Ok(entries) => entries.into_iter().map(kv_to_proto).collect(),
            Err(StoreError::NotFound) => Vec::new(),
            Err(e) => return Err(store_to_status(e)),
        };
        Ok(Response::new(GetPrefixResponse { kvs }))
    }

    async fn put(&self, request: Request<PutRequest>) -> Result<Response<PutResponse>, Status> {
        let req = request.into_inner();
        if req.key.is_empty() {
            return Err(Status::invalid_argument("key must not be empty"));
        }
        self.store.put(&req.key, &req.value).await.map_err(store_to_status)?;
        Ok(Response::new(PutResponse {}))
    }

    async fn commit(
        &self,
        request: Request<CommitRequest>,
    ) -> Result<Response<CommitResponse>, Status> {
        let req = request.into_inner();
        let compares = req
            .compares
            .into_iter()
            .map(proto_compare)
            .collect::<Result<Vec<_>, _>>()?;
        let puts = req.puts.into_iter().map(proto_put).collect::<Result<Vec<_>, _>>()?;

        let succeeded = match self.store.commit(Txn::new().when(compares).then(puts)).await {
            Ok(()) => true,
            Err(StoreError::TxnUnsuccessful) => false,
            Err(e) => return Err(store_to_status(e)),
        };
        Ok(Response::new(CommitResponse { succeeded }))
    }
}
