mod broadcast;
mod convert;
mod damage_service;
mod dispatch;
mod readiness;
mod shootout_service;
mod store_service;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tonic_reflection::server::Builder as ReflectionBuilder;

use ww_proto::v1::{
    damage_service_server::DamageServiceServer, shootout_service_server::ShootoutServiceServer,
    store_service_server::StoreServiceServer,
};
use ww_shootout::{DamageEngine, StartSignal};
use ww_store::Datastore;

pub use broadcast::GrpcStartBroadcaster;
pub use damage_service::DamageServiceImpl;
pub use dispatch::GrpcShotDispatcher;
pub use readiness::{readiness_router, serve_readiness};
pub use shootout_service::ShootoutServiceImpl;
pub use store_service::StoreServiceImpl;

/// Serve `store` as `wildwest.v1.StoreService` until `shutdown` resolves.
pub async fn serve_store<S: Datastore>(
    addr: SocketAddr,
    store: Arc<S>,
    shutdown: impl Future<Output = ()> + Send,
) -> anyhow::Result<()> {
    let reflection = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(ww_proto::FILE_DESCRIPTOR_SET)
        .build_v1()?;
    tracing::info!(%addr, "store gRPC server starting");
    tonic::transport::Server::builder()
        .add_service(StoreServiceServer::new(StoreServiceImpl::new(store)))
        .add_service(reflection)
        .serve_with_shutdown(addr, shutdown)
        .await
        .map_err(Into::into)
}

/// Serve one replica's inbound surface: damage from peers and the start
/// instant from the controller.
pub async fn serve_replica<S: Datastore>(
    addr: SocketAddr,
    engine: Arc<DamageEngine<S>>,
    start: Arc<StartSignal>,
    shutdown: impl Future<Output = ()> + Send,
) -> anyhow::Result<()> {
    let reflection = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(ww_proto::FILE_DESCRIPTOR_SET)
        .build_v1()?;
    tracing::info!(%addr, "replica gRPC server starting");
    tonic::transport::Server::builder()
        .add_service(DamageServiceServer::new(DamageServiceImpl::new(engine)))
        .add_service(ShootoutServiceServer::new(ShootoutServiceImpl::new(start)))
        .add_service(reflection)
        .serve_with_shutdown(addr, shutdown)
        .await
        .map_err(Into::into)
}
