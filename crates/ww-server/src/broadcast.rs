use std::time::Duration;

use tonic::transport::Endpoint;
use tonic::Request;

use ww_proto::v1::{shootout_service_client::ShootoutServiceClient, StartInstantRequest};
use ww_shootout::identity::replica_uri;
use ww_shootout::{DeliveryError, StartBroadcaster};
use ww_types::CombatantId;

/// Delivers over `wildwest.v1.ShootoutService`, one short-lived channel per
/// replica.
pub struct GrpcStartBroadcaster {
    pub app_name: String,
    pub service_name: String,
    pub grpc_port: u16,
    pub connect_timeout: Duration,
}

impl StartBroadcaster for GrpcStartBroadcaster {
    async fn deliver(&self, id: CombatantId, timestamp: i64) -> Result<bool, DeliveryError> {
        let uri = replica_uri(&self.app_name, &self.service_name, id, self.grpc_port);
        deliver_to(uri, timestamp, self.connect_timeout).await
    }
}

async fn deliver_to(
    uri: String,
    timestamp: i64,
    connect_timeout: Duration,
) -> Result<bool, DeliveryError> {
    let channel = Endpoint::from_shared(uri.clone())
        .map_err(|e| DeliveryError::Endpoint { uri, source: e.into() })?
        .connect_timeout(connect_timeout)
        .connect_lazy();
    let resp = ShootoutServiceClient::new(channel)
        .deliver_start_instant(Request::new(StartInstantRequest { timestamp }))
        .await
        .map_err(|status| DeliveryError::Rpc(status.into()))?
        .into_inner();
    Ok(resp.accepted)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::UNIX_EPOCH;

    use tokio::net::TcpListener;
    use tokio_stream::wrappers::TcpListenerStream;
    use ww_proto::v1::shootout_service_server::ShootoutServiceServer;
    use ww_shootout::StartSignal;

    use super::*;
    use crate::ShootoutServiceImpl;

    #[tokio::test]
    async fn delivers_to_a_live_replica() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let start = Arc::new(StartSignal::new());
        let server = tokio::spawn(
            tonic::transport::Server::builder()
                .add_service(ShootoutServiceServer::new(ShootoutServiceImpl::new(start.clone())))
                .serve_with_incoming(TcpListenerStream::new(listener)),
        );

        let uri = format!("http://127.0.0.1:{port}");
        let timeout = Duration::from_secs(2);
        assert!(deliver_to(uri.clone(), 1_700_000_000, timeout).await.unwrap());
        assert!(!deliver_to(uri, 1_700_000_099, timeout).await.unwrap());
        assert_eq!(start.instant(), Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000)));
        server.abort();
    }

    #[tokio::test]
    async fn unreachable_replica_is_an_rpc_error() {
        let broadcaster = GrpcStartBroadcaster {
            app_name: "cowboy".into(),
            service_name: "invalid".into(),
            grpc_port: 1,
            connect_timeout: Duration::from_millis(100),
        };
        assert!(matches!(broadcaster.deliver(3, 0).await, Err(DeliveryError::Rpc(_))));
    }
}
