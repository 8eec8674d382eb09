use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use ww_proto::v1::{
    damage_service_client::DamageServiceClient, DamageOutcome, DamageRequest, DamageResponse,
};
use ww_shootout::identity::replica_uri;
use ww_shootout::{MissReason, ShotDispatcher, ShotError, ShotOutcome};
use ww_types::CombatantId;

/// Sends shots over `wildwest.v1.DamageService`.
///
/// One lazily-connected channel per opponent, created on first use and kept
/// for the rest of the contest. The cache is mutex-guarded so concurrent
/// first use of the same target yields a single channel.
pub struct GrpcShotDispatcher {
    app_name: String,
    service_name: String,
    grpc_port: u16,
    connect_timeout: Duration,
    shot_timeout: Duration,
    clients: Mutex<HashMap<CombatantId, DamageServiceClient<Channel>>>,
}

impl GrpcShotDispatcher {
    pub fn new(
        app_name: impl Into<String>,
        service_name: impl Into<String>,
        grpc_port: u16,
        connect_timeout: Duration,
        shot_timeout: Duration,
    ) -> Self {
        GrpcShotDispatcher {
            app_name: app_name.into(),
            service_name: service_name.into(),
            grpc_port,
            connect_timeout,
            shot_timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self, target: CombatantId) -> Result<DamageServiceClient<Channel>, ShotError> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&target) {
            return Ok(client.clone());
        }
        let uri = replica_uri(&self.app_name, &self.service_name, target, self.grpc_port);
        let channel = Endpoint::from_shared(uri)
            .map_err(|e| ShotError::Endpoint { target, source: e.into() })?
            .connect_timeout(self.connect_timeout)
            .timeout(self.shot_timeout)
            .connect_lazy();
        let client = DamageServiceClient::new(channel);
        clients.insert(target, client.clone());
        tracing::debug!(target, "created damage client");
        Ok(client)
    }

    #[cfg(test)]
    async fn cached_clients(&self) -> usize {
        self.clients.lock().await.len()
    }
}

impl ShotDispatcher for GrpcShotDispatcher {
    async fn shoot(
        &self,
        target: CombatantId,
        attacker: CombatantId,
        damage: u64,
    ) -> Result<ShotOutcome, ShotError> {
        let mut client = self.client(target).await?;
        let mut request = Request::new(DamageRequest { from: attacker, damage });
        request.set_timeout(self.shot_timeout);
        let response = client
            .apply_damage(request)
            .await
            .map_err(|status| ShotError::Rpc { target, source: status.into() })?
            .into_inner();
        classify(target, response)
    }
}

fn classify(target: CombatantId, response: DamageResponse) -> Result<ShotOutcome, ShotError> {
    match DamageOutcome::try_from(response.outcome) {
        Ok(DamageOutcome::Applied) => {
            Ok(ShotOutcome::Hit { remaining_health: response.remaining_health })
        }
        Ok(DamageOutcome::VictimDead) => Ok(ShotOutcome::Missed(MissReason::VictimDead)),
        Ok(DamageOutcome::TransactionUnsuccessful) => {
            Ok(ShotOutcome::Missed(MissReason::TransactionUnsuccessful))
        }
        Err(_) => Err(ShotError::UnknownOutcome { target, outcome: response.outcome }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn classifies_explicit_outcomes() {
        let resp = |outcome: DamageOutcome, remaining_health| DamageResponse {
            outcome: outcome as i32,
            remaining_health,
        };
        assert_eq!(
            classify(1, resp(DamageOutcome::Applied, 4)).unwrap(),
            ShotOutcome::Hit { remaining_health: 4 }
        );
        assert_eq!(
            classify(1, resp(DamageOutcome::VictimDead, 0)).unwrap(),
            ShotOutcome::Missed(MissReason::VictimDead)
        );
        assert_eq!(
            classify(1, resp(DamageOutcome::TransactionUnsuccessful, 0)).unwrap(),
            ShotOutcome::Missed(MissReason::TransactionUnsuccessful)
        );
        assert!(matches!(
            classify(1, DamageResponse { outcome: 99, remaining_health: 0 }),
            Err(ShotError::UnknownOutcome { target: 1, outcome: 99 })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_first_use_creates_one_channel_per_target() {
        let dispatcher = Arc::new(GrpcShotDispatcher::new(
            "cowboy",
            "cowboys",
            50051,
            Duration::from_millis(100),
            Duration::from_millis(100),
        ));
        let mut handles = Vec::new();
        for i in 0..32u64 {
            let dispatcher = dispatcher.clone();
            handles.push(tokio::spawn(async move { dispatcher.client(i % 4).await.map(|_| ()) }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(dispatcher.cached_clients().await, 4);
    }

    #[tokio::test]
    async fn unreachable_peer_is_an_unexpected_error() {
        let dispatcher = GrpcShotDispatcher::new(
            "cowboy",
            "invalid",
            1,
            Duration::from_millis(100),
            Duration::from_millis(100),
        );
        match dispatcher.shoot(7, 0, 1).await {
            Err(ShotError::Rpc { target: 7, source }) => assert!(source.is::<tonic::Status>()),
            other => panic!("expected an rpc error, got {other:?}"),
        }
    }
}
