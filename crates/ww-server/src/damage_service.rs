use std::sync::Arc;

use tonic::{Request, Response, Status};

use ww_proto::v1::{
    damage_service_server::DamageService, DamageOutcome, DamageRequest, DamageResponse,
};
use ww_shootout::{DamageEngine, MissReason};
use ww_store::Datastore;

use crate::convert::damage_to_status;

pub struct DamageServiceImpl<S> {
    engine: Arc<DamageEngine<S>>,
}

impl<S: Datastore> DamageServiceImpl<S> {
    pub fn new(engine: Arc<DamageEngine<S>>) -> Self {
        DamageServiceImpl { engine }
    }
}

fn missed(reason: MissReason) -> DamageResponse {
    let outcome = match reason {
        MissReason::VictimDead => DamageOutcome::VictimDead,
        MissReason::TransactionUnsuccessful => DamageOutcome::TransactionUnsuccessful,
    };
    DamageResponse { outcome: outcome as i32, remaining_health: 0 }
}

#[tonic::async_trait]
impl<S: Datastore> DamageService for DamageServiceImpl<S> {
    async fn apply_damage(
        &self,
        request: Request<DamageRequest>,
    ) -> Result<Response<DamageResponse>, Status> {
        let req = request.into_inner();
        if req.damage == 0 {
            return Err(Status::invalid_argument("damage must be positive"));
        }
        if req.from == self.engine.id() {
            return Err(Status::invalid_argument("a cowboy cannot shoot itself"));
        }
        match self.engine.apply_damage(req.from, req.damage).await {
            Ok(remaining_health) => Ok(Response::new(DamageResponse {
                outcome: DamageOutcome::Applied as i32,
                remaining_health,
            })),
            Err(e) => match e.miss_reason() {
                Some(reason) => {
                    tracing::debug!(from = req.from, error = %e, "shot missed");
                    Ok(Response::new(missed(reason)))
                }
                None => {
                    tracing::error!(from = req.from, error = %e, "apply damage failed");
                    Err(damage_to_status(e))
                }
            },
        }
    }
}
