use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use tonic::{Request, Response, Status};

use ww_proto::v1::{
    shootout_service_server::ShootoutService, StartInstantRequest, StartInstantResponse,
};
use ww_shootout::StartSignal;

pub struct ShootoutServiceImpl {
    start: Arc<StartSignal>,
}

impl ShootoutServiceImpl {
    pub fn new(start: Arc<StartSignal>) -> Self {
        ShootoutServiceImpl { start }
    }
}

#[tonic::async_trait]
impl ShootoutService for ShootoutServiceImpl {
    async fn deliver_start_instant(
        &self,
        request: Request<StartInstantRequest>,
    ) -> Result<Response<StartInstantResponse>, Status> {
        let timestamp = request.into_inner().timestamp;
        let secs = u64::try_from(timestamp)
            .map_err(|_| Status::invalid_argument("timestamp must not be negative"))?;
        let accepted = self.start.deliver(UNIX_EPOCH + Duration::from_secs(secs));
        if accepted {
            tracing::info!(timestamp, "received shootout beginning time");
        } else {
            tracing::debug!(timestamp, current = ?self.start.instant(), "start instant already set, ignoring");
        }
        Ok(Response::new(StartInstantResponse { accepted }))
    }
}

#[cfg(test)]
mod tests {
    use tonic::Code;

    use super::*;

    fn deliver(timestamp: i64) -> Request<StartInstantRequest> {
        Request::new(StartInstantRequest { timestamp })
    }

    #[tokio::test]
    async fn first_delivery_wins() {
        let start = Arc::new(StartSignal::new());
        let svc = ShootoutServiceImpl::new(start.clone());

        assert!(svc.deliver_start_instant(deliver(1_700_000_000)).await.unwrap().into_inner().accepted);
        assert!(!svc.deliver_start_instant(deliver(1_700_000_050)).await.unwrap().into_inner().accepted);
        assert_eq!(start.instant(), Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000)));
    }

    #[tokio::test]
    async fn negative_timestamp_is_rejected() {
        let start = Arc::new(StartSignal::new());
        let svc = ShootoutServiceImpl::new(start.clone());
        let err = svc.deliver_start_instant(deliver(-1)).await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(start.instant(), None);
    }
}
