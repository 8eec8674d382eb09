use ww_types::StoreError;

/// Which wire protocol a configured store endpoint speaks.
///
/// `etcd://host:port` selects an etcd v3 cluster; plain `http://` or
/// `https://` URIs select a `wildwest.v1.StoreService`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEndpoint {
    Etcd(String),
    Wildwest(String),
}

impl StoreEndpoint {
    pub fn parse(endpoint: &str) -> Result<StoreEndpoint, StoreError> {
        if let Some(authority) = endpoint.strip_prefix("etcd://") {
            if authority.is_empty() {
                return Err(StoreError::InvalidArgument(format!("no etcd address in {endpoint:?}")));
            }
            return Ok(StoreEndpoint::Etcd(format!("http://{authority}")));
        }
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Ok(StoreEndpoint::Wildwest(endpoint.to_string()));
        }
        Err(StoreError::InvalidArgument(format!("unsupported store endpoint {endpoint:?}")))
    }
}
