use ww_types::CombatantId;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid hostname format: {0:?}")]
    InvalidHostname(String),
}

/// Replica id from a `<prefix>-<integer>` hostname (`cowboy-0`, `cowboy-1`, ...).
pub fn parse_id(hostname: &str) -> Result<CombatantId, IdentityError> {
    let invalid = || IdentityError::InvalidHostname(hostname.to_string());
    let mut parts = hostname.split('-');
    let (Some(prefix), Some(suffix), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    if prefix.is_empty() || suffix.is_empty() {
        return Err(invalid());
    }
    suffix.parse().map_err(|_| invalid())
}

/// DNS name of replica `id`: `<app>-<id>.<service>`.
pub fn replica_host(app_name: &str, service_name: &str, id: CombatantId) -> String {
    format!("{app_name}-{id}.{service_name}")
}

pub fn replica_uri(app_name: &str, service_name: &str, id: CombatantId, grpc_port: u16) -> String {
    format!("http://{}:{grpc_port}", replica_host(app_name, service_name, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_statefulset_hostnames() {
        assert_eq!(parse_id("cowboy-0"), Ok(0));
        assert_eq!(parse_id("cowboy-42"), Ok(42));
    }

    #[test]
    fn rejects_malformed_hostnames() {
        for bad in ["cowboy", "cowboy-", "-1", "cowboy-a", "wild-west-1", ""] {
            assert_eq!(
                parse_id(bad),
                Err(IdentityError::InvalidHostname(bad.to_string())),
                "{bad}"
            );
        }
    }

    #[test]
    fn builds_replica_addresses() {
        assert_eq!(replica_host("cowboy", "cowboys", 3), "cowboy-3.cowboys");
        assert_eq!(replica_uri("cowboy", "cowboys", 3, 50051), "http://cowboy-3.cowboys:50051");
    }
}
