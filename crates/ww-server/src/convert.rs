use tonic::Status;

use ww_proto::v1::{Compare as ProtoCompare, CompareOp as ProtoCompareOp, KeyValue, PutOp};
use ww_shootout::DamageError;
use ww_types::{Compare, CompareOp, StoreError, TxnOp};

pub fn kv_to_proto((key, value): (String, String)) -> KeyValue {
    KeyValue { key, value }
}

pub fn proto_compare(cmp: ProtoCompare) -> Result<Compare, Status> {
    if cmp.key.is_empty() {
        return Err(Status::invalid_argument("compare key must not be empty"));
    }
    let op = match ProtoCompareOp::try_from(cmp.op) {
        Ok(ProtoCompareOp::Equal) => CompareOp::Equal,
        Ok(ProtoCompareOp::NotEqual) => CompareOp::NotEqual,
        Ok(ProtoCompareOp::Greater) => CompareOp::Greater,
        Ok(ProtoCompareOp::Less) => CompareOp::Less,
        Err(_) => return Err(Status::invalid_argument(format!("unknown compare op {}", cmp.op))),
    };
    Ok(Compare::new(cmp.key, op, cmp.value))
}

pub fn proto_put(op: PutOp) -> Result<TxnOp, Status> {
    if op.key.is_empty() {
        return Err(Status::invalid_argument("put key must not be empty"));
    }
    Ok(TxnOp::put(op.key, op.value))
}

pub fn store_to_status(err: StoreError) -> Status {
    match &err {
        StoreError::NotFound => Status::not_found(err.to_string()),
        StoreError::Timeout => Status::deadline_exceeded(err.to_string()),
        StoreError::InvalidArgument(_) => Status::invalid_argument(err.to_string()),
        StoreError::TxnUnsuccessful => Status::aborted(err.to_string()),
        StoreError::Unavailable(_) => Status::unavailable(err.to_string()),
    }
}

/// Only for failures that are not contention; contention travels in the
/// response body.
pub fn damage_to_status(err: DamageError) -> Status {
    match err {
        DamageError::Store(e) => store_to_status(e),
        DamageError::MissingRecord { .. } => Status::failed_precondition(err.to_string()),
        DamageError::VictimDead
        | DamageError::TransactionUnsuccessful
        | DamageError::CorruptRecord { .. } => Status::internal(err.to_string()),
    }
}
