pub mod v1 {
    tonic::include_proto!("wildwest.v1");
}

/// etcd v3 KV client API.
pub mod etcd {
    tonic::include_proto!("etcdserverpb");
}

/// Encoded descriptors for every service, registered with gRPC reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("descriptor");
