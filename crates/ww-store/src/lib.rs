pub mod endpoint;
pub mod etcd;
pub mod mem;
pub mod remote;
pub mod traits;

pub use endpoint::StoreEndpoint;
pub use etcd::EtcdDatastore;
pub use mem::MemDatastore;
pub use remote::RemoteDatastore;
pub use traits::Datastore;
