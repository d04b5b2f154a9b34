//! Generated bindings for the `google.storage.v1` subset in `proto/`.

pub mod storage {
    pub mod v1 {
        tonic::include_proto!("google.storage.v1");
    }
}
