//! 后端集成：远端对象存储 + 记录库（可选），故障时降级到本地模拟

pub mod gateway;
pub mod http;
pub mod memory;
pub mod traits;

pub use gateway::{storage_path_for, BackendGateway, DegradedMode, RecordId, StoredObject};
pub use http::HttpBackend;
pub use memory::{InMemoryBackend, StoredRecord};
pub use traits::{RecordMetadata, RecordStatus, RecordUpdate, RemoteBackend};
