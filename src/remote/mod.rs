// 远端存储接口模块

pub mod client;
pub mod types;

pub use client::{HttpTransport, CHUNK_INDEX_HEADER, CHUNK_SIGNATURE_HEADER};
pub use types::{ChunkAck, FinalizeResponse, TransportError, TransportErrorKind};
