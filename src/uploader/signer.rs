// 分片签名
//
// 签名是纯函数：相同输入得到相同输出，没有副作用
// 签名失败说明配置有误（密钥或事务上下文非法），不重试

use crate::error::{UploadError, UploadResult};
use crate::uploader::{Chunk, TransactionContext};
use sha2::{Digest, Sha256};

/// 已签名、可直接发送的分片
#[derive(Debug, Clone)]
pub struct SignedChunk {
    /// 分片索引
    pub index: u32,
    /// 起始偏移
    pub offset: u64,
    /// 分片数据
    pub data: Vec<u8>,
    /// 签名（hex）
    pub signature: String,
    /// 额外请求头
    pub headers: Vec<(String, String)>,
}

impl SignedChunk {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// 分片签名器
pub trait ChunkSigner: Send + Sync {
    fn sign(&self, chunk: Chunk, context: &TransactionContext) -> UploadResult<SignedChunk>;
}

/// 基于 SHA-256 的带密钥摘要签名
///
/// signature = sha256(key ‖ tx_id ‖ index ‖ offset ‖ sha256(data))
#[derive(Clone)]
pub struct DigestSigner {
    key: Vec<u8>,
}

impl DigestSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }
}

impl std::fmt::Debug for DigestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 不输出密钥
        f.debug_struct("DigestSigner")
            .field("key_len", &self.key.len())
            .finish()
    }
}

impl ChunkSigner for DigestSigner {
    fn sign(&self, chunk: Chunk, context: &TransactionContext) -> UploadResult<SignedChunk> {
        if self.key.is_empty() {
            return Err(UploadError::Signing("签名密钥为空".to_string()));
        }
        if context.id.is_empty() {
            return Err(UploadError::Signing("事务 ID 为空".to_string()));
        }

        let data_digest = Sha256::digest(&chunk.data);

        let mut hasher = Sha256::new();
        hasher.update(&self.key);
        hasher.update(context.id.as_bytes());
        hasher.update(chunk.index.to_be_bytes());
        hasher.update(chunk.offset.to_be_bytes());
        hasher.update(&data_digest);
        let signature = hex::encode(hasher.finalize());

        Ok(SignedChunk {
            index: chunk.index,
            offset: chunk.offset,
            headers: vec![("x-chunk-digest".to_string(), hex::encode(&data_digest))],
            data: chunk.data,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TransactionContext {
        TransactionContext::new("http://localhost", "arweave").with_id("tx-1")
    }

    #[test]
    fn test_sign_is_deterministic() {
        let signer = DigestSigner::new(b"secret".to_vec());
        let a = signer
            .sign(Chunk::new(1, 4, b"data".to_vec()), &context())
            .unwrap();
        let b = signer
            .sign(Chunk::new(1, 4, b"data".to_vec()), &context())
            .unwrap();
        assert_eq!(a.signature, b.signature);
        assert_eq!(a.data, b"data");
        assert_eq!(a.index, 1);
        assert_eq!(a.offset, 4);

        // 偏移不同，签名不同
        let c = signer
            .sign(Chunk::new(1, 8, b"data".to_vec()), &context())
            .unwrap();
        assert_ne!(a.signature, c.signature);
    }

    #[test]
    fn test_sign_rejects_bad_input() {
        let signer = DigestSigner::new(Vec::new());
        let err = signer
            .sign(Chunk::new(0, 0, b"x".to_vec()), &context())
            .unwrap_err();
        assert!(matches!(err, UploadError::Signing(_)));

        let signer = DigestSigner::new(b"k".to_vec());
        let ctx = context().with_id("");
        assert!(signer.sign(Chunk::new(0, 0, b"x".to_vec()), &ctx).is_err());
    }
}
