// 远端存储接口类型定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 传输错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// 网络错误（可重试）
    Network,
    /// 超时（可重试）
    Timeout,
    /// 服务器错误（可重试）
    ServerError,
    /// 限流（可重试，需要更长等待时间）
    RateLimited,
    /// 参数错误（不可重试）
    BadRequest,
    /// 签名被拒绝（不可重试）
    Unauthorized,
    /// 余额不足（不可重试）
    PaymentRequired,
    /// 权限不足（不可重试）
    Forbidden,
    /// 远端事务已过期或被回收（不可重试）
    Expired,
    /// 未知错误
    Unknown,
}

impl TransportErrorKind {
    /// 是否可重试
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            TransportErrorKind::Network
                | TransportErrorKind::Timeout
                | TransportErrorKind::ServerError
                | TransportErrorKind::RateLimited
        )
    }

    /// 从 HTTP 状态码转换
    pub fn from_status(status: u16) -> Self {
        match status {
            408 => TransportErrorKind::Timeout,
            429 => TransportErrorKind::RateLimited,
            400 | 413 | 422 => TransportErrorKind::BadRequest,
            401 => TransportErrorKind::Unauthorized,
            402 => TransportErrorKind::PaymentRequired,
            403 => TransportErrorKind::Forbidden,
            404 | 410 => TransportErrorKind::Expired,
            500..=599 => TransportErrorKind::ServerError,
            _ => TransportErrorKind::Unknown,
        }
    }
}

/// 传输错误
///
/// transient 由 kind 推导，调度器据此决定是否退避重试
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    /// 错误分类
    pub kind: TransportErrorKind,
    /// HTTP 状态码（网络层错误时为 None）
    pub status_code: Option<u16>,
    /// 错误信息
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status_code,
            message: message.into(),
        }
    }

    /// 根据 HTTP 状态码构造
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::from_status(status), Some(status), message)
    }

    /// 是否为瞬时错误（可重试）
    pub fn transient(&self) -> bool {
        self.kind.is_retriable()
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{:?} (status={}): {}", self.kind, code, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for TransportError {}

/// 分片确认
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAck {
    /// 分片索引
    pub index: u32,
    /// HTTP 状态码
    pub status_code: u16,
}

/// 事务完成响应（远端分配的最终 ID）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeResponse {
    pub id: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_retriable() {
        assert!(TransportErrorKind::Network.is_retriable());
        assert!(TransportErrorKind::Timeout.is_retriable());
        assert!(TransportErrorKind::ServerError.is_retriable());
        assert!(TransportErrorKind::RateLimited.is_retriable());

        assert!(!TransportErrorKind::BadRequest.is_retriable());
        assert!(!TransportErrorKind::Unauthorized.is_retriable());
        assert!(!TransportErrorKind::PaymentRequired.is_retriable());
        assert!(!TransportErrorKind::Expired.is_retriable());
        assert!(!TransportErrorKind::Unknown.is_retriable());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(TransportErrorKind::from_status(503), TransportErrorKind::ServerError);
        assert_eq!(TransportErrorKind::from_status(429), TransportErrorKind::RateLimited);
        assert_eq!(TransportErrorKind::from_status(408), TransportErrorKind::Timeout);
        assert_eq!(TransportErrorKind::from_status(402), TransportErrorKind::PaymentRequired);
        assert_eq!(TransportErrorKind::from_status(410), TransportErrorKind::Expired);
        assert_eq!(TransportErrorKind::from_status(302), TransportErrorKind::Unknown);

        let e = TransportError::from_status(500, "internal");
        assert!(e.transient());
        let e = TransportError::from_status(400, "bad");
        assert!(!e.transient());
    }

    #[test]
    fn test_finalize_response_parse() {
        let resp: FinalizeResponse = serde_json::from_str(r#"{"id":"abc"}"#).unwrap();
        assert_eq!(resp.id, "abc");
        assert!(resp.timestamp.is_none());
    }
}
