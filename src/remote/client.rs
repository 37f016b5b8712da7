// 远端存储 HTTP 客户端
//
// 分片上传接口：
// - POST {endpoint}/chunks/{currency}/{tx_id}/{offset}   上传单个分片
// - POST {endpoint}/chunks/{currency}/{tx_id}/-1         所有分片完成后提交事务，返回最终 ID

use crate::config::EndpointConfig;
use crate::remote::{ChunkAck, FinalizeResponse, TransportError, TransportErrorKind};
use crate::uploader::{SignedChunk, TransactionContext, TransportClient, UploadSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info};

/// 分片签名请求头
pub const CHUNK_SIGNATURE_HEADER: &str = "x-chunk-signature";

/// 分片索引请求头
pub const CHUNK_INDEX_HEADER: &str = "x-chunk-index";

/// HTTP 传输客户端
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// HTTP客户端
    client: Client,
    /// 请求超时
    timeout: Duration,
}

impl HttpTransport {
    /// 创建新的 HTTP 传输客户端
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("resumable-uploader/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("创建 HTTP 客户端失败")?;

        info!(
            "初始化 HTTP 传输客户端: endpoint={}, timeout={}s",
            config.url, config.request_timeout_secs
        );

        Ok(Self { client, timeout })
    }

    /// 分片上传 URL
    fn chunk_url(context: &TransactionContext, offset: i64) -> String {
        format!(
            "{}/chunks/{}/{}/{}",
            context.endpoint.trim_end_matches('/'),
            urlencoding::encode(&context.currency),
            urlencoding::encode(&context.id),
            offset
        )
    }

    /// 将 reqwest 错误归类为传输错误
    fn classify_request_error(&self, e: &reqwest::Error) -> TransportError {
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_connect() || e.is_request() || e.is_body() {
            TransportErrorKind::Network
        } else if let Some(status) = e.status() {
            TransportErrorKind::from_status(status.as_u16())
        } else {
            TransportErrorKind::Unknown
        };

        let message = if kind == TransportErrorKind::Timeout {
            format!("请求超时 ({}s): {}", self.timeout.as_secs(), e)
        } else {
            e.to_string()
        };

        TransportError::new(kind, e.status().map(|s| s.as_u16()), message)
    }
}

#[async_trait]
impl TransportClient for HttpTransport {
    async fn send(
        &self,
        chunk: &SignedChunk,
        context: &TransactionContext,
    ) -> std::result::Result<ChunkAck, TransportError> {
        let url = Self::chunk_url(context, chunk.offset as i64);

        debug!(
            "上传分片: tx={}, index={}, offset={}, size={}",
            context.id,
            chunk.index,
            chunk.offset,
            chunk.data.len()
        );

        let mut request = self
            .client
            .post(&url)
            .header(CHUNK_SIGNATURE_HEADER, &chunk.signature)
            .header(CHUNK_INDEX_HEADER, chunk.index.to_string())
            .header("Content-Type", "application/octet-stream");
        for (name, value) in &chunk.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .body(chunk.data.clone())
            .send()
            .await
            .map_err(|e| self.classify_request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = TransportError::from_status(status.as_u16(), body);
            error!(
                "上传分片失败: index={}, status={}, retriable={}",
                chunk.index,
                status,
                err.transient()
            );
            return Err(err);
        }

        Ok(ChunkAck {
            index: chunk.index,
            status_code: status.as_u16(),
        })
    }

    async fn finalize(
        &self,
        context: &TransactionContext,
        summary: &UploadSummary,
    ) -> std::result::Result<String, TransportError> {
        let url = Self::chunk_url(context, -1);

        info!(
            "提交上传事务: tx={}, size={}, chunks={}",
            context.id, summary.total_size, summary.chunk_count
        );

        let response = self
            .client
            .post(&url)
            .json(summary)
            .send()
            .await
            .map_err(|e| self.classify_request_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.classify_request_error(&e))?;

        if !status.is_success() {
            return Err(TransportError::from_status(status.as_u16(), body));
        }

        let finalized: FinalizeResponse = serde_json::from_str(&body).map_err(|e| {
            TransportError::new(
                TransportErrorKind::Unknown,
                Some(status.as_u16()),
                format!("解析提交响应失败: {}, body={}", e, body),
            )
        })?;

        debug!("上传事务已提交: tx={}, id={}", context.id, finalized.id);
        Ok(finalized.id)
    }
}
