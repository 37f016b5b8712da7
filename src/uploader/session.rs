//! 上传会话
//!
//! [`Uploader`] 持有签名器、传输客户端和上传配置，负责创建会话：
//!
//! ```ignore
//! let uploader = Uploader::new(signer, transport, UploadConfig::default())?;
//! let session = uploader.from_buffer(data, context);
//! session.on(|event| println!("{:?}", event));
//! let receipt = session.start().await?.await?;
//! ```
//!
//! 每个会话拥有自己的事件总线、上传状态和调度控制，
//! 会话之间互不影响；续传数据由调用方自行保存。

use crate::config::UploadConfig;
use crate::error::{UploadError, UploadResult};
use crate::uploader::events::{EventBus, SubscriptionId, UploadEvent};
use crate::uploader::scheduler::{
    ChunkScheduler, SchedulerControl, SchedulerOptions, UploadReceipt,
};
use crate::uploader::task::{SessionInfo, SessionStatus};
use crate::uploader::{
    BufferSource, ChunkSigner, ChunkSource, FileSource, ResumeData, StreamSource, Transaction,
    TransactionContext, TransportClient, UploadState,
};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 上传器（会话工厂）
#[derive(Clone)]
pub struct Uploader {
    signer: Arc<dyn ChunkSigner>,
    transport: Arc<dyn TransportClient>,
    config: UploadConfig,
}

impl Uploader {
    pub fn new(
        signer: Arc<dyn ChunkSigner>,
        transport: Arc<dyn TransportClient>,
        config: UploadConfig,
    ) -> UploadResult<Self> {
        config.validate()?;
        Ok(Self {
            signer,
            transport,
            config,
        })
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// 上传内存数据
    pub fn from_buffer(
        &self,
        data: impl Into<Vec<u8>>,
        context: TransactionContext,
    ) -> UploadResult<UploadSession> {
        self.session(Arc::new(BufferSource::new(data)), context)
    }

    /// 上传数据流（只能向前读取，长度可以未知）
    pub fn from_stream<R>(
        &self,
        reader: R,
        length: Option<u64>,
        context: TransactionContext,
    ) -> UploadResult<UploadSession>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.session(Arc::new(StreamSource::new(reader, length)), context)
    }

    /// 上传本地文件
    pub async fn from_file(
        &self,
        path: impl AsRef<Path>,
        context: TransactionContext,
    ) -> UploadResult<UploadSession> {
        let source = FileSource::open(path).await?;
        self.session(Arc::new(source), context)
    }

    /// 上传预先构建好的事务
    pub fn from_transaction(&self, transaction: Transaction) -> UploadResult<UploadSession> {
        let Transaction { context, data } = transaction;
        self.from_buffer(data, context)
    }

    /// 使用任意数据源创建会话
    pub fn from_source(
        &self,
        source: Arc<dyn ChunkSource>,
        context: TransactionContext,
    ) -> UploadResult<UploadSession> {
        self.session(source, context)
    }

    /// 从续传数据恢复会话
    ///
    /// 数据源和事务上下文必须与生成续传数据时一致，启动时校验
    pub fn from_resume_data(
        &self,
        resume: &ResumeData,
        source: Arc<dyn ChunkSource>,
        context: TransactionContext,
    ) -> UploadResult<UploadSession> {
        let session = self.session(source, context)?;
        session.set_resume_data(resume)?;
        Ok(session)
    }

    fn session(
        &self,
        source: Arc<dyn ChunkSource>,
        context: TransactionContext,
    ) -> UploadResult<UploadSession> {
        UploadSession::new(
            source,
            context,
            self.signer.clone(),
            self.transport.clone(),
            self.config.clone(),
        )
    }
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("config", &self.config)
            .finish()
    }
}

/// 启动前可修改的会话参数
struct SessionSettings {
    batch_size: usize,
    chunk_size: u32,
    /// chunk_size 是否通过 set_chunk_size 显式设置（否则来自配置）
    chunk_size_explicit: bool,
    /// 状态是否来自续传数据
    restored: bool,
    handle: Option<UploadHandle>,
}

/// 上传会话
pub struct UploadSession {
    source: Arc<dyn ChunkSource>,
    context: TransactionContext,
    signer: Arc<dyn ChunkSigner>,
    transport: Arc<dyn TransportClient>,
    config: UploadConfig,
    events: Arc<EventBus>,
    state: Arc<Mutex<UploadState>>,
    info: Arc<Mutex<SessionInfo>>,
    control: Arc<SchedulerControl>,
    settings: Mutex<SessionSettings>,
}

impl UploadSession {
    fn new(
        source: Arc<dyn ChunkSource>,
        context: TransactionContext,
        signer: Arc<dyn ChunkSigner>,
        transport: Arc<dyn TransportClient>,
        config: UploadConfig,
    ) -> UploadResult<Self> {
        let state = fresh_state(source.as_ref(), config.chunk_size, &context, None)?;
        let info = SessionInfo::new(context.id.clone(), state.total_size());

        Ok(Self {
            source,
            context,
            signer,
            transport,
            events: Arc::new(EventBus::new()),
            state: Arc::new(Mutex::new(state)),
            info: Arc::new(Mutex::new(info)),
            control: Arc::new(SchedulerControl::new()),
            settings: Mutex::new(SessionSettings {
                batch_size: config.batch_size,
                chunk_size: config.chunk_size,
                chunk_size_explicit: false,
                restored: false,
                handle: None,
            }),
            config,
        })
    }

    /// 注册事件处理器
    pub fn on<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&UploadEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    /// 移除事件处理器
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn context(&self) -> &TransactionContext {
        &self.context
    }

    pub fn status(&self) -> SessionStatus {
        self.info.lock().status
    }

    /// 运行信息快照
    pub fn info(&self) -> SessionInfo {
        self.info.lock().clone()
    }

    pub fn batch_size(&self) -> usize {
        self.settings.lock().batch_size
    }

    pub fn chunk_size(&self) -> u32 {
        self.settings.lock().chunk_size
    }

    /// 设置并发分片数（只能在启动前设置）
    pub fn set_batch_size(&self, batch_size: usize) -> UploadResult<()> {
        self.ensure_idle("batch_size")?;
        if batch_size == 0 {
            return Err(UploadError::config("batch_size 必须大于 0"));
        }
        self.settings.lock().batch_size = batch_size;
        Ok(())
    }

    /// 设置分片大小（只能在启动前设置）
    pub fn set_chunk_size(&self, chunk_size: u32) -> UploadResult<()> {
        self.ensure_idle("chunk_size")?;
        if chunk_size == 0 {
            return Err(UploadError::config("chunk_size 必须大于 0"));
        }
        let mut settings = self.settings.lock();
        if settings.chunk_size == chunk_size {
            settings.chunk_size_explicit = true;
            return Ok(());
        }
        if settings.restored {
            return Err(UploadError::ResumeMismatch(format!(
                "续传数据的分片大小为 {}，不能修改为 {}",
                settings.chunk_size, chunk_size
            )));
        }
        let state = fresh_state(self.source.as_ref(), chunk_size, &self.context, None)?;
        *self.state.lock() = state;
        settings.chunk_size = chunk_size;
        settings.chunk_size_explicit = true;
        Ok(())
    }

    /// 导出续传数据
    ///
    /// 可以在任何时候调用，进行中的分片导出为等待状态
    pub fn resume_data(&self) -> UploadResult<ResumeData> {
        self.state.lock().to_resume_data()
    }

    /// 载入续传数据（只能在启动前调用）
    ///
    /// 分片大小以续传数据为准，覆盖配置中的值；
    /// 已通过 [`set_chunk_size`](Self::set_chunk_size) 设置了不同的值时返回 `ResumeMismatch`
    pub fn set_resume_data(&self, resume: &ResumeData) -> UploadResult<()> {
        self.ensure_idle("resume_data")?;
        let state = UploadState::from_resume_data(resume)?;

        let mut settings = self.settings.lock();
        let expected_chunk_size = if settings.chunk_size_explicit {
            settings.chunk_size
        } else {
            state.chunk_size()
        };
        state.verify_compatible(
            self.source.length(),
            expected_chunk_size,
            &self.context,
            None,
        )?;

        settings.chunk_size = state.chunk_size();
        settings.restored = true;
        {
            let mut info = self.info.lock();
            info.total_size = state.total_size();
            info.uploaded_size = state.bytes_acked();
            info.total_chunks = state.chunk_count();
            info.completed_chunks = state.acked_count();
        }
        *self.state.lock() = state;
        debug!("会话已载入续传数据: tx={}", self.context.id);
        Ok(())
    }

    /// 启动上传
    ///
    /// 返回的 [`UploadHandle`] 可以克隆、等待；丢弃它不会停止上传
    pub async fn start(&self) -> UploadResult<UploadHandle> {
        let (batch_size, chunk_size, restored) = {
            let settings = self.settings.lock();
            let mut info = self.info.lock();
            if info.status != SessionStatus::Idle {
                return Err(UploadError::config(format!(
                    "会话不能重复启动，当前状态: {:?}",
                    info.status
                )));
            }
            info.mark_running();
            (settings.batch_size, settings.chunk_size, settings.restored)
        };

        if let Err(e) = self.prepare_state(chunk_size, restored).await {
            warn!("启动上传失败: tx={}, 错误: {}", self.context.id, e);
            self.info.lock().mark_failed(e.to_string());
            return Err(e);
        }

        let scheduler = ChunkScheduler::new(
            self.state.clone(),
            self.source.clone(),
            self.signer.clone(),
            self.transport.clone(),
            self.events.clone(),
            SchedulerOptions {
                batch_size,
                policy: self.config.retry_policy(),
            },
        )
        .with_control(self.control.clone())
        .with_info(self.info.clone());

        let (tx, rx) = watch::channel(None);
        let handle = UploadHandle { rx };
        self.settings.lock().handle = Some(handle.clone());

        info!(
            "🔥 启动上传会话: tx={}, 分片大小={}, 并发={}, 续传={}",
            self.context.id, chunk_size, batch_size, restored
        );
        tokio::spawn(async move {
            let result = scheduler.run().await;
            // 所有句柄都已丢弃时发送失败，忽略
            let _ = tx.send(Some(result));
        });

        Ok(handle)
    }

    /// 校验续传状态或创建新的上传状态
    async fn prepare_state(&self, chunk_size: u32, restored: bool) -> UploadResult<()> {
        let digest = if self.config.verify_content {
            self.source.content_digest().await?
        } else {
            None
        };

        if restored {
            let state = self.state.lock();
            state.verify_compatible(
                self.source.length(),
                chunk_size,
                &self.context,
                digest.as_deref(),
            )?;
            if !self.source.is_seekable() && state.acked_count() > 0 {
                return Err(UploadError::config(
                    "流式数据源不支持从已确认的分片之后续传",
                ));
            }
        } else {
            let state = fresh_state(self.source.as_ref(), chunk_size, &self.context, digest)?;
            *self.state.lock() = state;
        }
        Ok(())
    }

    /// 暂停上传（进行中的分片会自然结束）
    pub fn pause(&self) -> UploadResult<()> {
        let mut info = self.info.lock();
        match info.status {
            SessionStatus::Running => {
                self.control.pause();
                info.mark_paused();
                info!("上传已暂停: tx={}", self.context.id);
                Ok(())
            }
            SessionStatus::Paused => Ok(()),
            status => Err(UploadError::config(format!(
                "当前状态不能暂停: {:?}",
                status
            ))),
        }
    }

    /// 恢复上传
    pub fn resume(&self) -> UploadResult<()> {
        let mut info = self.info.lock();
        match info.status {
            SessionStatus::Paused => {
                info.mark_running();
                self.control.resume();
                info!("上传已恢复: tx={}", self.context.id);
                Ok(())
            }
            SessionStatus::Running => Ok(()),
            status => Err(UploadError::config(format!(
                "当前状态不能恢复: {:?}",
                status
            ))),
        }
    }

    /// 取消上传
    ///
    /// 未启动的会话直接失败，运行中的会话等进行中的分片结束后失败
    pub fn cancel(&self) {
        self.control.cancel();
        let mut info = self.info.lock();
        if info.status == SessionStatus::Idle {
            info.mark_failed(UploadError::Cancelled.to_string());
        }
    }

    /// 启动后的句柄
    pub fn handle(&self) -> Option<UploadHandle> {
        self.settings.lock().handle.clone()
    }

    fn ensure_idle(&self, what: &str) -> UploadResult<()> {
        let status = self.status();
        if status != SessionStatus::Idle {
            return Err(UploadError::config(format!(
                "{} 只能在启动前修改，当前状态: {:?}",
                what, status
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSession")
            .field("context", &self.context)
            .field("status", &self.status())
            .finish()
    }
}

/// 按数据源创建新的上传状态
fn fresh_state(
    source: &dyn ChunkSource,
    chunk_size: u32,
    context: &TransactionContext,
    digest: Option<String>,
) -> UploadResult<UploadState> {
    match source.length() {
        Some(length) => UploadState::new(length, chunk_size, context.clone(), digest),
        None => UploadState::new_streaming(chunk_size, context.clone()),
    }
}

/// 上传句柄
///
/// 所有克隆共享同一个最终结果
#[derive(Clone)]
pub struct UploadHandle {
    rx: watch::Receiver<Option<UploadResult<UploadReceipt>>>,
}

impl UploadHandle {
    /// 等待上传结束
    pub async fn wait(&self) -> UploadResult<UploadReceipt> {
        let mut rx = self.rx.clone();
        loop {
            let current = rx.borrow().clone();
            if let Some(result) = current {
                return result;
            }
            if rx.changed().await.is_err() {
                // 调度任务异常退出（没有发送结果）
                let last = rx.borrow().clone();
                return last.unwrap_or(Err(UploadError::Cancelled));
            }
        }
    }

    /// 是否已结束
    pub fn is_finished(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

impl IntoFuture for UploadHandle {
    type Output = UploadResult<UploadReceipt>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

impl std::fmt::Debug for UploadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::TransportError;
    use crate::uploader::scheduler::tests::{MockTransport, PassSigner};
    use crate::uploader::DigestSigner;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(chunk_size: u32, batch_size: usize) -> UploadConfig {
        UploadConfig {
            chunk_size,
            batch_size,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            rate_limit_backoff_ms: 5,
            ..UploadConfig::default()
        }
    }

    fn context() -> TransactionContext {
        TransactionContext::new("http://node1.example.net", "arweave").with_id("tx-session")
    }

    fn uploader(transport: Arc<MockTransport>, cfg: UploadConfig) -> Uploader {
        Uploader::new(Arc::new(PassSigner), transport, cfg).unwrap()
    }

    #[tokio::test]
    async fn test_buffer_upload() {
        let transport = Arc::new(MockTransport::default());
        let up = uploader(transport.clone(), config(10, 3));
        let session = up.from_buffer(vec![1u8; 35], context()).unwrap();

        let done = Arc::new(AtomicUsize::new(0));
        let d = done.clone();
        session.on(move |e| {
            if let UploadEvent::Done { .. } = e {
                d.fetch_add(1, Ordering::SeqCst);
            }
        });

        let handle = session.start().await.unwrap();
        let receipt = handle.clone().await.unwrap();
        assert_eq!(receipt.chunk_count, 4);
        assert_eq!(receipt.total_size, 35);
        // 所有句柄看到同一个结果
        assert_eq!(handle.wait().await.unwrap(), receipt);

        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.info().progress(), 100.0);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let up = uploader(Arc::new(MockTransport::default()), config(10, 1));
        let session = up.from_buffer(vec![0u8; 10], context()).unwrap();
        let handle = session.start().await.unwrap();
        assert!(matches!(
            session.start().await,
            Err(UploadError::Configuration(_))
        ));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_settings_locked_after_start() {
        let up = uploader(Arc::new(MockTransport::default()), config(10, 1));
        let session = up.from_buffer(vec![0u8; 40], context()).unwrap();

        assert!(session.set_batch_size(0).is_err());
        session.set_batch_size(2).unwrap();
        session.set_chunk_size(20).unwrap();
        assert!(session
            .resume_data()
            .unwrap()
            .as_str()
            .contains("\"chunk_size\":20"));

        let handle = session.start().await.unwrap();
        assert!(matches!(
            session.set_batch_size(4),
            Err(UploadError::Configuration(_))
        ));
        assert!(matches!(
            session.set_chunk_size(5),
            Err(UploadError::Configuration(_))
        ));
        let receipt = handle.await.unwrap();
        assert_eq!(receipt.chunk_count, 2);
    }

    #[tokio::test]
    async fn test_pause_resume_session() {
        let transport = Arc::new(MockTransport::with_delay(Duration::from_millis(10)));
        let up = uploader(transport.clone(), config(10, 2));
        let session = up.from_buffer(vec![2u8; 100], context()).unwrap();

        assert!(session.pause().is_err());
        let handle = session.start().await.unwrap();
        session.pause().unwrap();
        assert_eq!(session.status(), SessionStatus::Paused);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let sent_while_paused = transport.sent().len();
        assert!(sent_while_paused <= 2);
        assert!(!handle.is_finished());

        session.resume().unwrap();
        let receipt = handle.await.unwrap();
        assert_eq!(receipt.chunk_count, 10);
        assert_eq!(transport.sent().len(), 10);
        assert!(session.resume().is_err());
    }

    #[tokio::test]
    async fn test_cancel_running_session() {
        let transport = Arc::new(MockTransport::with_delay(Duration::from_millis(20)));
        let up = uploader(transport.clone(), config(10, 1));
        let session = up.from_buffer(vec![0u8; 100], context()).unwrap();

        let handle = session.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        session.cancel();

        assert_eq!(handle.await.unwrap_err(), UploadError::Cancelled);
        assert_eq!(session.status(), SessionStatus::Failed);
        assert!(transport.sent().len() < 10);
        // 取消后仍可导出续传数据
        assert!(session.resume_data().is_ok());
    }

    #[tokio::test]
    async fn test_resume_in_new_session() {
        let data = vec![4u8; 50];
        let t1 = Arc::new(MockTransport::default());
        t1.fail_chunk(2, vec![TransportError::from_status(403, "denied")]);
        let up1 = uploader(t1.clone(), config(10, 1));
        let s1 = up1.from_buffer(data.clone(), context()).unwrap();
        let err = s1.start().await.unwrap().await.unwrap_err();
        assert!(matches!(err, UploadError::Transport(_)));
        assert_eq!(s1.status(), SessionStatus::Failed);

        let resume = s1.resume_data().unwrap();

        let t2 = Arc::new(MockTransport::default());
        let up2 = uploader(t2.clone(), config(10, 1));
        let source: Arc<dyn ChunkSource> = Arc::new(BufferSource::new(data));
        let s2 = up2.from_resume_data(&resume, source, context()).unwrap();
        assert_eq!(s2.info().completed_chunks, 2);

        let receipt = s2.start().await.unwrap().await.unwrap();
        assert_eq!(t2.sent(), vec![2, 3, 4]);
        assert_eq!(receipt.remote_id, "remote-tx-session");
    }

    #[tokio::test]
    async fn test_resume_rejects_different_content() {
        let t = Arc::new(MockTransport::default());
        let up = uploader(t, config(10, 1));
        let s1 = up.from_buffer(vec![1u8; 30], context()).unwrap();
        s1.start().await.unwrap().await.unwrap();
        let resume = s1.resume_data().unwrap();

        // 长度相同，内容不同
        let source: Arc<dyn ChunkSource> = Arc::new(BufferSource::new(vec![2u8; 30]));
        let s2 = up.from_resume_data(&resume, source, context()).unwrap();
        assert!(matches!(
            s2.start().await,
            Err(UploadError::ResumeMismatch(_))
        ));
        assert_eq!(s2.status(), SessionStatus::Failed);

        // 长度不同在载入时即被拒绝
        let source: Arc<dyn ChunkSource> = Arc::new(BufferSource::new(vec![1u8; 31]));
        assert!(up.from_resume_data(&resume, source, context()).is_err());

        // 事务上下文不同
        let source: Arc<dyn ChunkSource> = Arc::new(BufferSource::new(vec![1u8; 30]));
        assert!(up
            .from_resume_data(&resume, source, context().with_id("other"))
            .is_err());
    }

    #[tokio::test]
    async fn test_resume_chunk_size_against_explicit_setting() {
        let t = Arc::new(MockTransport::default());
        let up = uploader(t, config(10, 1));
        let resume = up
            .from_buffer(vec![1u8; 30], context())
            .unwrap()
            .resume_data()
            .unwrap();

        // 显式设置了不同的分片大小
        let source: Arc<dyn ChunkSource> = Arc::new(BufferSource::new(vec![1u8; 30]));
        let session = up.from_source(source.clone(), context()).unwrap();
        session.set_chunk_size(5).unwrap();
        assert!(matches!(
            session.set_resume_data(&resume),
            Err(UploadError::ResumeMismatch(_))
        ));
        assert_eq!(session.chunk_size(), 5);

        // 显式设置的值一致
        let session = up.from_source(source.clone(), context()).unwrap();
        session.set_chunk_size(10).unwrap();
        session.set_resume_data(&resume).unwrap();

        // 仅来自配置的分片大小以续传数据为准
        let up2 = uploader(Arc::new(MockTransport::default()), config(7, 1));
        let session = up2.from_resume_data(&resume, source, context()).unwrap();
        assert_eq!(session.chunk_size(), 10);
    }

    #[tokio::test]
    async fn test_stream_resume_after_ack_is_rejected() {
        let t = Arc::new(MockTransport::default());
        t.fail_chunk(1, vec![TransportError::from_status(400, "bad")]);
        let up = uploader(t, config(4, 1));
        let s1 = up
            .from_stream(std::io::Cursor::new(vec![0u8; 12]), Some(12), context())
            .unwrap();
        assert!(s1.start().await.unwrap().await.is_err());
        let resume = s1.resume_data().unwrap();

        let s2 = up
            .from_resume_data(
                &resume,
                Arc::new(StreamSource::new(std::io::Cursor::new(vec![0u8; 12]), Some(12))),
                context(),
            )
            .unwrap();
        assert!(matches!(
            s2.start().await,
            Err(UploadError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_transaction_mode_with_digest_signer() {
        let transport = Arc::new(MockTransport::default());
        let up = Uploader::new(
            Arc::new(DigestSigner::new(b"secret".to_vec())),
            transport.clone(),
            config(8, 2),
        )
        .unwrap();

        let tx = Transaction::new(
            context().with_tag("Content-Type", "text/plain"),
            b"hello chunked world".to_vec(),
        );
        let session = up.from_transaction(tx).unwrap();
        let receipt = session.start().await.unwrap().await.unwrap();
        assert_eq!(receipt.total_size, 19);
        assert_eq!(receipt.chunk_count, 3);
    }

    #[tokio::test]
    async fn test_file_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        tokio::fs::write(&path, vec![5u8; 25]).await.unwrap();

        let transport = Arc::new(MockTransport::default());
        let up = uploader(transport.clone(), config(10, 2));
        let session = up.from_file(&path, context()).await.unwrap();
        let receipt = session.start().await.unwrap().await.unwrap();
        assert_eq!(receipt.chunk_count, 3);

        assert!(up
            .from_file(dir.path().join("missing.bin"), context())
            .await
            .is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = UploadConfig {
            batch_size: 0,
            ..UploadConfig::default()
        };
        assert!(Uploader::new(
            Arc::new(PassSigner),
            Arc::new(MockTransport::default()),
            cfg
        )
        .is_err());
    }
}
