// 上传分片调度器
//
// 功能：
// - 按索引升序读取、签名、发送分片
// - 同时进行中的分片数不超过 batch_size（JoinSet 管理并发任务）
// - 瞬时错误按指数退避重试，重试期间分片缓存在内存中
// - 暂停/恢复/取消（协作式，进行中的分片总是自然结束）
// - 所有分片确认后提交事务，完成事件只触发一次

use crate::error::{UploadError, UploadResult};
use crate::remote::{ChunkAck, TransportError};
use crate::uploader::events::{EventBus, UploadEvent};
use crate::uploader::retry::{RetryDecision, RetryPolicy};
use crate::uploader::task::{SessionInfo, SessionStatus};
use crate::uploader::{
    Chunk, ChunkSigner, ChunkSource, SignedChunk, TransactionContext, TransportClient,
    UploadState, UploadSummary, DEFAULT_BATCH_SIZE,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 上传完成回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// 远端分配的 ID
    pub remote_id: String,
    /// 事务 ID
    pub transaction_id: String,
    /// 总大小
    pub total_size: u64,
    /// 分片数量
    pub chunk_count: u32,
}

/// 调度控制（暂停/恢复/取消）
///
/// 会话和调度任务共享同一个实例，状态变化通过 Notify 唤醒调度循环
#[derive(Debug, Default)]
pub struct SchedulerControl {
    paused: AtomicBool,
    notify: Notify,
    cancel: CancellationToken,
}

impl SchedulerControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// 暂停：不再发起新的分片和重试
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// 恢复
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// 取消：进行中的分片结束后会话以 `Cancelled` 失败
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.notify.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

/// 调度参数
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// 最大并发分片数
    pub batch_size: usize,
    /// 重试策略
    pub policy: RetryPolicy,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            policy: RetryPolicy::default(),
        }
    }
}

/// 待执行的分片任务
enum ChunkJob {
    /// 首次发送（需要签名）
    Fresh(Chunk),
    /// 重试（直接使用缓存的已签名分片）
    Retry(SignedChunk),
}

/// 分片任务结果
enum ChunkOutcome {
    Acked {
        index: u32,
        offset: u64,
        size: u64,
        ack: ChunkAck,
    },
    TransportFailed {
        chunk: SignedChunk,
        error: TransportError,
    },
    SigningFailed {
        index: u32,
        error: UploadError,
    },
}

/// 重试缓存项
struct RetryEntry {
    chunk: SignedChunk,
    ready_at: Instant,
}

/// 单次运行的内部状态
struct RunState {
    retry_cache: HashMap<u32, RetryEntry>,
    /// 读取期间收到暂停/取消而未发出的分片（流式数据无法重新读取）
    parked: HashMap<u32, Chunk>,
    failures: HashMap<u32, u32>,
    fatal: Option<UploadError>,
    started: Instant,
    initial_bytes: u64,
}

impl RunState {
    /// 下一个重试到期时间
    fn next_retry_deadline(&self) -> Option<Instant> {
        self.retry_cache.values().map(|e| e.ready_at).min()
    }

    fn set_fatal(&mut self, err: UploadError) {
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
    }
}

/// 分片调度器
pub struct ChunkScheduler {
    state: Arc<Mutex<UploadState>>,
    source: Arc<dyn ChunkSource>,
    signer: Arc<dyn ChunkSigner>,
    transport: Arc<dyn TransportClient>,
    events: Arc<EventBus>,
    control: Arc<SchedulerControl>,
    info: Arc<Mutex<SessionInfo>>,
    context: TransactionContext,
    options: SchedulerOptions,
    /// 完成守卫（compare_exchange 确保只提交一次）
    is_finalizing: AtomicBool,
}

impl ChunkScheduler {
    pub fn new(
        state: Arc<Mutex<UploadState>>,
        source: Arc<dyn ChunkSource>,
        signer: Arc<dyn ChunkSigner>,
        transport: Arc<dyn TransportClient>,
        events: Arc<EventBus>,
        options: SchedulerOptions,
    ) -> Self {
        let (context, info) = {
            let s = state.lock();
            let info = SessionInfo::new(s.context().id.clone(), s.total_size());
            (s.context().clone(), info)
        };
        Self {
            state,
            source,
            signer,
            transport,
            events,
            control: Arc::new(SchedulerControl::new()),
            info: Arc::new(Mutex::new(info)),
            context,
            options,
            is_finalizing: AtomicBool::new(false),
        }
    }

    /// 使用外部的调度控制
    pub fn with_control(mut self, control: Arc<SchedulerControl>) -> Self {
        self.control = control;
        self
    }

    /// 使用外部的运行信息
    pub fn with_info(mut self, info: Arc<Mutex<SessionInfo>>) -> Self {
        self.info = info;
        self
    }

    pub fn control(&self) -> Arc<SchedulerControl> {
        self.control.clone()
    }

    pub fn info(&self) -> Arc<Mutex<SessionInfo>> {
        self.info.clone()
    }

    /// 运行调度循环，直到完成或失败
    pub async fn run(self) -> UploadResult<UploadReceipt> {
        let batch_size = self.options.batch_size.max(1);
        let mut in_flight: JoinSet<ChunkOutcome> = JoinSet::new();
        let mut run = RunState {
            retry_cache: HashMap::new(),
            parked: HashMap::new(),
            failures: HashMap::new(),
            fatal: None,
            started: Instant::now(),
            initial_bytes: self.state.lock().bytes_acked(),
        };

        {
            let s = self.state.lock();
            info!(
                "开始调度上传: tx={}, 分片数={}, 已确认={}, 并发={}",
                self.context.id,
                s.chunk_count(),
                s.acked_count(),
                batch_size
            );
        }
        {
            let mut info = self.info.lock();
            if info.status == SessionStatus::Idle {
                info.mark_running();
            }
        }

        loop {
            if run.fatal.is_none() && self.control.is_cancelled() {
                info!("上传已取消，等待 {} 个进行中的分片结束", in_flight.len());
                run.fatal = Some(UploadError::Cancelled);
            }

            if in_flight.is_empty() {
                if let Some(err) = run.fatal.take() {
                    return Err(self.fail(err));
                }
                let complete = self.state.lock().is_complete();
                if complete {
                    return self.complete().await;
                }
            }

            if run.fatal.is_none() && !self.control.is_paused() {
                while in_flight.len() < batch_size && !self.dispatch_halted() {
                    match self.next_job(&mut run).await {
                        Ok(Some(job)) if self.dispatch_halted() => {
                            // 读取期间收到暂停或取消，分片放回等待队列
                            self.park_job(&mut run, job);
                            break;
                        }
                        Ok(Some(job)) => self.spawn_job(&mut in_flight, job),
                        Ok(None) => break,
                        Err(e) => {
                            error!("读取分片失败: {}", e);
                            run.set_fatal(e);
                            break;
                        }
                    }
                }
                // 长度未知的数据流可能刚刚读完
                if in_flight.is_empty() {
                    let complete = self.state.lock().is_complete();
                    if complete {
                        continue;
                    }
                }
            }
            if run.fatal.is_some() && in_flight.is_empty() {
                continue;
            }

            let paused = self.control.is_paused();
            let deadline = if run.fatal.is_none() && !paused && in_flight.len() < batch_size {
                run.next_retry_deadline()
            } else {
                None
            };
            let fatal_pending = run.fatal.is_some();

            tokio::select! {
                Some(joined) = in_flight.join_next() => match joined {
                    Ok(outcome) => self.handle_outcome(&mut run, outcome),
                    Err(e) => {
                        error!("分片任务异常退出: {}", e);
                        run.set_fatal(UploadError::Io(format!("分片任务异常退出: {}", e)));
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {}
                _ = self.control.notified() => {}
                _ = self.control.cancel.cancelled(), if !fatal_pending => {}
            }
        }
    }

    /// 取出下一个可发送的分片
    ///
    /// 优先按索引升序选择等待中的分片（跳过尚未到重试时间的分片），
    /// 长度未知的数据流没有等待分片时继续向后读取
    async fn next_job(&self, run: &mut RunState) -> UploadResult<Option<ChunkJob>> {
        let now = Instant::now();
        let picked = {
            let mut state = self.state.lock();
            let retry_cache = &run.retry_cache;
            let index = state.next_pending(|i| {
                retry_cache
                    .get(&i)
                    .map_or(true, |entry| entry.ready_at <= now)
            });
            if let Some(index) = index {
                state.mark_in_flight(index);
                Some((index, state.chunk_range(index)))
            } else if !state.size_known() {
                None
            } else {
                return Ok(None);
            }
        };

        match picked {
            Some((index, range)) => {
                if let Some(entry) = run.retry_cache.remove(&index) {
                    debug!("[分片#{}] 重新发送缓存的分片", index);
                    return Ok(Some(ChunkJob::Retry(entry.chunk)));
                }
                if let Some(chunk) = run.parked.remove(&index) {
                    return Ok(Some(ChunkJob::Fresh(chunk)));
                }
                let len = (range.end - range.start) as u32;
                match self.source.read(range.start, len).await {
                    Ok(data) => Ok(Some(ChunkJob::Fresh(Chunk::new(index, range.start, data)))),
                    Err(e) => {
                        self.state.lock().mark_failed(index);
                        Err(e)
                    }
                }
            }
            None => self.next_streamed_job().await,
        }
    }

    /// 从长度未知的数据流读取下一个分片
    async fn next_streamed_job(&self) -> UploadResult<Option<ChunkJob>> {
        let (offset, chunk_size) = {
            let state = self.state.lock();
            (state.total_size(), state.chunk_size())
        };
        let data = self.source.read(offset, chunk_size).await?;
        if data.is_empty() {
            self.state.lock().finish_stream();
            return Ok(None);
        }
        let index = self.state.lock().append_streamed_chunk(data.len() as u32)?;
        Ok(Some(ChunkJob::Fresh(Chunk::new(index, offset, data))))
    }

    /// 是否应停止发起新的分片
    fn dispatch_halted(&self) -> bool {
        self.control.is_paused() || self.control.is_cancelled()
    }

    /// 已取出但未发出的分片放回等待状态
    fn park_job(&self, run: &mut RunState, job: ChunkJob) {
        match job {
            ChunkJob::Fresh(chunk) => {
                debug!("[分片#{}] 暂停，分片暂存", chunk.index);
                self.state.lock().mark_pending(chunk.index);
                run.parked.insert(chunk.index, chunk);
            }
            ChunkJob::Retry(chunk) => {
                self.state.lock().mark_pending(chunk.index);
                run.retry_cache.insert(
                    chunk.index,
                    RetryEntry {
                        chunk,
                        ready_at: Instant::now(),
                    },
                );
            }
        }
    }

    fn spawn_job(&self, in_flight: &mut JoinSet<ChunkOutcome>, job: ChunkJob) {
        let signer = self.signer.clone();
        let transport = self.transport.clone();
        let context = self.context.clone();
        in_flight.spawn(execute_job(job, signer, transport, context));
    }

    /// 处理分片任务结果
    fn handle_outcome(&self, run: &mut RunState, outcome: ChunkOutcome) {
        match outcome {
            ChunkOutcome::Acked {
                index,
                offset,
                size,
                ack,
            } => {
                let (first, total_uploaded) = {
                    let mut state = self.state.lock();
                    let first = state.mark_acked(index);
                    (first, state.bytes_acked())
                };
                run.retry_cache.remove(&index);
                if first {
                    debug!(
                        "[分片#{}] ✓ 上传成功: status={}, 已上传 {} bytes",
                        index, ack.status_code, total_uploaded
                    );
                    self.record_progress(run);
                    self.events.emit(&UploadEvent::ChunkUpload {
                        index,
                        offset,
                        size,
                        total_uploaded,
                    });
                }
            }
            ChunkOutcome::TransportFailed { chunk, error } => {
                let index = chunk.index;
                let attempt = {
                    let count = run.failures.entry(index).or_insert(0);
                    *count += 1;
                    *count
                };
                self.events.emit(&UploadEvent::ChunkError {
                    index,
                    status_code: error.status_code,
                    message: error.message.clone(),
                    attempt,
                });

                match self.options.policy.decide(attempt, &error) {
                    RetryDecision::Backoff(delay) => {
                        warn!(
                            "[分片#{}] 上传失败（第 {} 次）: {}，{}ms 后重试",
                            index,
                            attempt,
                            error,
                            delay.as_millis()
                        );
                        self.state.lock().mark_pending(index);
                        run.retry_cache.insert(
                            index,
                            RetryEntry {
                                chunk,
                                ready_at: Instant::now() + delay,
                            },
                        );
                    }
                    RetryDecision::Immediate => {
                        warn!(
                            "[分片#{}] 上传失败（第 {} 次）: {}，立即重试",
                            index, attempt, error
                        );
                        self.state.lock().mark_pending(index);
                        run.retry_cache.insert(
                            index,
                            RetryEntry {
                                chunk,
                                ready_at: Instant::now(),
                            },
                        );
                    }
                    RetryDecision::GiveUp => {
                        error!(
                            "[分片#{}] ❌ 上传失败（第 {} 次），放弃: {}",
                            index, attempt, error
                        );
                        self.state.lock().mark_failed(index);
                        run.set_fatal(UploadError::Transport(error));
                    }
                }
            }
            ChunkOutcome::SigningFailed { index, error } => {
                error!("[分片#{}] ❌ 签名失败: {}", index, error);
                self.state.lock().mark_failed(index);
                run.set_fatal(error);
            }
        }
    }

    /// 更新运行信息（进度、速度）
    fn record_progress(&self, run: &RunState) {
        let (bytes, acked, count, total) = {
            let s = self.state.lock();
            (s.bytes_acked(), s.acked_count(), s.chunk_count(), s.total_size())
        };
        let elapsed = run.started.elapsed().as_secs_f64();
        let mut info = self.info.lock();
        info.uploaded_size = bytes;
        info.completed_chunks = acked;
        info.total_chunks = count;
        info.total_size = total;
        if elapsed > 0.0 {
            info.speed = (bytes.saturating_sub(run.initial_bytes) as f64 / elapsed) as u64;
        }
    }

    /// 所有分片已确认：提交事务并发布完成事件
    async fn complete(&self) -> UploadResult<UploadReceipt> {
        if self
            .is_finalizing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(UploadError::config("上传已经提交过"));
        }

        let summary = {
            let s = self.state.lock();
            UploadSummary {
                total_size: s.total_size(),
                chunk_size: s.chunk_size(),
                chunk_count: s.chunk_count(),
            }
        };
        info!(
            "🔥 所有分片已确认，提交事务: tx={}, 总大小={} bytes, 分片数={}",
            self.context.id, summary.total_size, summary.chunk_count
        );

        let remote_id = match self.finalize_with_retry(&summary).await {
            Ok(id) => id,
            Err(e) => return Err(self.fail(e)),
        };

        {
            let mut info = self.info.lock();
            info.total_size = summary.total_size;
            info.total_chunks = summary.chunk_count;
            info.completed_chunks = summary.chunk_count;
            info.mark_completed(remote_id.clone());
        }
        info!("✅ 上传完成: tx={}, remote_id={}", self.context.id, remote_id);
        self.events.emit(&UploadEvent::Done {
            remote_id: remote_id.clone(),
        });

        Ok(UploadReceipt {
            remote_id,
            transaction_id: self.context.id.clone(),
            total_size: summary.total_size,
            chunk_count: summary.chunk_count,
        })
    }

    /// 提交事务（瞬时错误按同一策略重试）
    async fn finalize_with_retry(&self, summary: &UploadSummary) -> UploadResult<String> {
        let mut failures = 0u32;
        loop {
            match self.transport.finalize(&self.context, summary).await {
                Ok(id) => return Ok(id),
                Err(e) => {
                    failures += 1;
                    match self.options.policy.decide(failures, &e) {
                        RetryDecision::Backoff(delay) => {
                            warn!(
                                "提交事务失败（第 {} 次）: {}，{}ms 后重试",
                                failures,
                                e,
                                delay.as_millis()
                            );
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = self.control.cancel.cancelled() => {
                                    warn!("提交事务等待重试期间上传被取消");
                                    return Err(UploadError::Cancelled);
                                }
                            }
                        }
                        RetryDecision::Immediate => {
                            warn!("提交事务失败（第 {} 次）: {}，立即重试", failures, e);
                            if self.control.is_cancelled() {
                                return Err(UploadError::Cancelled);
                            }
                        }
                        RetryDecision::GiveUp => {
                            error!("提交事务失败，放弃: {}", e);
                            return Err(UploadError::Transport(e));
                        }
                    }
                }
            }
        }
    }

    fn fail(&self, err: UploadError) -> UploadError {
        error!("上传失败: tx={}, 错误: {}", self.context.id, err);
        self.info.lock().mark_failed(err.to_string());
        err
    }
}

/// 执行单个分片任务：签名（阻塞线程池）后发送
async fn execute_job(
    job: ChunkJob,
    signer: Arc<dyn ChunkSigner>,
    transport: Arc<dyn TransportClient>,
    context: TransactionContext,
) -> ChunkOutcome {
    let signed = match job {
        ChunkJob::Retry(signed) => signed,
        ChunkJob::Fresh(chunk) => {
            let index = chunk.index;
            let ctx = context.clone();
            match tokio::task::spawn_blocking(move || signer.sign(chunk, &ctx)).await {
                Ok(Ok(signed)) => signed,
                Ok(Err(error)) => return ChunkOutcome::SigningFailed { index, error },
                Err(e) => {
                    return ChunkOutcome::SigningFailed {
                        index,
                        error: UploadError::Signing(format!("签名任务异常退出: {}", e)),
                    }
                }
            }
        }
    };

    debug!(
        "[分片#{}] 发送: offset={}, size={}",
        signed.index,
        signed.offset,
        signed.size()
    );
    match transport.send(&signed, &context).await {
        Ok(ack) => ChunkOutcome::Acked {
            index: signed.index,
            offset: signed.offset,
            size: signed.size(),
            ack,
        },
        Err(error) => ChunkOutcome::TransportFailed {
            chunk: signed,
            error,
        },
    }
}
