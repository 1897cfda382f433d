//! 转换队列 - 编排层
//!
//! ## 职责
//!
//! - 接受任意数量并发调用方的转换请求，`submit` 立即返回
//! - 同一时刻只有一个任务在使用浏览器，严格按提交顺序执行
//! - 单个任务失败、超时甚至 panic 都不会阻塞后续任务
//!
//! ## 结构
//!
//! ```text
//! submit() ──push──▶ pending (VecDeque) ──pop──▶ 唯一的 worker 任务
//!     │                    ▲                            │
//!     └────notify──────────┘                 Converter::convert
//!                                                       │
//!  ConversionHandle ◀──────────── oneshot ──────────────┘
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ConversionError;
use crate::models::{ConversionRequest, ConversionResult, Job};
use crate::services::Converter;

struct QueueState {
    pending: Mutex<VecDeque<Job>>,
    wake: Notify,
    busy: AtomicBool,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl QueueState {
    fn pending(&self) -> MutexGuard<'_, VecDeque<Job>> {
        // 临界区内不会 panic，中毒时直接取回数据
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 转换队列
///
/// 克隆得到的是同一个队列的句柄
#[derive(Clone)]
pub struct ConversionQueue {
    state: Arc<QueueState>,
}

impl ConversionQueue {
    /// 创建队列并启动唯一的 worker 任务
    ///
    /// 必须在 tokio 运行时内调用
    pub fn start(converter: Arc<dyn Converter>) -> Self {
        let state = Arc::new(QueueState {
            pending: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            busy: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            worker: Mutex::new(None),
        });

        let worker = tokio::spawn(run_worker(state.clone(), converter));
        *state.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker);

        Self { state }
    }

    /// 提交一个转换请求
    ///
    /// 立即返回句柄，不会同步失败；队列已关闭时句柄直接得到"已取消"的结果
    ///
    /// # 参数
    /// - `file_path`: 已保存到本地的音频文件
    /// - `original_filename`: 原始文件名（仅用于日志）
    ///
    /// # 返回
    /// 返回完成句柄，`await` 得到转换结果
    pub fn submit(&self, file_path: impl Into<PathBuf>, original_filename: impl Into<String>) -> ConversionHandle {
        let cancel = self.state.shutdown.child_token();
        let mut pending = self.state.pending();

        // 编号在锁内分配，编号顺序即入队顺序
        let request = ConversionRequest {
            id: self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            file_path: file_path.into(),
            original_filename: original_filename.into(),
        };
        let job_id = request.id;
        let (job, receiver) = Job::new(request, cancel.clone());

        // 与 worker 的退出检查在同一把锁内，关闭后提交的任务不会滞留
        if self.state.shutdown.is_cancelled() {
            drop(pending);
            warn!("{} 队列已关闭，拒绝处理", job.request);
            job.complete(ConversionResult::cancelled());
        } else {
            debug!("{} 已加入队列 (前面还有 {} 个)", job.request, pending.len());
            pending.push_back(job);
            drop(pending);
            self.state.wake.notify_one();
        }

        ConversionHandle {
            job_id,
            cancel,
            receiver,
        }
    }

    /// 排队中（不含正在执行）的任务数
    pub fn pending(&self) -> usize {
        self.state.pending().len()
    }

    /// 是否有任务正在执行
    pub fn is_busy(&self) -> bool {
        self.state.busy.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.shutdown.is_cancelled()
    }

    /// 关闭队列
    ///
    /// 正在执行的任务在下一个等待点收到取消，排队中的任务直接以"已取消"结束。
    /// 等待 worker 退出后返回，可以重复调用。
    pub async fn shutdown(&self) {
        self.state.shutdown.cancel();
        self.state.wake.notify_one();

        let worker = self.state.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            info!("🛑 正在关闭转换队列...");
            if let Err(e) = worker.await {
                error!("队列 worker 异常退出: {}", e);
            }
            info!("✓ 转换队列已关闭");
        }
    }
}

/// 调用方持有的完成句柄
///
/// `await` 得到转换结果；调用 `cancel` 可以取消这个任务
pub struct ConversionHandle {
    job_id: u64,
    cancel: CancellationToken,
    receiver: oneshot::Receiver<ConversionResult>,
}

impl ConversionHandle {
    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    /// 请求取消
    ///
    /// 尚未开始的任务不会再执行；执行中的任务在下一个等待点停止
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Future for ConversionHandle {
    type Output = ConversionResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // 发送端被丢弃只可能发生在 worker 异常退出时
        Pin::new(&mut self.receiver).poll(cx).map(|result| {
            result.unwrap_or_else(|_| {
                ConversionResult::failed(&ConversionError::Aborted("队列 worker 已退出".to_string()), None)
            })
        })
    }
}

enum Next {
    Run(Job, usize),
    Idle,
    Stop,
}

/// 唯一的 worker：取出队首任务执行，完成后立即检查下一个
async fn run_worker(state: Arc<QueueState>, converter: Arc<dyn Converter>) {
    debug!("队列 worker 已启动");
    loop {
        let next = {
            let mut pending = state.pending();
            match pending.pop_front() {
                Some(job) => Next::Run(job, pending.len()),
                None if state.shutdown.is_cancelled() => Next::Stop,
                None => Next::Idle,
            }
        };

        match next {
            Next::Run(job, remaining) => {
                state.busy.store(true, Ordering::SeqCst);
                run_job(&converter, job, remaining).await;
                state.busy.store(false, Ordering::SeqCst);
            }
            Next::Idle => {
                tokio::select! {
                    _ = state.wake.notified() => {}
                    _ = state.shutdown.cancelled() => {}
                }
            }
            Next::Stop => break,
        }
    }
    debug!("队列 worker 已退出");
}

/// 执行单个任务并交付结果
///
/// 转换在独立的 tokio 任务中运行，panic 只会让这一个任务失败
async fn run_job(converter: &Arc<dyn Converter>, job: Job, remaining: usize) {
    let request = job.request.clone();

    if job.cancel.is_cancelled() {
        info!("{} ⏭️ 已取消，跳过", request);
        job.complete(ConversionResult::cancelled());
        return;
    }

    info!(
        "{} ▶️ 开始处理 (排队 {:.1}s，剩余 {} 个)",
        request,
        job.enqueued_at.elapsed().as_secs_f64(),
        remaining
    );

    let started = Instant::now();
    let task = {
        let converter = converter.clone();
        let request = request.clone();
        let cancel = job.cancel.clone();
        tokio::spawn(async move { converter.convert(&request, &cancel).await })
    };

    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{} 任务执行失败: {}", request, e);
            Err(ConversionError::Aborted(e.to_string()))
        }
    };

    let elapsed = started.elapsed();
    let result = match outcome {
        Ok(text) => ConversionResult::succeeded(text, elapsed),
        Err(e) => ConversionResult::failed(&e, Some(elapsed)),
    };

    match result.error() {
        None => info!(
            "{} ✅ 转换成功 ({} 字符，耗时 {:.1}s)",
            request,
            result.text().map_or(0, |t| t.chars().count()),
            elapsed.as_secs_f64()
        ),
        Some(reason) => error!("{} ❌ 转换失败: {}", request, reason),
    }

    if !job.complete(result) {
        warn!("{} 调用方已不再等待结果", request);
    }
}
