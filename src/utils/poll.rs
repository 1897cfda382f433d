//! 通用轮询工具
//!
//! 外部页面不提供完成事件，只能反复检查 DOM 状态。
//! 页面加载、控件查找、完成检测都用同一个 `poll_until`。

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// 轮询失败的原因
#[derive(Debug, Error)]
pub enum PollError<E> {
    #[error("轮询超时 ({}ms)", waited.as_millis())]
    TimedOut { waited: Duration },

    #[error("轮询被取消")]
    Cancelled,

    #[error("{0}")]
    Probe(E),
}

/// 反复执行 `probe` 直到返回 `Some`
///
/// - 立即检查一次，之后每隔 `interval` 检查一次
/// - 超过 `timeout` 后返回 `TimedOut`，最后一次检查恰好发生在截止时刻
/// - 单次检查跨过截止时刻时直接放弃这次检查并返回 `TimedOut`
/// - `cancel` 被触发时返回 `Cancelled`
/// - `probe` 返回错误时立即停止
///
/// # 参数
/// - `interval`: 两次检查之间的间隔
/// - `timeout`: 从开始计算的总时长上限
/// - `cancel`: 取消令牌
/// - `probe`: 检查函数，`Ok(None)` 表示尚未就绪
///
/// # 返回
/// 返回第一次就绪时得到的值
pub async fn poll_until<T, E, F, Fut>(
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let started = Instant::now();
    let deadline = started + timeout;

    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            outcome = probe() => outcome,
            _ = sleep_until(deadline) => {
                return Err(PollError::TimedOut {
                    waited: started.elapsed(),
                })
            }
        };

        if let Some(value) = outcome.map_err(PollError::Probe)? {
            return Ok(value);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(PollError::TimedOut {
                waited: now - started,
            });
        }

        let pause = interval.min(deadline - now);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = sleep(pause) => {}
        }
    }
}

/// 可被取消的等待
///
/// 返回 `false` 表示等待期间被取消
pub async fn cancellable_sleep(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}
