//! 进程生命周期钩子
//!
//! 收到终止信号时先关闭队列，再关闭共享浏览器，避免浏览器进程残留。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::orchestrator::queue::ConversionQueue;

/// 等待队列中正在执行的任务响应取消的最长时间
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// 等待 Ctrl+C / SIGTERM / SIGINT / SIGHUP
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("无法监听 Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
            signal(SignalKind::hangup()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint), Ok(mut sighup)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("收到 SIGTERM"),
                    _ = sigint.recv() => info!("收到 SIGINT"),
                    _ = sighup.recv() => info!("收到 SIGHUP"),
                }
            }
            _ => {
                warn!("无法注册 Unix 信号处理，仅监听 Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到 Ctrl+C"),
        _ = terminate => {}
    }
}

/// 关闭队列和浏览器
///
/// 队列在 `DRAIN_TIMEOUT` 内未退出时不再等待，浏览器总会被关闭
pub async fn shutdown_all(queue: &ConversionQueue, session: &BrowserSession) {
    if timeout(DRAIN_TIMEOUT, queue.shutdown()).await.is_err() {
        warn!("⚠️ 队列在 {}s 内未退出，直接关闭浏览器", DRAIN_TIMEOUT.as_secs());
    }
    session.shutdown().await;
}

/// 注册终止信号处理
///
/// 返回的任务在收到信号并完成清理后结束
pub fn install(queue: ConversionQueue, session: Arc<BrowserSession>) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("🛑 收到终止信号，开始清理");
        shutdown_all(&queue, &session).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::{ConversionError, ErrorKind};
    use crate::models::ConversionRequest;
    use crate::services::Converter;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct WaitsForCancel;

    #[async_trait]
    impl Converter for WaitsForCancel {
        async fn convert(
            &self,
            _request: &ConversionRequest,
            cancel: &CancellationToken,
        ) -> Result<String, ConversionError> {
            cancel.cancelled().await;
            Err(ConversionError::Cancelled)
        }
    }

    #[tokio::test]
    async fn test_shutdown_all_cancels_in_flight_and_queued_jobs() {
        let session = Arc::new(BrowserSession::new(Config::default()));
        let queue = ConversionQueue::start(Arc::new(WaitsForCancel));

        let running = queue.submit("/tmp/1.mp3", "1.mp3");
        let queued = queue.submit("/tmp/2.mp3", "2.mp3");

        shutdown_all(&queue, &session).await;

        assert_eq!(running.await.error_kind(), Some(ErrorKind::Cancelled));
        assert_eq!(queued.await.error_kind(), Some(ErrorKind::Cancelled));
        assert!(!session.is_live().await);

        // 重复清理不会出错
        shutdown_all(&queue, &session).await;
    }

    #[tokio::test]
    async fn test_installed_hook_does_not_fire_without_signal() {
        let session = Arc::new(BrowserSession::new(Config::default()));
        let queue = ConversionQueue::start(Arc::new(WaitsForCancel));

        let hook = install(queue.clone(), session.clone());
        tokio::task::yield_now().await;
        assert!(!hook.is_finished());
        assert!(!queue.is_shut_down());

        hook.abort();
        shutdown_all(&queue, &session).await;
    }
}
