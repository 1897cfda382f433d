//! 共享浏览器会话 - 基础设施层
//!
//! 整个进程只持有一个浏览器实例，首次使用时才启动。
//! 每个任务从这里拿到自己独立的 Page，用完自行关闭，浏览器保留复用。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chromiumoxide::{Browser, Page};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::browser::headless;
use crate::config::Config;
use crate::error::ConversionError;

/// 关闭浏览器时等待进程退出的最长时间
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

struct LiveBrowser {
    browser: Browser,
    events: JoinHandle<()>,
}

impl LiveBrowser {
    fn is_alive(&self) -> bool {
        !self.events.is_finished()
    }

    async fn dispose(mut self) {
        match timeout(CLOSE_TIMEOUT, self.browser.close()).await {
            Ok(Ok(_)) => {
                if timeout(CLOSE_TIMEOUT, self.browser.wait()).await.is_err() {
                    warn!("等待浏览器进程退出超时，强制结束");
                    let _ = self.browser.kill().await;
                }
            }
            Ok(Err(e)) => {
                warn!("关闭浏览器失败: {}，强制结束", e);
                let _ = self.browser.kill().await;
            }
            Err(_) => {
                warn!("关闭浏览器超时，强制结束");
                let _ = self.browser.kill().await;
            }
        }
        self.events.abort();
    }
}

/// 共享浏览器会话
///
/// 由组合根创建并以 `Arc<BrowserSession>` 注入使用方。
/// 内部的 Mutex 同时充当启动锁，并发调用 `acquire` 也不会启动两个浏览器。
pub struct BrowserSession {
    config: Config,
    live: Mutex<Option<LiveBrowser>>,
    launches: AtomicUsize,
}

impl BrowserSession {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            live: Mutex::new(None),
            launches: AtomicUsize::new(0),
        }
    }

    /// 获取一个新的独立页面，必要时先启动浏览器
    ///
    /// 如果浏览器已经崩溃（事件循环结束），丢弃旧实例并重新启动
    ///
    /// # 返回
    /// 返回停在 about:blank 的新页面，由调用方负责关闭
    pub async fn acquire(&self) -> Result<Page, ConversionError> {
        let mut guard = self.live.lock().await;

        let live = match guard.take() {
            Some(live) if live.is_alive() => live,
            Some(dead) => {
                warn!("⚠️ 浏览器连接已断开，重新启动");
                dead.dispose().await;
                self.launch().await?
            }
            None => self.launch().await?,
        };

        let page = timeout(self.config.page_timeout(), live.browser.new_page("about:blank")).await;
        *guard = Some(live);

        match page {
            Ok(Ok(page)) => {
                debug!("已创建新页面");
                Ok(page)
            }
            Ok(Err(e)) => Err(ConversionError::PageCreation(e.to_string())),
            Err(_) => Err(ConversionError::PageCreation(format!(
                "{}s 内未能创建页面",
                self.config.page_timeout_secs
            ))),
        }
    }

    async fn launch(&self) -> Result<LiveBrowser, ConversionError> {
        let (browser, events) = headless::launch_headless_browser(&self.config).await?;
        let count = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        info!("✅ 无头浏览器已就绪 (第 {} 次启动)", count);
        Ok(LiveBrowser { browser, events })
    }

    /// 关闭浏览器
    ///
    /// 没有浏览器时什么也不做，可以重复调用
    pub async fn shutdown(&self) {
        let live = self.live.lock().await.take();
        match live {
            Some(live) => {
                if let Ok(pages) = live.browser.pages().await {
                    debug!("关闭前仍有 {} 个页面", pages.len());
                }
                info!("🛑 正在关闭无头浏览器...");
                live.dispose().await;
                info!("✓ 无头浏览器已关闭");
            }
            None => debug!("没有运行中的浏览器，无需关闭"),
        }
    }

    /// 当前是否持有可用的浏览器
    pub async fn is_live(&self) -> bool {
        self.live
            .lock()
            .await
            .as_ref()
            .is_some_and(LiveBrowser::is_alive)
    }

    /// 浏览器当前打开的页面数，没有浏览器时为 0
    pub async fn page_count(&self) -> Result<usize, ConversionError> {
        let guard = self.live.lock().await;
        match guard.as_ref() {
            Some(live) => Ok(live.browser.pages().await?.len()),
            None => Ok(0),
        }
    }

    /// 成功启动浏览器的次数
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}
