//! 页面租约
//!
//! 保证任务打开的 page 一定会被关闭：正常路径调用 `release`，
//! 任务被中途丢弃（panic、abort）时由 Drop 在后台关闭。

use chromiumoxide::Page;
use tracing::{debug, warn};

pub struct PageLease {
    page: Page,
    released: bool,
}

impl PageLease {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            released: false,
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 关闭页面（浏览器保留复用）
    pub async fn release(mut self) {
        self.released = true;
        // Page 内部为 Arc，关闭克隆即关闭同一个页面
        match self.page.clone().close().await {
            Ok(()) => debug!("页面已关闭"),
            Err(e) => warn!("关闭页面失败: {}", e),
        }
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            warn!("页面未正常释放，在后台关闭");
            let page = self.page.clone();
            runtime.spawn(async move {
                let _ = page.close().await;
            });
        }
    }
}
