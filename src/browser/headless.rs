use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::ConversionError;

/// 容器环境下需要的启动参数
const LAUNCH_ARGS: [&str; 5] = [
    "--no-sandbox",                    // 禁用沙盒，防止权限问题导致的崩溃
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",         // 防止共享内存不足
    "--disable-accelerated-2d-canvas",
    "--disable-gpu",
];

/// 生成浏览器启动配置
pub fn browser_config(config: &Config) -> Result<BrowserConfig, ConversionError> {
    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport_width, config.viewport_height)
        .request_timeout(config.page_timeout())
        .args(LAUNCH_ARGS.to_vec());

    builder = if config.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };

    if let Some(executable) = &config.chrome_executable {
        builder = builder.chrome_executable(executable);
    }

    builder.build().map_err(|e| {
        error!("配置无头浏览器失败: {}", e);
        ConversionError::BrowserLaunch(e)
    })
}

/// 启动无头浏览器，并在后台处理浏览器事件
///
/// 返回的 `JoinHandle` 结束即表示浏览器连接已断开
pub async fn launch_headless_browser(config: &Config) -> Result<(Browser, JoinHandle<()>), ConversionError> {
    info!("🚀 启动无头浏览器...");
    let browser_config = browser_config(config)?;

    let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
        error!("启动无头浏览器失败: {}", e);
        ConversionError::BrowserLaunch(e.to_string())
    })?;
    debug!("无头浏览器启动成功");

    let events = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
        debug!("浏览器事件循环已结束");
    });

    Ok((browser, events))
}
