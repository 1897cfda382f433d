//! 应用组合根
//!
//! 创建并持有共享浏览器、页面驱动和转换队列

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::info;

use crate::browser::BrowserSession;
use crate::config::Config;
use crate::error::AppResult;
use crate::models::ConversionResult;
use crate::orchestrator::{lifecycle, ConversionQueue};
use crate::services::PageAutomationDriver;

/// 应用主结构
pub struct App {
    session: Arc<BrowserSession>,
    queue: ConversionQueue,
}

impl App {
    /// 初始化应用
    ///
    /// 浏览器在第一个任务开始时才启动
    pub async fn initialize(config: Config) -> AppResult<Self> {
        config.validate()?;

        let session = Arc::new(BrowserSession::new(config.clone()));
        let driver = PageAutomationDriver::new(session.clone(), config);
        let queue = ConversionQueue::start(Arc::new(driver));

        info!("✓ 转换队列已就绪");
        Ok(Self { session, queue })
    }

    pub fn session(&self) -> &Arc<BrowserSession> {
        &self.session
    }

    /// 注册终止信号处理
    pub fn install_signal_hook(&self) -> JoinHandle<()> {
        lifecycle::install(self.queue.clone(), self.session.clone())
    }

    /// 同时提交所有文件，按提交顺序返回结果
    ///
    /// # 参数
    /// - `files`: 待转换的音频文件
    ///
    /// # 返回
    /// 返回 (文件路径, 转换结果) 列表，顺序与 `files` 一致
    pub async fn run(&self, files: &[PathBuf]) -> Vec<(PathBuf, ConversionResult)> {
        let handles: Vec<_> = files
            .iter()
            .map(|path| self.queue.submit(path.clone(), display_name(path)))
            .collect();
        info!("📋 已提交 {} 个文件", handles.len());

        let results = join_all(handles).await;
        files.iter().cloned().zip(results).collect()
    }

    /// 关闭队列和浏览器
    pub async fn shutdown(&self) {
        lifecycle::shutdown_all(&self.queue, &self.session).await;
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
