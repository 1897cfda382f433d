//! 页面自动化驱动 - 业务能力层
//!
//! 在共享浏览器里为单个任务打开独立页面，完成一次完整的转换：
//!
//! ```text
//! 校验文件 → 打开页面 → 导航 → 点击上传 → 提交文件 → 轮询完成 → 提取文本
//!                                                         ↓
//!                                             无论成功失败都关闭页面
//! ```
//!
//! 每个等待点都有各自的超时，并观察任务的取消令牌。

use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::LoaderId;
use chromiumoxide::cdp::browser_protocol::page::{
    EventLifecycleEvent, Frame, FrameId, GetFrameTreeParams, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::element::Element;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::config::Config;
use crate::error::ConversionError;
use crate::infrastructure::{JsExecutor, PageLease};
use crate::models::ConversionRequest;
use crate::services::converter::Converter;
use crate::services::extractor::{PageSnapshot, ResultExtractor};
use crate::utils::logging::truncate_text;
use crate::utils::poll::{cancellable_sleep, poll_until, PollError};

/// 与 `networkidle2` 相同：连接数降到两个以下并保持 500ms
const NETWORK_SETTLED_EVENTS: [&str; 2] = ["networkAlmostIdle", "networkIdle"];

/// 页面自动化驱动
///
/// 职责：
/// - 只处理单个任务
/// - 不关心排队顺序（由队列保证同一时刻只有一个任务）
/// - 不持有浏览器，只从 `BrowserSession` 借用页面
pub struct PageAutomationDriver {
    session: Arc<BrowserSession>,
    config: Config,
    extractor: ResultExtractor,
}

impl PageAutomationDriver {
    pub fn new(session: Arc<BrowserSession>, config: Config) -> Self {
        let extractor = ResultExtractor::new(&config.site, config.min_text_len);
        Self {
            session,
            config,
            extractor,
        }
    }

    /// 打开页面之后的全部步骤
    async fn drive(
        &self,
        page: &Page,
        file_path: &Path,
        request: &ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ConversionError> {
        let executor = JsExecutor::new(page.clone());

        self.set_viewport(page, cancel).await?;
        self.navigate(page, request, cancel).await?;

        info!("{} 🔍 正在查找上传按钮...", request);
        let trigger = self
            .find_element(page, &self.config.site.upload_trigger, "上传按钮", cancel)
            .await?;
        self.bounded(cancel, "点击上传按钮", trigger.click()).await?;
        if !cancellable_sleep(self.config.upload_dialog_delay(), cancel).await {
            return Err(ConversionError::Cancelled);
        }

        let input = self
            .find_element(page, &self.config.site.file_input, "文件输入框", cancel)
            .await?;
        self.attach_file(page, &input, file_path, cancel).await?;
        info!("{} 📤 文件已上传，等待生成文本...", request);

        self.wait_for_transcript(&executor, cancel).await?;

        info!("{} 📝 正在提取文本...", request);
        let snapshot = self.read_snapshot(&executor, cancel).await?;
        self.extractor.extract(&snapshot)
    }

    async fn set_viewport(&self, page: &Page, cancel: &CancellationToken) -> Result<(), ConversionError> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(self.config.viewport_width))
            .height(i64::from(self.config.viewport_height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(ConversionError::Script)?;
        self.bounded(cancel, "设置视口", page.execute(params)).await?;
        Ok(())
    }

    /// 打开目标地址，等待网络空闲后再留出前端渲染时间
    async fn navigate(
        &self,
        page: &Page,
        request: &ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ConversionError> {
        let url = self.config.target_url.as_str();
        info!("{} 🌐 正在打开 {}", request, url);

        let navigation_failed = |reason: String| ConversionError::Navigation {
            url: url.to_string(),
            reason,
        };

        // 先订阅再导航，导航期间的生命周期事件都会留在事件流里
        let mut lifecycle = self
            .bounded(cancel, "订阅页面事件", page.event_listener::<EventLifecycleEvent>())
            .await?;
        self.bounded(
            cancel,
            "启用生命周期事件",
            page.execute(SetLifecycleEventsEnabledParams::new(true)),
        )
        .await?;

        self.bounded(cancel, "页面导航", page.goto(url))
            .await
            .map_err(|e| match e {
                ConversionError::Script(reason) => navigation_failed(reason),
                other => other,
            })?;

        // 只认当前文档的事件，about:blank 遗留的事件不算
        let document = self
            .bounded(cancel, "读取页面框架", page.execute(GetFrameTreeParams::default()))
            .await?
            .result
            .frame_tree
            .frame;

        let settled = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConversionError::Cancelled),
            settled = timeout(self.config.page_timeout(), wait_network_idle(&mut lifecycle, &document)) => settled,
        };
        match settled {
            Ok(true) => debug!("页面网络已空闲"),
            Ok(false) => return Err(navigation_failed("页面事件流已关闭".to_string())),
            Err(_) => {
                return Err(navigation_failed(format!(
                    "{}s 内网络未空闲",
                    self.config.page_timeout_secs
                )))
            }
        }

        if !cancellable_sleep(self.config.settle_delay(), cancel).await {
            return Err(ConversionError::Cancelled);
        }
        Ok(())
    }

    /// 按优先级依次尝试候选选择器，找不到时在限定时间内重试
    async fn find_element(
        &self,
        page: &Page,
        selectors: &[String],
        what: &'static str,
        cancel: &CancellationToken,
    ) -> Result<Element, ConversionError> {
        let budget = self.config.element_wait();
        let deadline = Instant::now() + budget;
        let found = poll_until(self.config.element_poll(), budget, cancel, || async move {
            for selector in selectors {
                // 每个选择器只能用剩余的时间
                let per_try = deadline.saturating_duration_since(Instant::now());
                match timeout(per_try, page.find_element(selector.as_str())).await {
                    Ok(Ok(element)) => {
                        info!("✓ 找到{}: {}", what, selector);
                        return Ok::<_, Infallible>(Some(element));
                    }
                    Ok(Err(e)) => debug!("选择器 {} 未命中: {}", selector, e),
                    Err(_) => debug!("选择器 {} 查找超时", selector),
                }
            }
            Ok(None)
        })
        .await;

        match found {
            Ok(element) => Ok(element),
            Err(PollError::TimedOut { .. }) => {
                warn!("⚠️ 找不到{}，页面结构可能已变化", what);
                Err(ConversionError::ElementNotFound {
                    what,
                    selectors: selectors.to_vec(),
                })
            }
            Err(PollError::Cancelled) => Err(ConversionError::Cancelled),
            Err(PollError::Probe(never)) => match never {},
        }
    }

    /// 把本地文件挂到文件输入框上
    async fn attach_file(
        &self,
        page: &Page,
        input: &Element,
        file_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ConversionError> {
        let params = SetFileInputFilesParams::builder()
            .files(vec![file_path.to_string_lossy().into_owned()])
            .backend_node_id(input.backend_node_id.clone())
            .build()
            .map_err(ConversionError::Script)?;
        self.bounded(cancel, "上传文件", page.execute(params)).await?;
        Ok(())
    }

    /// 轮询结果区域，直到出现有效文本或超时
    async fn wait_for_transcript(
        &self,
        executor: &JsExecutor,
        cancel: &CancellationToken,
    ) -> Result<(), ConversionError> {
        let script = self.config.site.snapshot_script();
        let script = script.as_str();
        let extractor = &self.extractor;
        let per_probe = self.config.page_timeout();

        let ready = poll_until(self.config.poll_interval(), self.config.max_wait(), cancel, || async move {
            // 页面处理过程中脚本偶尔失败，视为尚未完成
            let ready = match timeout(per_probe, executor.eval_as::<PageSnapshot>(script)).await {
                Ok(Ok(snapshot)) => extractor.is_ready(&snapshot),
                Ok(Err(e)) => {
                    debug!("读取结果区域失败: {}", e);
                    false
                }
                Err(_) => {
                    debug!("读取结果区域超时");
                    false
                }
            };
            Ok::<_, Infallible>(ready.then_some(()))
        })
        .await;

        match ready {
            Ok(()) => Ok(()),
            Err(PollError::TimedOut { waited }) => Err(ConversionError::Timeout { waited }),
            Err(PollError::Cancelled) => Err(ConversionError::Cancelled),
            Err(PollError::Probe(never)) => match never {},
        }
    }

    async fn read_snapshot(
        &self,
        executor: &JsExecutor,
        cancel: &CancellationToken,
    ) -> Result<PageSnapshot, ConversionError> {
        let script = self.config.site.snapshot_script();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConversionError::Cancelled),
            result = timeout(self.config.page_timeout(), executor.eval_as::<PageSnapshot>(script)) => {
                result.map_err(|_| ConversionError::Script("读取结果区域超时".to_string()))?
            }
        }
    }

    /// 给单次页面操作加上默认超时和取消
    async fn bounded<T, E, F>(&self, cancel: &CancellationToken, what: &str, op: F) -> Result<T, ConversionError>
    where
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConversionError::Cancelled),
            result = timeout(self.config.page_timeout(), op) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(ConversionError::Script(format!("{}失败: {}", what, e))),
                Err(_) => Err(ConversionError::Script(format!(
                    "{}超时 ({}s)",
                    what, self.config.page_timeout_secs
                ))),
            },
        }
    }
}

#[async_trait]
impl Converter for PageAutomationDriver {
    async fn convert(
        &self,
        request: &ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ConversionError> {
        // 文件不存在时不启动浏览器
        let file_path = validate_input(&request.file_path).await?;

        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConversionError::Cancelled),
            page = self.session.acquire() => page?,
        };
        let lease = PageLease::new(page);

        let outcome = self.drive(lease.page(), &file_path, request, cancel).await;
        lease.release().await;

        if let Ok(text) = &outcome {
            debug!("{} 文本预览: {}", request, truncate_text(text, 80));
        }
        outcome
    }
}

/// 事件是否表示指定文档的网络已空闲
fn is_network_settled(event: &EventLifecycleEvent, frame_id: &FrameId, loader_id: &LoaderId) -> bool {
    event.frame_id == *frame_id
        && event.loader_id == *loader_id
        && NETWORK_SETTLED_EVENTS.contains(&event.name.as_str())
}

/// 等到当前文档的网络空闲事件；事件流结束时返回 `false`
async fn wait_network_idle(events: &mut EventStream<EventLifecycleEvent>, document: &Frame) -> bool {
    while let Some(event) = events.next().await {
        if is_network_settled(&event, &document.id, &document.loader_id) {
            return true;
        }
    }
    false
}

/// 确认文件存在且可读，返回绝对路径
async fn validate_input(path: &Path) -> Result<PathBuf, ConversionError> {
    let metadata = tokio::fs::metadata(path).await.map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConversionError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConversionError::FileUnreadable {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    if !metadata.is_file() {
        return Err(ConversionError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let unreadable = |source| ConversionError::FileUnreadable {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::File::open(path).await.map_err(unreadable)?;
    tokio::fs::canonicalize(path).await.map_err(unreadable)
}
