//! # audio2text
//!
//! 通过无头浏览器驱动第三方语音转写网页，把音频文件转换成文字
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `browser/` - 共享浏览器会话，首次使用时启动，进程退出时关闭
//! - `infrastructure/` - `JsExecutor` 执行页面脚本，`PageLease` 保证页面被关闭
//!
//! ### ② 业务能力层（Services）
//! - `PageAutomationDriver` - 单个任务的完整页面操作流程
//! - `ResultExtractor` - 判断是否完成、选出最合适的文本
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator/queue` - 并发提交、串行执行的 FIFO 队列
//! - `orchestrator/lifecycle` - 终止信号处理

pub mod app;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use app::App;
pub use browser::BrowserSession;
pub use config::Config;
pub use error::{AppError, AppResult, ConversionError, ErrorKind};
pub use models::{ConversionRequest, ConversionResult, SiteProfile};
pub use orchestrator::{ConversionHandle, ConversionQueue};
pub use services::{Converter, PageAutomationDriver};
