//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `queue` - 转换队列
//! - 接受并发请求，立即返回完成句柄
//! - 单 worker 串行执行，严格 FIFO
//! - 单个任务失败不影响后续任务
//!
//! ### `lifecycle` - 进程生命周期
//! - 监听终止信号
//! - 依次关闭队列和共享浏览器
//!
//! ## 层次关系
//!
//! ```text
//! orchestrator::queue (处理 Vec<Job>)
//!     ↓
//! services::PageAutomationDriver (处理单个 Job)
//!     ↓
//! services::ResultExtractor / infrastructure::JsExecutor
//!     ↓
//! browser::BrowserSession (共享浏览器)
//! ```

pub mod lifecycle;
pub mod queue;

pub use queue::{ConversionHandle, ConversionQueue};
