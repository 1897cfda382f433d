use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 错误类别
///
/// 供调用方区分"文件有问题"和"稍后再试"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// 输入文件缺失或不可读
    Input,
    /// 页面上找不到预期的控件
    ElementNotFound,
    /// 在最长等待时间内未观察到完成
    Timeout,
    /// 页面报告完成但提取不到可用文本
    Extraction,
    /// 浏览器启动、建页或导航失败
    Resource,
    /// 任务被取消
    Cancelled,
}

impl ErrorKind {
    /// 是否属于调用方（客户端）错误
    pub fn is_client_error(self) -> bool {
        matches!(self, ErrorKind::Input)
    }
}

/// 单个转换任务可能出现的错误
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("音频文件不存在: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("无法读取音频文件 ({}): {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 页面结构可能已变化
    #[error("找不到{what}，已尝试选择器: {}", selectors.join(", "))]
    ElementNotFound {
        what: &'static str,
        selectors: Vec<String>,
    },

    #[error("超时: 在 {}s 内未生成文本，可能文件过大或处理出错", waited.as_secs())]
    Timeout { waited: Duration },

    #[error("结果文本为空，音频可能未被成功处理")]
    EmptyResult,

    #[error("启动无头浏览器失败: {0}")]
    BrowserLaunch(String),

    #[error("创建页面失败: {0}")]
    PageCreation(String),

    #[error("导航到 {url} 失败: {reason}")]
    Navigation { url: String, reason: String },

    #[error("执行脚本失败: {0}")]
    Script(String),

    #[error("转换任务异常终止: {0}")]
    Aborted(String),

    #[error("任务已取消")]
    Cancelled,
}

impl ConversionError {
    /// 返回错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversionError::FileNotFound { .. } | ConversionError::FileUnreadable { .. } => {
                ErrorKind::Input
            }
            ConversionError::ElementNotFound { .. } => ErrorKind::ElementNotFound,
            ConversionError::Timeout { .. } => ErrorKind::Timeout,
            ConversionError::EmptyResult => ErrorKind::Extraction,
            ConversionError::BrowserLaunch(_)
            | ConversionError::PageCreation(_)
            | ConversionError::Navigation { .. }
            | ConversionError::Script(_)
            | ConversionError::Aborted(_) => ErrorKind::Resource,
            ConversionError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// 读取配置文件失败
    #[error("读取配置文件失败 ({}): {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML 解析失败
    #[error("TOML解析失败 ({}): {source}", path.display())]
    TomlParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for ConversionError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ConversionError::Script(err.to_string())
    }
}

impl From<serde_json::Error> for ConversionError {
    fn from(err: serde_json::Error) -> Self {
        ConversionError::Script(format!("JSON解析失败: {}", err))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
