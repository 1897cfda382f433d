//! 转换能力的抽象
//!
//! 队列只依赖这个 trait，测试中可以替换成不启动浏览器的实现

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ConversionError;
use crate::models::ConversionRequest;

/// 把一个音频文件转换成文本
#[async_trait]
pub trait Converter: Send + Sync {
    /// 执行一次转换
    ///
    /// 每个等待点都应观察 `cancel`，被取消时返回 `ConversionError::Cancelled`
    async fn convert(
        &self,
        request: &ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ConversionError>;
}
