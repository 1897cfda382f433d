//! 日志工具模块
//!
//! 提供日志初始化和输出的辅助函数

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化日志
///
/// `RUST_LOG` 优先；未设置时根据 `verbose` 选择 debug 或 info
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // 测试中可能被多次调用，忽略重复初始化
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config, file_count: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 音频转文字队列模式");
    info!("启动时间: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    info!("🌐 目标地址: {}", config.target_url);
    info!(
        "⏱️ 最长等待: {}s / 轮询间隔: {}ms",
        config.max_wait_secs, config.poll_interval_ms
    );
    info!("📄 待处理文件: {}", file_count);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(success: usize, failed: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!("完成时间: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    info!("✅ 成功: {}/{}", success, success + failed);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 保留的最大字符数（按字符而不是字节计算）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_counts_chars_not_bytes() {
        assert_eq!(truncate_text("xin chào các bạn", 8), "xin chào...");
        assert_eq!(truncate_text("短文本", 10), "短文本");
    }
}
