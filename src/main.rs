use std::path::PathBuf;

use anyhow::Result;
use audio2text::utils::logging;
use audio2text::{App, Config};
use clap::Parser;
use serde_json::json;
use tracing::warn;

/// 通过无头浏览器把音频文件转换成文字
#[derive(Parser, Debug)]
#[command(name = "audio2text", version)]
struct Cli {
    /// TOML 配置文件
    #[arg(short, long, env = "AUDIO_TO_TEXT_CONFIG")]
    config: Option<PathBuf>,

    /// 显示详细日志
    #[arg(short, long, env = "VERBOSE_LOGGING")]
    verbose: bool,

    /// 待转换的音频文件
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志（加载配置时的警告也要输出）
    logging::init(cli.verbose);

    // 加载配置
    let config = Config::load(cli.config.as_deref())?;
    logging::log_startup(&config, cli.files.len());

    // 初始化并运行应用
    let app = App::initialize(config).await?;
    let mut hook = app.install_signal_hook();

    let results = tokio::select! {
        results = app.run(&cli.files) => results,
        _ = &mut hook => {
            warn!("程序被终止，未完成的任务已取消");
            std::process::exit(130);
        }
    };
    hook.abort();
    app.shutdown().await;

    let mut failed = 0;
    for (path, result) in &results {
        if !result.success() {
            failed += 1;
        }
        let line = json!({
            "file": path,
            "status": result.http_status(),
            "result": result,
        });
        println!("{}", serde_json::to_string(&line)?);
    }
    logging::print_final_stats(results.len() - failed, failed);

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
