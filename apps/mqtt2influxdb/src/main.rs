//! MQTT → InfluxDB 桥接进程入口。

mod bridge;

use clap::Parser;
use m2i_config::AppConfig;
use m2i_telemetry::init_tracing;
use std::path::PathBuf;
use tracing::info;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(author, version, about = "Subscribe to MQTT topics and write mapped records to InfluxDB", long_about = None)]
struct Cli {
    /// 配置文件路径（YAML）
    #[arg(short, long, env = "M2I_CONFIG")]
    config: PathBuf,

    /// 输出 debug 级别日志
    #[arg(short, long)]
    debug: bool,

    /// 仅校验配置后退出
    #[arg(short, long)]
    test: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），M2I_* 变量可在其中覆盖连接参数
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    // 初始化结构化日志
    init_tracing(if cli.debug { "debug" } else { "info" });

    let config = AppConfig::load(&cli.config)?;
    info!(
        target: "m2i.app",
        config = %cli.config.display(),
        points = config.rules.len(),
        "config_loaded"
    );

    if cli.test {
        info!(target: "m2i.app", "config_valid");
        return Ok(());
    }

    bridge::run(config).await
}
