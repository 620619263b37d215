//! `spark-server`：向每个连接的客户端每秒推送一条带时间戳的问候语。

use clap::Parser;
use spark_heartbeat::{
    HeartbeatConfig, HeartbeatError, HeartbeatServer, ServerOverrides, shutdown, telemetry,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "spark-server")]
#[command(about = "Stream timestamped heartbeats to every connected TCP client")]
#[command(version)]
struct Cli {
    /// TOML config file; its `[server]` table is used
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ServerOverrides,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = telemetry::init("info") {
        eprintln!("spark-server: {err}");
        return ExitCode::from(70);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(code = err.code(), "{err}");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), HeartbeatError> {
    // 文件只解析不校验，命令行覆盖之后由 bind/connect 校验最终值。
    let mut config = HeartbeatConfig::load_or_default(cli.config.as_deref())?.server;
    cli.overrides.apply(&mut config);

    let server = HeartbeatServer::bind(config).await?;
    let token = CancellationToken::new();
    shutdown::cancel_on_signal(token.clone());
    server.serve(token).await
}
