//! `spark-stream`：连接到对端并每秒发送一段固定文本，Ctrl-C 停止。

use clap::Parser;
use spark_heartbeat::{
    ClientOverrides, HeartbeatConfig, HeartbeatError, StreamingClient, shutdown, telemetry,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "spark-stream")]
#[command(about = "Send a fixed message to a TCP peer once per interval until interrupted")]
#[command(version)]
struct Cli {
    /// TOML config file; its `[client]` table is used
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ClientOverrides,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = telemetry::init("info") {
        eprintln!("spark-stream: {err}");
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
    let mut config = HeartbeatConfig::load_or_default(cli.config.as_deref())?.client;
    cli.overrides.apply(&mut config);

    let client = StreamingClient::connect(&config).await?;
    let token = CancellationToken::new();
    shutdown::cancel_on_signal(token.clone());
    let report = client.stream(token).await?;
    println!(
        "Data streaming stopped by the user ({} messages sent to {})",
        report.messages_sent, report.peer
    );
    Ok(())
}
