//! 全局 `tracing` 订阅者的安装入口。

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

/// 日志安装过程可能出现的错误。
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("a global tracing subscriber has already been installed")]
    SubscriberAlreadySet,
    #[error("failed to install global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// 安装 `fmt + EnvFilter` 订阅者。
///
/// # 教案式说明
/// - **意图（Why）**：两个二进制入口共享同一套日志格式与过滤规则；
/// - **逻辑（How）**：优先读取 `RUST_LOG`，缺省时使用 `default_directive`；
///   订阅者由 `tracing_subscriber::registry()` 组合 `EnvFilter` 与 `fmt` Layer 构成；
/// - **契约（What）**：进程内只能成功调用一次，再次调用返回
///   [`TelemetryError::SubscriberAlreadySet`]。
pub fn init(default_directive: &str) -> Result<(), TelemetryError> {
    if dispatcher::has_been_set() {
        return Err(TelemetryError::SubscriberAlreadySet);
    }
    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter(default_directive))
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn build_env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}
