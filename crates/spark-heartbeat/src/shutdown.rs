//! 操作系统信号到 [`CancellationToken`] 的桥接。
//!
//! # 教案式说明
//! - **意图（Why）**：服务端停机与客户端“用户中断”都由同一个令牌表达，
//!   业务循环只需 `select` 令牌，无需感知信号细节；
//! - **逻辑（How）**：后台任务等待 Ctrl-C（Unix 上另外等待 SIGTERM），
//!   收到任一信号即 `cancel`；
//! - **契约（What）**：返回的 `JoinHandle` 可以直接丢弃；令牌被其他途径取消时，
//!   后台任务随之退出。

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 安装信号监听，收到中断信号时取消 `token`。
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            signal = wait_for_signal() => {
                match signal {
                    Ok(name) => tracing::info!(signal = name, "interrupt received"),
                    Err(err) => tracing::warn!(error = %err, "signal listener failed, cancelling"),
                }
                token.cancel();
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn listener_exits_when_token_is_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let handle = cancel_on_signal(token.clone());
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("signal task must stop")
            .expect("signal task panicked");
    }
}
