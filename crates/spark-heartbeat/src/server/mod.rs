//! 心跳服务端：接受循环与每连接处理任务。

pub mod handler;

pub use handler::{ConnectionHandler, ExitReason, HandlerExit};

use crate::config::ServerConfig;
use crate::error::HeartbeatError;
use crate::message::TimestampedGreeting;
use spark_transport_tcp::{TcpChannel, TcpListener, TransportError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

// 文件描述符耗尽时，立即重试只会空转；固定停顿，不做指数退避。
const RESOURCE_EXHAUSTED_PAUSE: Duration = Duration::from_millis(100);

/// 心跳服务端，拥有监听套接字直至 [`Self::serve`] 返回。
///
/// # 教案级说明
///
/// ## 意图 (Why)
/// - 接受循环只在 `accept()` 上挂起，新连接立即移交给独立的 Tokio 任务，
///   因此任何一个慢客户端都不会延误其他连接的接受与发送；
/// - 绑定失败在启动期就暴露，由调用方报告后终止进程，不重试。
///
/// ## 解析逻辑 (How)
/// - [`Self::bind`]：校验配置并绑定，成功即记录 INFO 日志；
/// - [`Self::serve`]：循环 `accept`，每条连接 `tokio::spawn` 一个
///   [`ConnectionHandler`]，并放入 `connection{peer=…}` span；
///   `JoinHandle` 直接丢弃，接受循环从不关心处理结果；
/// - 瞬时 `accept` 错误记录 WARN 后继续，新连接在设置套接字选项时失败也按瞬时处理；
///   监听器损坏时返回 [`HeartbeatError::Accept`]。
///
/// ## 契约定义 (What)
/// - `shutdown` 触发后，`serve` 立刻关闭监听套接字并返回 `Ok(())`；
///   已派生的处理任务不被等待，它们在下一次写入失败时自行结束。
///
/// ## 风险与权衡 (Trade-offs & Gotchas)
/// - 连接数没有上限（无界扇出），适用于演示与测试规模的流量；
/// - 停机不做排空：进程随后退出时，仍在运行的处理任务随运行时一同被丢弃。
#[derive(Debug)]
pub struct HeartbeatServer {
    listener: TcpListener,
    config: ServerConfig,
}

impl HeartbeatServer {
    /// 绑定监听地址。
    pub async fn bind(config: ServerConfig) -> Result<Self, HeartbeatError> {
        config.validate()?;
        let listener = TcpListener::bind(&config.host, config.port)
            .await
            .map_err(|source| HeartbeatError::Bind {
                host: config.host.clone(),
                port: config.port,
                source,
            })?;
        tracing::info!(
            host = %config.host,
            port = config.port,
            local = %listener.local_addr(),
            "server started, waiting for connections"
        );
        Ok(Self { listener, config })
    }

    /// 实际绑定的地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// 运行接受循环，直至 `shutdown` 被触发或监听器损坏。
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), HeartbeatError> {
        let Self { listener, config } = self;
        let local = listener.local_addr();
        let interval = config.interval();

        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            let err = match accepted {
                Ok(channel) => {
                    spawn_handler(channel, &config.greeting, interval);
                    continue;
                }
                Err(err) => err,
            };
            match recovery_for(&err) {
                AcceptRecovery::Continue => {
                    tracing::warn!(code = err.code(), error = %err, "accept failed, continuing");
                }
                AcceptRecovery::PauseThenContinue => {
                    tracing::warn!(code = err.code(), error = %err, "accept failed, continuing");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RESOURCE_EXHAUSTED_PAUSE) => {}
                    }
                }
                AcceptRecovery::Stop => {
                    tracing::error!(%local, code = err.code(), error = %err, "listener failed");
                    return Err(HeartbeatError::Accept(err));
                }
            }
        }

        drop(listener);
        tracing::info!(%local, "listener closed");
        Ok(())
    }
}

/// 一次失败的 `accept` 之后接受循环的走向。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AcceptRecovery {
    Continue,
    PauseThenContinue,
    Stop,
}

// 只有监听套接字本身不可用才停止；新连接在配置阶段失败属于瞬时错误。
fn recovery_for(err: &TransportError) -> AcceptRecovery {
    if !err.is_transient() {
        AcceptRecovery::Stop
    } else if err.is_resource_exhausted() {
        AcceptRecovery::PauseThenContinue
    } else {
        AcceptRecovery::Continue
    }
}

fn spawn_handler(channel: TcpChannel, greeting: &str, interval: Duration) {
    let peer = channel.peer_addr();
    tracing::info!(%peer, "new connection");
    let handler = ConnectionHandler::new(channel, TimestampedGreeting::new(greeting), interval);
    tokio::spawn(
        handler
            .run()
            .instrument(tracing::info_span!("connection", %peer)),
    );
}
