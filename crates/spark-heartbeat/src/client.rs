//! 流式客户端：主动拨号，按固定节拍发送同一段文本，直至被用户中断。

use crate::config::ClientConfig;
use crate::error::HeartbeatError;
use crate::message::{FixedMessage, HeartbeatSource};
use spark_transport_tcp::TcpChannel;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 一次流式发送的总结。循环只会因取消而正常结束，所以报告总是代表“用户停止”。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamReport {
    pub peer: SocketAddr,
    pub messages_sent: u64,
}

/// 与服务端发送循环对称的流式客户端。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 客户端与服务端一样是只写协议：写一条、等一拍、再写一条；
/// - 用户中断必须唤醒正在等待的节拍，而不是等到下一次写入才察觉，
///   以保证停止延迟不超过一个节拍。
///
/// ## 逻辑 (How)
/// - `connect`：校验配置后拨号，失败即 [`HeartbeatError::Connect`]，不自动重试；
/// - `stream`：写入与休眠都和 `cancel` 令牌做 `select`；
///   取消后关闭连接并返回 [`StreamReport`]，其他写入失败关闭连接后返回
///   [`HeartbeatError::Stream`]。
///
/// ## 注意事项 (Trade-offs)
/// - 取消可能打断一次写入，对端会收到残缺的最后一条消息；线路本无分帧，可接受。
pub struct StreamingClient {
    channel: TcpChannel,
    source: FixedMessage,
    interval: Duration,
}

impl StreamingClient {
    /// 建立到 `config.host:config.port` 的单条连接。
    pub async fn connect(config: &ClientConfig) -> Result<Self, HeartbeatError> {
        config.validate()?;
        let channel = TcpChannel::connect(&config.host, config.port)
            .await
            .map_err(|source| HeartbeatError::Connect {
                host: config.host.clone(),
                port: config.port,
                source,
            })?;
        tracing::info!(peer = %channel.peer_addr(), local = %channel.local_addr(), "connected");
        Ok(Self {
            channel,
            source: FixedMessage::new(config.message.clone()),
            interval: config.interval(),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.channel.peer_addr()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.channel.local_addr()
    }

    /// 持续发送直至 `cancel` 被触发。
    pub async fn stream(self, cancel: CancellationToken) -> Result<StreamReport, HeartbeatError> {
        let Self {
            mut channel,
            mut source,
            interval,
        } = self;
        let peer = channel.peer_addr();
        let mut messages_sent = 0_u64;

        let failure = loop {
            let message = source.next_message();
            match channel.write_all_cancellable(message.as_bytes(), &cancel).await {
                Ok(()) => messages_sent += 1,
                Err(err) if err.is_cancelled() => break None,
                Err(err) => break Some(err),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break None,
                _ = tokio::time::sleep(interval) => {}
            }
        };

        if let Err(err) = channel.close().await {
            tracing::debug!(%peer, error = %err, "close failed");
        }

        match failure {
            None => {
                tracing::info!(%peer, messages_sent, "streaming stopped by user");
                Ok(StreamReport {
                    peer,
                    messages_sent,
                })
            }
            Some(err) => {
                tracing::error!(
                    %peer,
                    messages_sent,
                    code = err.code(),
                    error = %err,
                    "streaming failed"
                );
                Err(HeartbeatError::Stream(err))
            }
        }
    }
}
