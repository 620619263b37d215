use crate::message::HeartbeatSource;
use spark_transport_tcp::{TcpChannel, TransportError};
use std::net::SocketAddr;
use std::time::Duration;

/// 处理循环结束的原因。
#[derive(Debug)]
pub enum ExitReason {
    /// 对端关闭或重置了连接，这是连接的正常终点。
    PeerClosed,
    /// 其他写入失败。
    WriteFailed(TransportError),
}

/// 单个连接处理任务的结局，供测试与日志使用；接受循环从不读取它。
#[derive(Debug)]
pub struct HandlerExit {
    pub peer: SocketAddr,
    pub messages_sent: u64,
    pub reason: ExitReason,
}

/// 持有一条已接受连接的心跳发送任务。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 每个客户端一个任务、一条连接、一个消息源，任务之间不共享任何可变状态，
///   某个客户端卡住只会拖慢它自己的写入；
/// - 对端断开是常态：写入失败即结束循环，仅以 DEBUG 级别记录。
///
/// ## 逻辑 (How)
/// 1. 从消息源取下一条心跳；
/// 2. 完整写入连接，失败则跳出；
/// 3. 休眠固定间隔，然后回到第 1 步。
///
/// 间隔等待不可打断：连接是否存活在下一次写入时重新判定。写入前通道会先探测对端
/// 是否已关闭，因此对端断开后的第一次发送尝试就会结束循环，不会再向死连接写一条。
///
/// ## 契约 (What)
/// - **前置条件**：`channel` 处于 `Open` 状态，且只被本任务持有；
/// - **后置条件**：[`Self::run`] 返回前连接已被关闭恰好一次；
/// - 不读取对端发来的任何数据。
pub struct ConnectionHandler<S> {
    channel: TcpChannel,
    source: S,
    interval: Duration,
}

impl<S: HeartbeatSource> ConnectionHandler<S> {
    pub fn new(channel: TcpChannel, source: S, interval: Duration) -> Self {
        Self {
            channel,
            source,
            interval,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.channel.peer_addr()
    }

    /// 运行发送循环直至连接失效。
    pub async fn run(self) -> HandlerExit {
        let Self {
            mut channel,
            mut source,
            interval,
        } = self;
        let peer = channel.peer_addr();
        let mut messages_sent = 0_u64;

        let reason = loop {
            let message = source.next_message();
            match channel.write_all(message.as_bytes()).await {
                Ok(()) => messages_sent += 1,
                Err(err) if err.is_peer_closed() => break ExitReason::PeerClosed,
                Err(err) => break ExitReason::WriteFailed(err),
            }
            tokio::time::sleep(interval).await;
        };

        match &reason {
            ExitReason::PeerClosed => {
                tracing::debug!(%peer, messages_sent, "client disconnected");
            }
            ExitReason::WriteFailed(err) => {
                tracing::debug!(
                    %peer,
                    messages_sent,
                    code = err.code(),
                    error = %err,
                    "write failed, dropping connection"
                );
            }
        }

        if let Err(err) = channel.close().await {
            tracing::trace!(%peer, error = %err, "close failed");
        }

        HandlerExit {
            peer,
            messages_sent,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FixedMessage;
    use spark_transport_tcp::TcpListener;
    use tokio::io::AsyncReadExt;
    use tracing_test::traced_test;

    async fn accepted_pair() -> (TcpChannel, tokio::net::TcpStream) {
        let listener = TcpListener::bind("127.0.0.1", 0).await.expect("bind");
        let addr = listener.local_addr();
        let (client, accepted) =
            tokio::join!(tokio::net::TcpStream::connect(addr), listener.accept());
        (accepted.expect("accept"), client.expect("connect"))
    }

    #[tokio::test(flavor = "multi_thread")]
    #[traced_test]
    async fn peer_close_ends_the_loop_at_the_next_tick() {
        let (channel, mut client) = accepted_pair().await;
        let interval = Duration::from_millis(1_000);
        let handler = ConnectionHandler::new(channel, FixedMessage::new("tick"), interval);
        assert_eq!(handler.peer_addr(), client.local_addr().expect("client addr"));

        // 与处理循环在同一任务内并发运行，日志因此落在测试的 span 中。
        let client_side = async move {
            let mut buf = [0_u8; 4];
            client.read_exact(&mut buf).await.expect("first tick");
            assert_eq!(&buf, b"tick");
            drop(client);
            tokio::time::Instant::now()
        };
        let (exit, closed_at) = tokio::join!(
            tokio::time::timeout(Duration::from_secs(3), handler.run()),
            client_side
        );

        let exit = exit.expect("handler must notice the closed peer");
        let lag = closed_at.elapsed();
        assert!(lag < interval + Duration::from_millis(500), "exited {lag:?} after close");
        assert!(matches!(exit.reason, ExitReason::PeerClosed));
        assert_eq!(exit.messages_sent, 1);
        assert!(logs_contain("client disconnected"));
    }
}
