use crate::{
    error::{self, TransportError, map_io_error},
    util::{first_success, resolve, run_with_cancellation},
};
use socket2::SockRef;
use std::{fmt, io, mem::MaybeUninit, net::SocketAddr, time::Duration};
use tokio::{io::AsyncWriteExt, net::TcpStream as TokioTcpStream};
use tokio_util::sync::CancellationToken;

/// TCP 套接字级配置项，实现对内核行为的显式控制。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 心跳消息体积很小，若不关闭 Nagle 算法，可能在内核中与下一条消息合并，
///   使接收方观察到的节拍失真；
/// - 将 `SO_LINGER` 显式配置化，避免调用方直接操作 `socket2`。
///
/// ## 核心逻辑（How）
/// - `nodelay` 通过 Tokio 的 `set_nodelay` 落地；
/// - `linger` 为 `Some(dur)` 时通过 `socket2::SockRef::set_linger` 设置 `SO_LINGER`，
///   `None` 表示遵循内核默认策略。
///
/// ## 契约说明（What）
/// - 默认值：`nodelay = true`，`linger = None`；
/// - **前置条件**：`apply` 前 `TokioTcpStream` 必须已成功创建；
/// - **后置条件**：`apply` 返回 `Ok(())` 时所有选项均已生效。
///
/// ## 注意事项（Trade-offs）
/// - `SO_LINGER` 在 Linux 上取整到秒，过小的值可能让发送缓冲中的数据被 RST 丢弃。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpSocketConfig {
    nodelay: bool,
    linger: Option<Duration>,
}

impl Default for TcpSocketConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpSocketConfig {
    pub const fn new() -> Self {
        Self {
            nodelay: true,
            linger: None,
        }
    }

    /// 设置 `SO_LINGER` 超时时长。
    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger = linger;
        self
    }

    /// 设置 `TCP_NODELAY`。
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn linger(&self) -> Option<Duration> {
        self.linger
    }

    pub fn nodelay(&self) -> bool {
        self.nodelay
    }

    fn apply(&self, stream: &TokioTcpStream) -> io::Result<()> {
        stream.set_nodelay(self.nodelay)?;
        SockRef::from(stream).set_linger(self.linger)
    }
}

/// 单条连接的生命周期状态：`Connecting → Open → Closed`，`Closed` 为终态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// 正在拨号，尚未拿到套接字。
    Connecting,
    /// 套接字可写。
    Open,
    /// 写入失败、对端断开或已被显式关闭。
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        })
    }
}

/// 独占所有权的 TCP 连接。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 每条连接只属于一个处理任务（服务端 Handler 或客户端），不存在跨任务共享，
///   因此无需互斥锁，所有写操作通过 `&mut self` 串行化；
/// - 写入按调用顺序完整落地，保证单连接内消息不会交错。
///
/// ## 逻辑 (How)
/// - `write_all` 先以 `MSG_PEEK` 探测对端是否已关闭（不消费数据），再完整写出缓冲区；
///   对端已关闭时直接返回 `PeerClosed`，不再向死连接写入；
///   任何失败都会把状态推进到 [`ConnectionState::Closed`]，
///   此后的写入直接返回 [`TransportError::Closed`]，不再触碰套接字；
/// - `write_all_cancellable` 通过内部工具函数 `run_with_cancellation` 让外部取消信号
///   能打断阻塞中的写入；
/// - `close` 消费 `self`，借助所有权保证关闭恰好发生一次。
///
/// ## 契约 (What)
/// - `connect`：解析并拨号，依次尝试所有候选地址；
/// - `peer_addr`/`local_addr`：建连时缓存的地址元数据；
/// - `state`：当前生命周期状态。
///
/// ## 注意事项 (Trade-offs)
/// - 本通道是只写协议的载体，不提供读取接口；对端发送的数据由内核缓冲并在关闭时丢弃；
/// - 被取消的写入可能已经写出部分字节，线路上不存在分帧，调用方需接受残缺尾部。
#[derive(Debug)]
pub struct TcpChannel {
    stream: TokioTcpStream,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    state: ConnectionState,
}

impl TcpChannel {
    pub(crate) fn from_parts(
        stream: TokioTcpStream,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        config: &TcpSocketConfig,
    ) -> Result<Self, TransportError> {
        config
            .apply(&stream)
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        Ok(Self {
            stream,
            peer_addr,
            local_addr,
            state: ConnectionState::Open,
        })
    }

    /// 解析 `host:port` 并建立连接。
    pub async fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        Self::connect_with_config(host, port, &TcpSocketConfig::default()).await
    }

    /// 解析 `host:port` 并按指定配置建立连接。
    pub async fn connect_with_config(
        host: &str,
        port: u16,
        config: &TcpSocketConfig,
    ) -> Result<Self, TransportError> {
        tracing::trace!(host, port, state = %ConnectionState::Connecting, "dialing");
        let addrs = resolve(error::CONNECT, host, port).await?;
        let stream =
            first_success(error::CONNECT, &addrs, |addr| TokioTcpStream::connect(addr)).await?;
        Self::from_stream(stream, config)
    }

    /// 直接连接到已解析的地址。
    pub async fn connect_addr(
        addr: SocketAddr,
        config: &TcpSocketConfig,
    ) -> Result<Self, TransportError> {
        tracing::trace!(%addr, state = %ConnectionState::Connecting, "dialing");
        let stream = TokioTcpStream::connect(addr)
            .await
            .map_err(|err| map_io_error(error::CONNECT, err))?;
        Self::from_stream(stream, config)
    }

    fn from_stream(
        stream: TokioTcpStream,
        config: &TcpSocketConfig,
    ) -> Result<Self, TransportError> {
        let local = stream
            .local_addr()
            .map_err(|err| map_io_error(error::CONNECT, err))?;
        let peer = stream
            .peer_addr()
            .map_err(|err| map_io_error(error::CONNECT, err))?;
        Self::from_parts(stream, local, peer, config)
    }

    /// 将整个缓冲区写入套接字。
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(());
        }
        let result = match self.detect_peer_close() {
            Ok(()) => self
                .stream
                .write_all(buf)
                .await
                .map_err(|err| map_io_error(error::WRITE, err)),
            Err(err) => Err(err),
        };
        self.observe(result)
    }

    /// 与 [`Self::write_all`] 相同，但可被 `cancellation` 打断。
    ///
    /// 取消时返回 [`TransportError::Cancelled`]，状态保持 `Open`，是否关闭由调用方决定。
    pub async fn write_all_cancellable(
        &mut self,
        buf: &[u8],
        cancellation: &CancellationToken,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(());
        }
        let result = match self.detect_peer_close() {
            Ok(()) => {
                run_with_cancellation(cancellation, error::WRITE, self.stream.write_all(buf)).await
            }
            Err(err) => Err(err),
        };
        self.observe(result)
    }

    /// 关闭连接：发送 FIN 后释放套接字。
    ///
    /// 已处于 `Closed` 状态（此前写入失败）时不再执行半关闭，只释放资源。
    /// 对端已断开导致的半关闭失败不视为错误。
    pub async fn close(mut self) -> Result<(), TransportError> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.state = ConnectionState::Closed;
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(err) => {
                let err = map_io_error(error::SHUTDOWN, err);
                if err.is_peer_closed() { Ok(()) } else { Err(err) }
            }
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        match self.state {
            ConnectionState::Closed => Err(TransportError::Closed {
                operation: error::WRITE,
            }),
            _ => Ok(()),
        }
    }

    // 以 MSG_PEEK 非阻塞探测对端是否已发送 FIN 或 RST，不消费任何字节。
    // 对端仍有未读数据时无法判断，交给随后的写入。
    fn detect_peer_close(&self) -> Result<(), TransportError> {
        let mut byte = [MaybeUninit::<u8>::uninit(); 1];
        match SockRef::from(&self.stream).peek(&mut byte) {
            Ok(0) => Err(map_io_error(
                error::WRITE,
                io::Error::from(io::ErrorKind::UnexpectedEof),
            )),
            Ok(_) => Ok(()),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(())
            }
            Err(err) => Err(map_io_error(error::WRITE, err)),
        }
    }

    fn observe(&mut self, result: Result<(), TransportError>) -> Result<(), TransportError> {
        if let Err(err) = &result
            && !err.is_cancelled()
        {
            self.state = ConnectionState::Closed;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener as TokioTcpListener;

    async fn pair() -> (TcpChannel, TokioTcpStream) {
        let listener = TokioTcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let config = TcpSocketConfig::default();
        let (channel, accepted) = tokio::join!(
            TcpChannel::connect_addr(addr, &config),
            listener.accept()
        );
        (channel.expect("connect"), accepted.expect("accept").0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn writes_arrive_in_order() {
        let (mut channel, mut peer) = pair().await;
        assert_eq!(channel.state(), ConnectionState::Open);

        channel.write_all(b"first ").await.expect("write first");
        channel.write_all(b"second").await.expect("write second");
        channel.close().await.expect("close");

        let mut received = String::new();
        peer.read_to_string(&mut received).await.expect("read");
        assert_eq!(received, "first second");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn write_failure_moves_channel_to_closed() {
        let (mut channel, peer) = pair().await;
        drop(peer);

        let mut failure = None;
        for _ in 0..50 {
            if let Err(err) = channel.write_all(b"ping").await {
                failure = Some(err);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let failure = failure.expect("写入已关闭的对端最终必然失败");
        assert!(failure.is_peer_closed(), "unexpected error: {failure}");
        assert_eq!(channel.state(), ConnectionState::Closed);

        let again = channel.write_all(b"ping").await.expect_err("关闭后不可再写");
        assert!(matches!(again, TransportError::Closed { .. }));
        channel.close().await.expect("closing a failed channel is a no-op");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_write_after_peer_fin_is_refused() {
        let (mut channel, mut peer) = pair().await;
        channel.write_all(b"ping").await.expect("write while open");
        let mut buf = [0_u8; 4];
        peer.read_exact(&mut buf).await.expect("read");
        drop(peer);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = channel.write_all(b"ping").await.expect_err("peer already sent FIN");
        assert!(err.is_peer_closed(), "unexpected error: {err}");
        assert_eq!(err.io_kind(), Some(io::ErrorKind::UnexpectedEof));
        assert_eq!(channel.state(), ConnectionState::Closed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unread_peer_data_is_left_in_place() {
        let (mut channel, mut peer) = pair().await;
        peer.write_all(b"noise").await.expect("peer write");
        tokio::time::sleep(Duration::from_millis(20)).await;

        channel.write_all(b"a").await.expect("first write");
        channel.write_all(b"b").await.expect("second write");
        assert_eq!(channel.state(), ConnectionState::Open);

        let mut received = [0_u8; 2];
        peer.read_exact(&mut received).await.expect("read");
        assert_eq!(&received, b"ab");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_write_keeps_channel_open() {
        let (mut channel, _peer) = pair().await;
        let token = CancellationToken::new();
        token.cancel();

        let err = channel
            .write_all_cancellable(b"ping", &token)
            .await
            .expect_err("cancelled");
        assert!(err.is_cancelled());
        assert_eq!(channel.state(), ConnectionState::Open);
    }

    #[test]
    fn default_socket_config_disables_nagle() {
        let config = TcpSocketConfig::default();
        assert!(config.nodelay());
        assert_eq!(config.linger(), None);
        let tuned = config.with_linger(Some(Duration::from_secs(1))).with_nodelay(false);
        assert_eq!(tuned.linger(), Some(Duration::from_secs(1)));
        assert!(!tuned.nodelay());
    }
}
