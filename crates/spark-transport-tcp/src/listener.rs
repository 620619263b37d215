use crate::{
    TcpChannel, TcpSocketConfig,
    error::{self, TransportError, map_io_error},
    util::{first_success, resolve},
};
use std::net::SocketAddr;
use tokio::net::TcpListener as TokioTcpListener;

/// 对 Tokio `TcpListener` 的语义封装。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 提供“绑定 → 接受连接”的最小能力，并把底层 IO 错误映射为带分类的
///   [`TransportError`]，让接受循环能区分“单次失败”与“监听器已损坏”。
///
/// ## 逻辑 (How)
/// - `bind`：解析 `host:port`，依次尝试每个候选地址，首个成功者胜出；
///   全部失败时返回最后一个错误，不会残留半打开的监听器；
/// - `accept`：调用内部监听器的异步 `accept`，成功后应用默认
///   [`TcpSocketConfig`] 并包装为 [`TcpChannel`]；
/// - `local_addr`：返回实际绑定的地址（端口 0 时即内核分配的端口）。
///
/// ## 契约 (What)
/// - **前置条件**：调用方必须在 Tokio 运行时中使用该监听器；
/// - **后置条件**：`accept` 成功返回的 [`TcpChannel`] 处于 `Open` 状态，
///   所有权完全移交给调用方；
/// - **错误语义**：`accept` 失败时错误分类为 `Transient` 或 `Fatal`，
///   前者允许调用方继续循环。
///
/// ## 注意事项 (Trade-offs)
/// - 未支持 `SO_REUSEPORT` 等高级套接字选项；端口被占用时绑定直接失败；
/// - 监听套接字在本结构被 drop 时关闭。
#[derive(Debug)]
pub struct TcpListener {
    inner: TokioTcpListener,
    local_addr: SocketAddr,
    default_config: TcpSocketConfig,
}

impl TcpListener {
    /// 解析并绑定到 `host:port`。
    pub async fn bind(host: &str, port: u16) -> Result<Self, TransportError> {
        Self::bind_with_config(host, port, TcpSocketConfig::default()).await
    }

    /// 解析并绑定到 `host:port`，同时指定新连接的默认套接字配置。
    ///
    /// # 教案级注释
    ///
    /// ## 契约（What）
    /// - `default_config`：后续 `accept` 默认应用的 [`TcpSocketConfig`]；
    /// - 返回：成功初始化的 [`TcpListener`]；失败时错误码为
    ///   `spark.transport.tcp.bind_failed`（解析失败时为 `resolve_failed`）。
    ///
    /// ## 逻辑（How）
    /// - 通过 `tokio::net::lookup_host` 解析，`localhost` 可能同时得到 IPv6 与 IPv4 地址；
    /// - 逐个尝试绑定，读取实际绑定地址并缓存。
    ///
    /// ## 注意事项（Trade-offs）
    /// - 只监听首个绑定成功的地址。`localhost` 常先解析出 `::1`，此时仅拨号 IPv4 的
    ///   对端会被拒绝；需要确定的地址族时请传入字面量（`127.0.0.1` 或 `::1`）。
    ///   解析出多个候选时以 INFO 日志记录最终选中的地址族。
    pub async fn bind_with_config(
        host: &str,
        port: u16,
        default_config: TcpSocketConfig,
    ) -> Result<Self, TransportError> {
        let addrs = resolve(error::RESOLVE, host, port).await?;
        let listener =
            first_success(error::BIND, &addrs, |addr| TokioTcpListener::bind(addr)).await?;
        let bound = Self::from_tokio(listener, default_config)?;
        if addrs.len() > 1 {
            tracing::info!(
                host,
                local = %bound.local_addr,
                family = if bound.local_addr.is_ipv6() { "ipv6" } else { "ipv4" },
                candidates = addrs.len(),
                "host resolved to several addresses, listening on the first one only"
            );
        }
        Ok(bound)
    }

    /// 绑定到已解析的地址。
    pub async fn bind_addr(addr: SocketAddr) -> Result<Self, TransportError> {
        let listener = TokioTcpListener::bind(addr)
            .await
            .map_err(|err| map_io_error(error::BIND, err))?;
        Self::from_tokio(listener, TcpSocketConfig::default())
    }

    fn from_tokio(
        listener: TokioTcpListener,
        default_config: TcpSocketConfig,
    ) -> Result<Self, TransportError> {
        let local = listener
            .local_addr()
            .map_err(|err| map_io_error(error::BIND, err))?;
        Ok(Self {
            inner: listener,
            local_addr: local,
            default_config,
        })
    }

    /// 返回监听器实际绑定的地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 读取监听器为后续 `accept` 预设的默认套接字配置。
    pub fn default_socket_config(&self) -> &TcpSocketConfig {
        &self.default_config
    }

    /// 接受一个入站连接。
    pub async fn accept(&self) -> Result<TcpChannel, TransportError> {
        self.accept_with_config(&self.default_config).await
    }

    /// 接受一个入站连接，并应用指定的套接字配置。
    ///
    /// 选项配置或地址查询失败会以 `configure_failed` 错误码返回，分类为 `Transient`；
    /// 此时新连接已被丢弃，监听器本身不受影响，调用方可以继续接受。
    pub async fn accept_with_config(
        &self,
        config: &TcpSocketConfig,
    ) -> Result<TcpChannel, TransportError> {
        let (stream, remote) = self
            .inner
            .accept()
            .await
            .map_err(|err| map_io_error(error::ACCEPT, err))?;
        // 从这里开始的失败只属于这一条新连接，统一按 `configure` 归类为瞬时错误。
        let local_addr = stream
            .local_addr()
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        TcpChannel::from_parts(stream, local_addr, remote, config)
    }
}
