#![doc = r#"
# spark-transport-tcp

## 设计动机（Why）
- **定位**：该 crate 提供心跳服务在 Tokio 运行时上的最小 TCP 传输实现，
  封装解析、监听、建连、写入与关闭等底层细节。
- **架构角色**：服务端接受循环与流式客户端都只通过本 crate 接触套接字，
  因而“单连接独占、写入有序、关闭一次”的约束集中在这里落地。
- **设计理念**：强调“所有权即隔离”与“错误分类”。每个 [`TcpChannel`] 只有一个
  所有者，无需任何锁；所有 IO 失败都映射为带稳定错误码与
  [`ErrorCategory`] 的 [`TransportError`]。

## 核心契约（What）
- **输入条件**：调用方必须在 Tokio 运行时中使用本实现；
- **输出保障**：绑定冲突立即失败且不残留监听器；`accept` 失败区分可继续的
  `Transient` 与需终止的 `Fatal`；写入失败区分对端断开 `PeerClosed` 与其他故障；
- **生命周期**：连接状态 `Connecting → Open → Closed`，`Closed` 为终态，
  [`TcpChannel::close`] 消费通道，关闭恰好一次。

## 实现策略（How）
- **执行框架**：完全依赖 Tokio 的 `TcpListener` 与 `TcpStream`，取消信号通过
  `tokio_util::sync::CancellationToken` 与 `tokio::select!` 组合进写入路径；
- **套接字选项**：借助 `socket2` 设置 `SO_LINGER`，默认开启 `TCP_NODELAY`。

## 风险与考量（Trade-offs）
- 通道只写不读：对端发送的字节留在内核缓冲中，关闭时丢弃；
- 每次写入前以非阻塞 `MSG_PEEK` 探测对端是否已发送 FIN/RST，不消费数据；
  对端关闭时缓冲区中仍有未读字节则无法探测，故障要到随后的写入才暴露。
"#]

mod channel;
pub mod error;
mod listener;
mod util;

pub use channel::{ConnectionState, TcpChannel, TcpSocketConfig};
pub use error::{ErrorCategory, OperationKind, TransportError};
pub use listener::TcpListener;
