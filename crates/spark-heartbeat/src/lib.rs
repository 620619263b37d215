#![deny(unsafe_code)]
#![doc = r#"
# spark-heartbeat

## 设计动机（Why）
- 为 Spark 流式接收端提供一个最小的 TCP 数据源：服务端向每个连接的客户端每秒推送
  一条带时间戳的问候语，客户端则向对端每秒推送一段固定文本；
- 两端都是只写协议，没有分帧、确认与序号，断线即丢，不做补偿。

## 核心契约（What）
- [`server::HeartbeatServer`]：绑定失败在启动期暴露；接受循环对每个连接派生独立任务，
  任务之间不共享可变状态；停机时立即关闭监听套接字；
- [`client::StreamingClient`]：建连失败直接返回；用户中断会唤醒节拍等待并关闭连接；
- [`config::HeartbeatConfig`]：默认 `localhost:4000`、1 秒节拍、`"Hello, Spark!"`。

## 实现策略（How）
- 传输细节全部委托给 `spark-transport-tcp`，本 crate 只负责节拍、消息与生命周期；
- 日志使用 `tracing`，每个连接处理任务运行在 `connection{peer=…}` span 内。
"#]

pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod server;
pub mod shutdown;
pub mod telemetry;

pub use client::{StreamReport, StreamingClient};
pub use config::{ClientConfig, ClientOverrides, HeartbeatConfig, ServerConfig, ServerOverrides};
pub use error::{ConfigError, HeartbeatError};
pub use server::HeartbeatServer;
