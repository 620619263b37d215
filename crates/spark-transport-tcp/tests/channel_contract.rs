//! `TcpListener` 与 `TcpChannel` 的端到端契约。
//!
//! # 教案式说明
//! - **Why**：监听、建连、写入与关闭的错误分类直接决定上层循环的走向，回归会让
//!   “对端断开”被误报为故障或让接受循环意外退出。
//! - **How**：在回环地址上使用真实套接字，按用例验证成功路径与失败路径。
//! - **What**：每个测试返回 `anyhow::Result<()>`，失败时附带阶段性上下文。

use anyhow::{Context, Result};
use spark_transport_tcp::{ConnectionState, ErrorCategory, TcpChannel, TcpListener};
use std::time::Duration;
use tokio::io::AsyncReadExt;

#[tokio::test(flavor = "multi_thread")]
async fn connect_by_host_name_reaches_listener() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1", 0)
        .await
        .context("监听器绑定失败")?;
    let port = listener.local_addr().port();

    let (client, accepted) = tokio::join!(
        TcpChannel::connect("127.0.0.1", port),
        listener.accept()
    );
    let client = client.context("客户端建连失败")?;
    let accepted = accepted.context("服务端接受连接失败")?;

    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(client.peer_addr(), accepted.local_addr());
    assert_eq!(client.local_addr(), accepted.peer_addr());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn connect_to_closed_port_is_reported_once() -> Result<()> {
    let port = {
        let listener = TcpListener::bind("127.0.0.1", 0)
            .await
            .context("临时监听器绑定失败")?;
        listener.local_addr().port()
    };

    let err = TcpChannel::connect("127.0.0.1", port)
        .await
        .expect_err("监听器已关闭，建连应失败");
    assert_eq!(err.code(), "spark.transport.tcp.connect_failed");
    assert_eq!(err.io_kind(), Some(std::io::ErrorKind::ConnectionRefused));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn accepted_channel_writes_to_client_until_close() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1", 0)
        .await
        .context("监听器绑定失败")?;
    let addr = listener.local_addr();

    let (client, accepted) =
        tokio::join!(tokio::net::TcpStream::connect(addr), listener.accept());
    let mut client = client.context("客户端建连失败")?;
    let mut server_side = accepted.context("服务端接受连接失败")?;

    server_side.write_all(b"Hello, ").await.context("第一次写入失败")?;
    server_side.write_all(b"Spark!").await.context("第二次写入失败")?;
    server_side.close().await.context("关闭失败")?;

    let mut received = String::new();
    tokio::time::timeout(Duration::from_secs(2), client.read_to_string(&mut received))
        .await
        .context("等待 EOF 超时")?
        .context("读取失败")?;
    assert_eq!(received, "Hello, Spark!");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn peer_reset_surfaces_as_peer_closed() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1", 0)
        .await
        .context("监听器绑定失败")?;
    let addr = listener.local_addr();

    let (client, accepted) =
        tokio::join!(tokio::net::TcpStream::connect(addr), listener.accept());
    drop(client.context("客户端建连失败")?);
    let mut server_side = accepted.context("服务端接受连接失败")?;

    let mut category = None;
    for _ in 0..100 {
        if let Err(err) = server_side.write_all(b"heartbeat").await {
            category = Some(err.category());
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(category, Some(ErrorCategory::PeerClosed));
    assert_eq!(server_side.state(), ConnectionState::Closed);
    Ok(())
}
