use crate::error::{OperationKind, TransportError, cancelled_error, map_io_error};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

/// 将 `host:port` 解析为候选地址列表，保持解析器返回的顺序。
pub(crate) async fn resolve(
    operation: OperationKind,
    host: &str,
    port: u16,
) -> Result<Vec<SocketAddr>, TransportError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|err| map_io_error(operation, err))?
        .collect();
    if addrs.is_empty() {
        return Err(TransportError::Unresolved {
            operation,
            target: format!("{host}:{port}"),
        });
    }
    Ok(addrs)
}

/// 依次尝试每个候选地址，返回首个成功结果；全部失败时返回最后一个错误。
pub(crate) async fn first_success<T, F, Fut>(
    operation: OperationKind,
    addrs: &[SocketAddr],
    mut attempt: F,
) -> Result<T, TransportError>
where
    F: FnMut(SocketAddr) -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let mut last_error = None;
    for addr in addrs {
        match attempt(*addr).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::trace!(
                    %addr,
                    error = %err,
                    op = operation.message,
                    "candidate address failed"
                );
                last_error = Some(err);
            }
        }
    }
    Err(match last_error {
        Some(err) => map_io_error(operation, err),
        None => TransportError::Unresolved {
            operation,
            target: String::from("<empty>"),
        },
    })
}

/// 在保留取消语义的前提下执行 IO Future。
///
/// 取消分支优先：令牌一旦触发，即便 IO 也已就绪，也返回
/// [`TransportError::Cancelled`]。
pub(crate) async fn run_with_cancellation<F, T>(
    cancellation: &CancellationToken,
    operation: OperationKind,
    future: F,
) -> Result<T, TransportError>
where
    F: Future<Output = io::Result<T>>,
{
    if cancellation.is_cancelled() {
        return Err(cancelled_error(operation));
    }

    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(cancelled_error(operation)),
        result = future => result.map_err(|err| map_io_error(operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CONNECT, WRITE};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn resolves_loopback_literal() {
        let addrs = resolve(CONNECT, "127.0.0.1", 4000).await.expect("resolve");
        assert_eq!(addrs, vec!["127.0.0.1:4000".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancellation_wins_over_pending_io() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result: Result<(), _> =
            run_with_cancellation(&token, WRITE, std::future::pending::<io::Result<()>>()).await;
        assert!(result.expect_err("应当被取消").is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn already_cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let result = run_with_cancellation(&token, WRITE, async { Ok(7_u8) }).await;
        assert!(result.expect_err("取消应先于 IO").is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_success_reports_last_error() {
        let addrs: Vec<SocketAddr> = vec![
            "127.0.0.1:1".parse().unwrap(),
            "127.0.0.1:2".parse().unwrap(),
        ];
        let result: Result<(), _> = first_success(CONNECT, &addrs, |addr| async move {
            Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("refused {addr}"),
            ))
        })
        .await;
        let err = result.expect_err("所有候选均失败");
        assert!(err.to_string().contains("refused 127.0.0.1:2"));
    }
}
