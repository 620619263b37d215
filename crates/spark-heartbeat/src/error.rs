//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 服务进程只有少数几种需要上报的失败：配置无效、绑定失败、建连失败、
//!   监听器损坏、客户端写入失败；
//! - 对端断开与用户取消属于正常终止路径，不在这里出现。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，保留底层 [`TransportError`] 作为 `source`；
//! - [`HeartbeatError::exit_code`] 给出稳定的进程退出码，遵循 `sysexits.h` 约定。

use spark_transport_tcp::TransportError;
use std::path::PathBuf;
use thiserror::Error;

/// 配置加载与校验错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{}`: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// 心跳服务的错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把“启动期致命错误”和“运行期致命错误”区分开，二进制入口据此
///   打印一次原因并以非零状态退出，不做任何重试；
/// - **契约 (What)**：
///   - `Bind` / `Connect`：启动期失败，通常意味着端口被占用或目标不可达；
///   - `Accept`：监听套接字本身已不可用，接受循环无法继续；
///   - `Stream`：客户端在非取消场景下写入失败；
/// - **风险 (Trade-offs)**：`Accept` 只承载被分类为 `Fatal` 的错误，瞬时错误在循环内部
///   消化，不会走到这里。
#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind {host}:{port}: {source}")]
    Bind {
        host: String,
        port: u16,
        #[source]
        source: TransportError,
    },
    #[error("listener became unusable: {0}")]
    Accept(#[source] TransportError),
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: TransportError,
    },
    #[error("streaming to peer failed: {0}")]
    Stream(#[source] TransportError),
}

impl HeartbeatError {
    /// 进程退出码。
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 78,
            Self::Bind { .. } | Self::Connect { .. } => 69,
            Self::Accept(_) | Self::Stream(_) => 74,
        }
    }

    /// 底层传输错误的稳定错误码（若有）。
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => None,
            Self::Bind { source, .. } | Self::Connect { source, .. } => Some(source.code()),
            Self::Accept(source) | Self::Stream(source) => Some(source.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_use_ex_config() {
        let err = HeartbeatError::from(ConfigError::Invalid {
            field: "server.port",
            reason: "nope".to_owned(),
        });
        assert_eq!(err.exit_code(), 78);
        assert_eq!(err.code(), None);
        assert_eq!(err.to_string(), "invalid `server.port`: nope");
    }
}
