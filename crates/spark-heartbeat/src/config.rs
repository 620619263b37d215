//! # config 模块说明
//!
//! ## 角色定位（Why）
//! - 服务端与客户端的全部可调参数集中在此：地址、节拍与消息文本；
//! - 允许以 TOML 文件覆盖内置默认值，再由命令行参数逐项覆盖文件值。
//!
//! ## 设计要求（What）
//! - 文件中的每个字段都可省略，省略即取默认值；未知字段直接拒绝，避免拼写错误被静默忽略；
//! - 读取文件只做解析，不做校验：命令行参数合并之后，由真正使用该表的一方
//!   （`HeartbeatServer::bind` 或 `StreamingClient::connect`）校验最终配置。
//!   因此服务端不会因为 `[client]` 表有误而拒绝启动，文件中的非法值也能被命令行覆盖；
//! - [`HeartbeatConfig::validate`] 保证主机名非空、节拍大于零、消息文本不含控制字符
//!   （线路上没有分帧，换行等字符会让接收方误以为存在消息边界）。

use crate::error::ConfigError;
use clap::Args;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_GREETING: &str = "Hello, Spark!";

/// 服务端配置，对应 TOML 中的 `[server]` 表。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 两次心跳之间的间隔（毫秒）。
    pub interval_ms: u64,
    /// 心跳前缀，时间戳以单个空格接在其后。
    pub greeting: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            interval_ms: DEFAULT_INTERVAL_MS,
            greeting: DEFAULT_GREETING.to_owned(),
        }
    }
}

impl ServerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_host("server.host", &self.host)?;
        validate_interval("server.interval_ms", self.interval_ms)?;
        validate_text("server.greeting", &self.greeting)
    }
}

/// 流式客户端配置，对应 TOML 中的 `[client]` 表。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub interval_ms: u64,
    /// 每个节拍原样发送的固定文本。
    pub message: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            interval_ms: DEFAULT_INTERVAL_MS,
            message: DEFAULT_GREETING.to_owned(),
        }
    }
}

impl ClientConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_host("client.host", &self.host)?;
        validate_interval("client.interval_ms", self.interval_ms)?;
        validate_text("client.message", &self.message)
    }
}

/// 命令行对 `[server]` 表的逐项覆盖。
#[derive(Args, Clone, Debug, Default)]
pub struct ServerOverrides {
    /// Host to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind
    #[arg(long)]
    pub port: Option<u16>,

    /// Milliseconds between heartbeats
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Text placed before the timestamp
    #[arg(long)]
    pub greeting: Option<String>,
}

impl ServerOverrides {
    pub fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.interval_ms = interval_ms;
        }
        if let Some(greeting) = self.greeting {
            config.greeting = greeting;
        }
    }
}

/// 命令行对 `[client]` 表的逐项覆盖。
#[derive(Args, Clone, Debug, Default)]
pub struct ClientOverrides {
    /// Peer host
    #[arg(long)]
    pub host: Option<String>,

    /// Peer port
    #[arg(long)]
    pub port: Option<u16>,

    /// Milliseconds between messages
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Message sent on every tick
    #[arg(long)]
    pub message: Option<String>,
}

impl ClientOverrides {
    pub fn apply(self, config: &mut ClientConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.interval_ms = interval_ms;
        }
        if let Some(message) = self.message {
            config.message = message;
        }
    }
}

/// 配置文件的顶层结构。
///
/// ```toml
/// [server]
/// host = "0.0.0.0"
/// port = 4000
///
/// [client]
/// message = "Hello, Spark!"
/// interval_ms = 500
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HeartbeatConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

impl HeartbeatConfig {
    /// 从 TOML 文本解析，不做语义校验。
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// 读取并解析 TOML 文件。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// 有文件就读文件，否则返回默认值。
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.client.validate()
    }
}

fn validate_host(field: &'static str, host: &str) -> Result<(), ConfigError> {
    if host.trim().is_empty() {
        return Err(ConfigError::Invalid {
            field,
            reason: "host must not be empty".to_owned(),
        });
    }
    Ok(())
}

fn validate_interval(field: &'static str, interval_ms: u64) -> Result<(), ConfigError> {
    if interval_ms == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "interval must be greater than zero".to_owned(),
        });
    }
    Ok(())
}

fn validate_text(field: &'static str, text: &str) -> Result<(), ConfigError> {
    if let Some(ch) = text.chars().find(|ch| ch.is_control()) {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("control character {ch:?} is not allowed on the wire"),
        });
    }
    Ok(())
}
