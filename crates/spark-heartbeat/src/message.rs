//! 心跳消息的构造。
//!
//! # 教案式说明
//! - **意图（Why）**：服务端与客户端的发送循环结构相同，差别只在每个节拍发送什么；
//!   把“下一条消息”抽象为 [`HeartbeatSource`]，循环本身就不必关心内容。
//! - **契约（What）**：消息是一次性值，每个节拍现场构造，不保留历史；
//!   线路上不追加任何分隔符。
//! - **逻辑（How）**：服务端使用 [`TimestampedGreeting`]，格式为
//!   `"<greeting> YYYY-MM-DD HH:MM:SS"`（本地时间）；客户端使用 [`FixedMessage`]。

use chrono::{Local, NaiveDateTime};

/// 心跳时间戳格式。
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 每个节拍产出一条待发送的消息。
pub trait HeartbeatSource: Send {
    fn next_message(&mut self) -> String;
}

/// 时钟抽象，便于在测试中固定时间。
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// 读取本地墙钟。
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// 服务端心跳：问候语 + 空格 + 本地时间戳。
#[derive(Clone, Debug)]
pub struct TimestampedGreeting<C = LocalClock> {
    greeting: String,
    clock: C,
}

impl TimestampedGreeting<LocalClock> {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self::with_clock(greeting, LocalClock)
    }
}

impl<C: Clock> TimestampedGreeting<C> {
    pub fn with_clock(greeting: impl Into<String>, clock: C) -> Self {
        Self {
            greeting: greeting.into(),
            clock,
        }
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }
}

impl<C: Clock> HeartbeatSource for TimestampedGreeting<C> {
    fn next_message(&mut self) -> String {
        format!(
            "{} {}",
            self.greeting,
            self.clock.now().format(TIMESTAMP_FORMAT)
        )
    }
}

/// 客户端消息：每次都是同一段文本。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixedMessage(String);

impl FixedMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl HeartbeatSource for FixedMessage {
    fn next_message(&mut self) -> String {
        self.0.clone()
    }
}

/// 把一条服务端心跳拆回 `(问候语, 时间戳)`；格式不符时返回 `None`。
///
/// 时间戳固定为 19 个字符，因此从尾部切分，问候语本身可以包含空格。
pub fn parse_heartbeat(message: &str) -> Option<(&str, NaiveDateTime)> {
    const STAMP_LEN: usize = "YYYY-MM-DD HH:MM:SS".len();
    let split = message.len().checked_sub(STAMP_LEN + 1)?;
    if !message.is_char_boundary(split) {
        return None;
    }
    let (greeting, rest) = message.split_at(split);
    let stamp = rest.strip_prefix(' ')?;
    let parsed = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((greeting, parsed))
}
