use std::fmt;
use std::io;
use thiserror::Error;

/// 描述一次底层操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

pub const RESOLVE: OperationKind = OperationKind {
    code: "spark.transport.tcp.resolve_failed",
    message: "tcp resolve",
};
pub const BIND: OperationKind = OperationKind {
    code: "spark.transport.tcp.bind_failed",
    message: "tcp bind",
};
pub const ACCEPT: OperationKind = OperationKind {
    code: "spark.transport.tcp.accept_failed",
    message: "tcp accept",
};
pub const CONNECT: OperationKind = OperationKind {
    code: "spark.transport.tcp.connect_failed",
    message: "tcp connect",
};
pub const WRITE: OperationKind = OperationKind {
    code: "spark.transport.tcp.write_failed",
    message: "tcp write",
};
pub const SHUTDOWN: OperationKind = OperationKind {
    code: "spark.transport.tcp.shutdown_failed",
    message: "tcp shutdown",
};
pub const CONFIGURE: OperationKind = OperationKind {
    code: "spark.transport.tcp.configure_failed",
    message: "tcp configure",
};

const CANCEL_CODE: &str = "spark.transport.tcp.cancelled";
const CLOSED_CODE: &str = "spark.transport.tcp.closed";

// Linux 与 macOS 上取值一致；其他平台的原始错误码含义不同，不参与判断。
#[cfg(unix)]
const ENFILE: i32 = 23;
#[cfg(unix)]
const EMFILE: i32 = 24;

/// I/O 失败的语义分类，决定调用方是继续、收尾还是终止。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 接受循环需要区分“单次 accept 失败”与“监听套接字已不可用”；
/// - 发送循环需要把“对端断开”视为连接的正常终点，而不是需要上报的故障。
///
/// ## 契约 (What)
/// - `Transient`：仅影响本次操作，调用方可以继续；
/// - `PeerClosed`：对端已关闭或重置连接，连接应进入 `Closed`；
/// - `Cancelled`：操作被外部取消信号打断；
/// - `Fatal`：其余错误，调用方应向上传播。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    Transient,
    PeerClosed,
    Cancelled,
    Fatal,
}

/// TCP 传输层的统一错误类型。
///
/// 每个变体都携带 [`OperationKind`]，因此 [`TransportError::code`] 总能给出稳定错误码，
/// 便于日志检索与告警规则匹配。
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{operation} failed: {source}")]
    Io {
        operation: OperationKind,
        category: ErrorCategory,
        #[source]
        source: io::Error,
    },
    #[error("{operation} cancelled")]
    Cancelled { operation: OperationKind },
    #[error("{operation}: no socket address resolved for `{target}`")]
    Unresolved {
        operation: OperationKind,
        target: String,
    },
    #[error("{operation}: connection already closed")]
    Closed { operation: OperationKind },
}

impl TransportError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { operation, .. } | Self::Unresolved { operation, .. } => operation.code,
            Self::Cancelled { .. } => CANCEL_CODE,
            Self::Closed { .. } => CLOSED_CODE,
        }
    }

    pub fn operation(&self) -> OperationKind {
        match self {
            Self::Io { operation, .. }
            | Self::Cancelled { operation }
            | Self::Unresolved { operation, .. }
            | Self::Closed { operation } => *operation,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io { category, .. } => *category,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
            Self::Closed { .. } => ErrorCategory::PeerClosed,
            Self::Unresolved { .. } => ErrorCategory::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    pub fn is_peer_closed(&self) -> bool {
        self.category() == ErrorCategory::PeerClosed
    }

    pub fn is_cancelled(&self) -> bool {
        self.category() == ErrorCategory::Cancelled
    }

    /// 底层 `io::ErrorKind`，非 I/O 变体返回 `None`。
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// 是否为 `EMFILE`/`ENFILE`/`ENOMEM` 这类资源耗尽错误。
    pub fn is_resource_exhausted(&self) -> bool {
        match self {
            Self::Io { source, .. } => is_resource_exhausted(source),
            _ => false,
        }
    }
}

impl TransportError {
    /// 把 `operation` 阶段的 IO 错误包装为传输错误，分类规则与本 crate 内部一致。
    pub fn from_io(operation: OperationKind, error: io::Error) -> Self {
        let category = categorize_io_error(operation, &error);
        Self::Io {
            operation,
            category,
            source: error,
        }
    }
}

pub(crate) fn map_io_error(operation: OperationKind, error: io::Error) -> TransportError {
    TransportError::from_io(operation, error)
}

pub(crate) fn cancelled_error(operation: OperationKind) -> TransportError {
    TransportError::Cancelled { operation }
}

fn is_resource_exhausted(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::OutOfMemory || is_descriptor_exhausted(error)
}

#[cfg(unix)]
fn is_descriptor_exhausted(error: &io::Error) -> bool {
    matches!(error.raw_os_error(), Some(EMFILE) | Some(ENFILE))
}

#[cfg(not(unix))]
fn is_descriptor_exhausted(_error: &io::Error) -> bool {
    false
}

fn categorize_io_error(operation: OperationKind, error: &io::Error) -> ErrorCategory {
    use io::ErrorKind;

    // 套接字选项与地址查询只作用于刚接受或刚拨出的那一条连接，失败不波及监听器。
    if operation == CONFIGURE {
        return ErrorCategory::Transient;
    }

    if operation == ACCEPT {
        if is_resource_exhausted(error) {
            return ErrorCategory::Transient;
        }
        return match error.kind() {
            ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut => ErrorCategory::Transient,
            _ => ErrorCategory::Fatal,
        };
    }

    match error.kind() {
        ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::UnexpectedEof
        | ErrorKind::WriteZero => ErrorCategory::PeerClosed,
        ErrorKind::Interrupted | ErrorKind::WouldBlock => ErrorCategory::Transient,
        _ => ErrorCategory::Fatal,
    }
}
