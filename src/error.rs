//! 错误与 errno
//!
//! 卷内部统一用 [`Error`] 传递失败，VFS 层通过 [`Error::errno`] 换成返回给用户态的值。

use core::fmt;

/// 一次失败：类别加一句静态描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 块读不出来，或读完仍不是最新
    Io,
    /// 调用参数不合法，例如空名字或过长的名字
    InvalidInput,
    /// 磁盘上的记录自相矛盾
    Corrupted,
    /// 没有这个属性
    NotFound,
    /// 属性已存在而调用者要求新建
    AlreadyExists,
    /// 分配内存失败
    NoMemory,
    /// 值大于允许的上限
    TooBig,
    /// 调用者给的缓冲区放不下
    Range,
    /// 卷上没有空闲块
    NoSpace,
    /// 未知的名字空间
    Unsupported,
    /// 事务已在进行
    Busy,
    /// 调用时机不对，例如没有活动事务
    InvalidState,
}

impl ErrorKind {
    /// 正的 errno 值
    ///
    /// 损坏映射到 `EFSCORRUPTED`（与 `EUCLEAN` 同值），属性不存在映射到
    /// `ENODATA`，和 xattr 系统调用的惯例一致。
    pub const fn errno(self) -> i32 {
        match self {
            ErrorKind::Io => 5,
            ErrorKind::TooBig => 7,
            ErrorKind::NoMemory => 12,
            ErrorKind::Busy => 16,
            ErrorKind::AlreadyExists => 17,
            ErrorKind::InvalidInput | ErrorKind::InvalidState => 22,
            ErrorKind::NoSpace => 28,
            ErrorKind::Range => 34,
            ErrorKind::NotFound => 61,
            ErrorKind::Unsupported => 95,
            ErrorKind::Corrupted => 117,
        }
    }
}

impl Error {
    /// 以类别和描述构造
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 类别
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 描述
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// 等价于 `self.kind().errno()`
    pub const fn errno(&self) -> i32 {
        self.kind.errno()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind, "")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{:?} (errno {})", self.kind, self.errno())
        } else {
            write!(f, "{:?} (errno {}): {}", self.kind, self.errno(), self.message)
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// 本 crate 的结果类型
pub type Result<T> = core::result::Result<T, Error>;
