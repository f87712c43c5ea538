//! 错误类型定义
//!
//! 提供映射 NAND 层各项操作的错误类型。

use core::fmt;

/// 映射 NAND 操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 逻辑块未映射到任何物理块
    BlockNotMapped,
    /// 块状态不满足前置条件（例如分配非 FREE 块）
    WrongStatus,
    /// 设备 I/O 错误（编程失败、擦除失败）
    Io,
    /// ECC 校验失败（不可纠正的读错误）
    Ecc,
    /// 无效参数
    InvalidInput,
    /// 没有可用的空闲块
    NoSpace,
    /// 持久化的映射表损坏
    Corrupted,
    /// 介质状态不允许该操作
    InvalidState,
    /// 介质写保护
    PermissionDenied,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// 是否为设备层故障（`Io` 或 `Ecc`）
    pub const fn is_device_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Io | ErrorKind::Ecc)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn test_error_display() {
        let err = Error::new(ErrorKind::BlockNotMapped, "logical block 3 not mapped");
        assert_eq!(format!("{}", err), "BlockNotMapped: logical block 3 not mapped");
        assert_eq!(err.kind(), ErrorKind::BlockNotMapped);
    }

    #[test]
    fn test_device_error_classification() {
        assert!(Error::new(ErrorKind::Io, "program failed").is_device_error());
        assert!(Error::new(ErrorKind::Ecc, "uncorrectable").is_device_error());
        assert!(!Error::new(ErrorKind::WrongStatus, "not free").is_device_error());
    }
}
