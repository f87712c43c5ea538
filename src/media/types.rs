//! 介质层数据类型

use crate::error::Result;
use bitflags::bitflags;

/// 介质配置
#[derive(Debug, Clone, Copy)]
pub struct MediaConfig {
    /// 介质在外部地址空间中的起始地址，读写地址减去它后再做地址转换
    pub base_address: u64,
    /// 写保护
    pub protected: bool,
    /// 可移除介质
    pub removable: bool,
    /// 刷新定时器到期时是否同时保存映射表
    pub sync_on_timer: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            base_address: 0,
            protected: false,
            removable: false,
            sync_on_timer: true,
        }
    }
}

/// 介质状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    /// 未初始化或已关闭
    NotReady,
    /// 空闲
    Ready,
    /// 正在传输
    Busy,
}

bitflags! {
    /// 介质属性标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MediaFlags: u8 {
        /// 写保护
        const PROTECTED = 0x01;
        /// 可移除
        const REMOVABLE = 0x02;
    }
}

impl From<&MediaConfig> for MediaFlags {
    fn from(config: &MediaConfig) -> Self {
        let mut flags = MediaFlags::empty();
        flags.set(MediaFlags::PROTECTED, config.protected);
        flags.set(MediaFlags::REMOVABLE, config.removable);
        flags
    }
}

/// 一次传输的完成报告
///
/// 传给完成回调，异步调用者（例如 USB 大容量存储）据此得知进度
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// 传输结果
    pub status: Result<()>,
    /// 已传输字节数
    pub transferred: usize,
    /// 剩余字节数
    pub remaining: usize,
}

/// 介质统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaStats {
    /// 读请求次数
    pub reads: u64,
    /// 写请求次数
    pub writes: u64,
    /// 已读字节数
    pub bytes_read: u64,
    /// 已写字节数（进入页缓存即计入）
    pub bytes_written: u64,
    /// 失败的请求次数
    pub errors: u64,
}
