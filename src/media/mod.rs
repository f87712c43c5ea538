//! 介质层
//!
//! 在映射设备之上提供按字节寻址的读写接口：
//!
//! - [`NandMedia`] - 地址转换、逐页传输、刷新与同步
//! - [`MediaLock`] - 外部互斥接口
//! - [`MediaConfig`] / [`MediaFlags`] / [`MediaState`] - 配置与状态
//! - [`MediaStats`] - 请求统计

mod lock;
mod nand_media;
mod types;

pub use lock::{BusyLock, MediaLock, NoLock};
pub use nand_media::NandMedia;
pub use types::{MediaConfig, MediaFlags, MediaState, MediaStats, TransferReport};
