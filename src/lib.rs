//! mapped_nand: NAND flash logical block mapping layer
//!
//! 在受管理 NAND 设备之上实现逻辑块到物理块的转换层：
//! - **逻辑块映射**：映射表保存在专用物理块中，上电时扫描恢复
//! - **掉电恢复**：加载映射表后对齐块状态，回收孤立块
//! - **非对齐页缓存**：单页写缓冲 + 单页读缓冲，支持任意偏移和长度的读写
//! - **字节寻址介质**：按地址读写，自动跨页、跨块
//!
//! # 示例
//!
//! ```rust,ignore
//! use mapped_nand::{MappedNandFlash, MemNandFlash, NandMedia, NandModel, Result};
//!
//! fn main() -> Result<()> {
//!     let nand = MemNandFlash::new(NandModel::new(2048, 64, 256)?);
//!     let mut media = NandMedia::new(MappedNandFlash::new(nand)?);
//!
//!     // 写入前必须先映射逻辑块
//!     media.map(0, 10)?;
//!     media.write(0, b"hello")?;
//!
//!     let mut buf = [0u8; 5];
//!     media.read(0, &mut buf)?;
//!
//!     // 数据落盘并保存映射表
//!     media.sync()?;
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`consts`] - 常量定义
//! - [`nand`] - NAND 设备接口、几何和内存模拟器
//! - [`mapping`] - 逻辑块映射表及其持久化
//! - [`mapped`] - 映射 NAND 设备
//! - [`cache`] - 非对齐页缓存
//! - [`media`] - 字节寻址介质

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// NAND 设备抽象
pub mod nand;

/// 逻辑块映射
pub mod mapping;

/// 映射 NAND 设备
pub mod mapped;

/// 页缓存
pub mod cache;

/// 介质层
pub mod media;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// NAND 设备
pub use nand::{BlockStatus, EraseLevel, MemNandFlash, NandDevice, NandModel};

// 映射
pub use mapping::{LogicalBlockMap, ReconcileReport};
pub use mapped::MappedNandFlash;

// Cache
pub use cache::{PageBuffer, PageCache, PageCacheStats, PageFlags, PageSlot};

// Media
pub use media::{
    BusyLock, MediaConfig, MediaFlags, MediaLock, MediaState, MediaStats, NandMedia, NoLock,
    TransferReport,
};
