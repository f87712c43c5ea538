//! NAND 设备抽象
//!
//! 映射层只依赖一个"受管理"的 NAND 设备：按块维护 FREE/LIVE/DIRTY/BAD 状态，
//! 按页读写数据区，ECC 和 spare 区由设备自行处理。
//!
//! - [`NandDevice`] - 设备能力接口（映射层只调用，不实现）
//! - [`NandModel`] - 设备几何（页大小、每块页数、块数）
//! - [`MemNandFlash`] - 内存中的 NAND 设备，用于测试和主机端模拟

mod mem;
mod model;

pub use mem::MemNandFlash;
pub use model::NandModel;

use crate::error::Result;

/// 物理块状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// 已擦除，可分配
    Free,
    /// 正在使用，数据有效
    Live,
    /// 已释放，等待回收擦除
    Dirty,
    /// 坏块，不可使用
    Bad,
}

/// 全盘擦除级别
///
/// 级别按顺序递增，`Data` 及以上会清除所有有效数据
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EraseLevel {
    /// 只回收 DIRTY 块
    Dirty,
    /// 擦除所有非坏块（DIRTY 和 LIVE）
    Data,
    /// 擦除所有块，包括坏块标记
    Full,
}

/// 受管理的 NAND 设备接口
///
/// 实现此 trait 以向映射层提供页级访问和块状态管理。
///
/// # 示例
///
/// ```rust,ignore
/// use mapped_nand::{NandDevice, NandModel, BlockStatus, EraseLevel, Result};
///
/// struct MyNand {
///     // ...
/// }
///
/// impl NandDevice for MyNand {
///     fn model(&self) -> NandModel {
///         NandModel::new(2048, 64, 1024).unwrap()
///     }
///
///     fn read_page(&mut self, block: u16, page: u16, data: &mut [u8]) -> Result<()> {
///         // 读取页并做 ECC 校验
///         Ok(())
///     }
///
///     // ...
/// }
/// ```
pub trait NandDevice {
    /// 设备几何
    fn model(&self) -> NandModel;

    /// 读取页数据区
    ///
    /// # 参数
    ///
    /// * `block` - 物理块号
    /// * `page` - 块内页号
    /// * `data` - 目标缓冲区（大小至少为页数据区大小）
    ///
    /// # 错误
    ///
    /// 块不是 LIVE 时返回 `WrongStatus`；ECC 失败返回 `Ecc`
    fn read_page(&mut self, block: u16, page: u16, data: &mut [u8]) -> Result<()>;

    /// 写入页数据区
    ///
    /// # 参数
    ///
    /// * `block` - 物理块号（必须为 LIVE）
    /// * `page` - 块内页号
    /// * `data` - 源数据（大小至少为页数据区大小）
    fn write_page(&mut self, block: u16, page: u16, data: &[u8]) -> Result<()>;

    /// 分配块（FREE -> LIVE）
    fn allocate_block(&mut self, block: u16) -> Result<()>;

    /// 释放块（LIVE -> DIRTY 或 FREE，由设备决定何时擦除）
    fn release_block(&mut self, block: u16) -> Result<()>;

    /// 查询块状态
    fn block_status(&self, block: u16) -> BlockStatus;

    /// 直接改写块状态
    ///
    /// 仅用于掉电恢复：映射表仍引用的 DIRTY 块需要重新视为 LIVE
    fn set_block_status(&mut self, block: u16, status: BlockStatus);

    /// 全盘擦除
    fn erase_all(&mut self, level: EraseLevel) -> Result<()>;

    /// 刷新设备内部缓冲
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
