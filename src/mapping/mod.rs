//! 逻辑块映射
//!
//! 维护逻辑块到物理块的映射表，并负责把映射表持久化到 NAND 上。
//!
//! # 主要组件
//!
//! - [`LogicalBlockMap`] - 内存中的映射表，每个逻辑块一项
//! - [`persist`] - 映射块的定位、加载、保存和掉电恢复
//! - [`pattern`] - 映射块签名字节
//!
//! # 映射块布局
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬─────┐
//! │   page 0     │   page 1     │   page 2     │ ... │
//! │  签名 pattern │ entries[0..] │ entries[..]  │     │
//! └──────────────┴──────────────┴──────────────┴─────┘
//! ```
//!
//! 映射块的位置不固定，启动时按内容扫描：第 0 页与签名完全一致的 LIVE 块即为
//! 映射块。签名总是最后写入，写了一半的映射块不会被误认。

pub mod persist;

pub use persist::{ReconcileReport, pattern};

use alloc::vec;
use alloc::vec::Vec;

/// 逻辑块映射表
///
/// 不变量：任意两个逻辑块不会映射到同一个物理块。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalBlockMap {
    /// `entries[i]` 为逻辑块 i 对应的物理块
    entries: Vec<Option<u16>>,
    /// 当前保存映射表的物理块
    mapping_block: Option<u16>,
    /// 自上次持久化以来是否被修改
    dirty: bool,
}

impl LogicalBlockMap {
    /// 创建空映射表（全部未映射）
    pub fn new(num_blocks: u16) -> Self {
        Self {
            entries: vec![None; num_blocks as usize],
            mapping_block: None,
            dirty: false,
        }
    }

    /// 表项数量（等于设备块数）
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否没有任何表项
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 逻辑块对应的物理块
    ///
    /// # Panics
    ///
    /// `logical` 超出设备块数
    pub fn logical_to_physical(&self, logical: u16) -> Option<u16> {
        assert!(
            (logical as usize) < self.entries.len(),
            "logical block {} out of range",
            logical
        );
        self.entries[logical as usize]
    }

    /// 物理块对应的逻辑块（线性查找）
    ///
    /// # Panics
    ///
    /// `physical` 超出设备块数
    pub fn physical_to_logical(&self, physical: u16) -> Option<u16> {
        assert!(
            (physical as usize) < self.entries.len(),
            "physical block {} out of range",
            physical
        );
        self.entries
            .iter()
            .position(|entry| *entry == Some(physical))
            .map(|logical| logical as u16)
    }

    /// 当前保存映射表的物理块
    pub fn mapping_block(&self) -> Option<u16> {
        self.mapping_block
    }

    /// 是否有未持久化的修改
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 已映射的逻辑块数量
    pub fn mapped_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    /// 遍历所有已映射的 (逻辑块, 物理块)
    pub fn iter(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(logical, entry)| entry.map(|physical| (logical as u16, physical)))
    }

    /// 设置表项并标记为脏
    pub(crate) fn set(&mut self, logical: u16, physical: Option<u16>) {
        assert!(
            (logical as usize) < self.entries.len(),
            "logical block {} out of range",
            logical
        );
        self.entries[logical as usize] = physical;
        self.dirty = true;
    }

    pub(crate) fn set_mapping_block(&mut self, block: Option<u16>) {
        self.mapping_block = block;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// 恢复为空映射表
    pub(crate) fn reset(&mut self) {
        self.entries.fill(None);
        self.mapping_block = None;
        self.dirty = false;
    }

    pub(crate) fn entries(&self) -> &[Option<u16>] {
        &self.entries
    }

    /// 直接替换全部表项（加载映射块时使用，不标记为脏）
    pub(crate) fn replace_entries(&mut self, entries: Vec<Option<u16>>) {
        debug_assert_eq!(entries.len(), self.entries.len());
        self.entries = entries;
    }
}
