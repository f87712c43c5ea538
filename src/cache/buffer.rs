//! 页缓冲结构

use alloc::vec::Vec;
use bitflags::bitflags;

bitflags! {
    /// 页缓冲标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u8 {
        /// 缓冲内容有效
        const VALID = 0x01;
        /// 缓冲内容尚未写入设备
        const DIRTY = 0x02;
    }
}

/// 页地址（逻辑块, 块内页号）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSlot {
    /// 逻辑块号
    pub block: u16,
    /// 块内页号
    pub page: u16,
}

impl PageSlot {
    /// 创建页地址
    pub const fn new(block: u16, page: u16) -> Self {
        Self { block, page }
    }
}

/// 单页缓冲
///
/// 对应介质层里的"当前读页"或"当前写页"：一块页大小的数据区，加上它缓存的是哪一页。
pub struct PageBuffer {
    /// 缓存的页，None 表示空
    slot: Option<PageSlot>,
    /// 页数据
    pub data: Vec<u8>,
    /// 状态标志
    flags: PageFlags,
}

impl PageBuffer {
    /// 创建空缓冲
    pub fn new(page_size: usize) -> Self {
        Self {
            slot: None,
            data: alloc::vec![0u8; page_size],
            flags: PageFlags::empty(),
        }
    }

    /// 当前缓存的页
    pub fn slot(&self) -> Option<PageSlot> {
        if self.flags.contains(PageFlags::VALID) {
            self.slot
        } else {
            None
        }
    }

    /// 是否缓存了指定页
    pub fn holds(&self, slot: PageSlot) -> bool {
        self.slot() == Some(slot)
    }

    /// 是否缓存了指定逻辑块中的某一页
    pub fn holds_block(&self, block: u16) -> bool {
        self.slot().map(|slot| slot.block == block).unwrap_or(false)
    }

    /// 绑定到新页（数据由调用者填充）
    pub fn assign(&mut self, slot: PageSlot) {
        self.slot = Some(slot);
        self.flags = PageFlags::VALID;
    }

    /// 清空缓冲
    pub fn clear(&mut self) {
        self.slot = None;
        self.flags = PageFlags::empty();
    }

    /// 标记为脏
    pub fn mark_dirty(&mut self) {
        self.flags.insert(PageFlags::DIRTY);
    }

    /// 是否有未写入设备的数据
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(PageFlags::VALID | PageFlags::DIRTY)
    }

    /// 状态标志
    pub fn flags(&self) -> PageFlags {
        self.flags
    }
}

impl core::fmt::Debug for PageBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageBuffer")
            .field("slot", &self.slot)
            .field("data_len", &self.data.len())
            .field("flags", &self.flags)
            .finish()
    }
}
