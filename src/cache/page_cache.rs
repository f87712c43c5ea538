//! 非对齐页缓存
//!
//! 一个写缓冲 + 一个读缓冲，使调用者可以按任意偏移和长度读写页，而不必每次都
//! 做一次"读-改-写"。
//!
//! # 写入策略
//!
//! - 部分页写入：写回（write-back），数据留在写缓冲，直到写满一页、切换到其他页
//!   或显式刷新
//! - 写到页尾：写穿（write-through），立即写入设备
//! - 显式刷新失败：保留写缓冲以便重试；切换到其他页时旧页仍写不进去则丢弃
//!
//! # 一致性
//!
//! - 写缓冲首次装入某页且本次写入不覆盖整页时，先从设备读出原内容
//! - 读缓冲与写缓冲缓存同一页时，写入同步到读缓冲
//! - 读取写缓冲中的页时，从写缓冲复制，不读设备上的旧数据

use super::buffer::{PageBuffer, PageSlot};
use crate::error::{Error, ErrorKind, Result};
use crate::mapped::MappedNandFlash;
use crate::nand::NandDevice;

/// 页缓存统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCacheStats {
    /// 读缓冲命中次数
    pub read_hits: u64,
    /// 从写缓冲装入读缓冲的次数
    pub read_from_write_buffer: u64,
    /// 从设备读入读缓冲的次数
    pub read_misses: u64,
    /// 写缓冲装入时的预读次数
    pub preloads: u64,
    /// 写缓冲刷新到设备的次数
    pub flushes: u64,
    /// 换页时因写入失败而丢弃的页数
    pub dropped: u64,
}

/// 非对齐页缓存
pub struct PageCache {
    write: PageBuffer,
    read: PageBuffer,
    page_size: usize,
    stats: PageCacheStats,
}

impl PageCache {
    /// 创建页缓存
    ///
    /// # 参数
    ///
    /// * `page_size` - 页数据区大小（字节）
    pub fn new(page_size: usize) -> Self {
        Self {
            write: PageBuffer::new(page_size),
            read: PageBuffer::new(page_size),
            page_size,
            stats: PageCacheStats::default(),
        }
    }

    /// 页数据区大小
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// 写缓冲当前缓存的页
    pub fn write_slot(&self) -> Option<PageSlot> {
        self.write.slot()
    }

    /// 读缓冲当前缓存的页
    pub fn read_slot(&self) -> Option<PageSlot> {
        self.read.slot()
    }

    /// 获取统计信息
    pub fn stats(&self) -> PageCacheStats {
        self.stats
    }

    /// 向页内写入一段数据
    ///
    /// # 参数
    ///
    /// * `mapped` - 映射设备
    /// * `block` - 逻辑块号
    /// * `page` - 块内页号
    /// * `offset` - 页内偏移
    /// * `buf` - 源数据，`offset + buf.len()` 不得超过页大小
    ///
    /// # 错误
    ///
    /// - 范围超出页：`InvalidInput`
    /// - 逻辑块未映射：`BlockNotMapped`
    /// - 预读失败时的设备错误
    /// - 写到页尾后立即刷新失败时的设备错误，此时本次数据已留在写缓冲中
    pub fn write_page_region<D: NandDevice>(
        &mut self,
        mapped: &mut MappedNandFlash<D>,
        block: u16,
        page: u16,
        offset: usize,
        buf: &[u8],
    ) -> Result<()> {
        let size = buf.len();
        log::trace!("[PCACHE] write B#{}:P#{}@{}, {}", block, page, offset, size);

        if offset + size > self.page_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Write size and offset exceed page data size",
            ));
        }
        if size == 0 {
            return Ok(());
        }
        if mapped.logical_to_physical(block).is_none() {
            return Err(Error::new(ErrorKind::BlockNotMapped, "Logical block is not mapped"));
        }

        let slot = PageSlot::new(block, page);
        if !self.write.holds(slot) {
            // 旧页写入失败则丢弃，读缓冲中的同一页也随之失效
            if let Err(e) = self.flush_write_page(mapped) {
                if let Some(failed) = self.write.slot() {
                    log::error!(
                        "[PCACHE] dropping unwritable page B#{}:P#{}: {}",
                        failed.block,
                        failed.page,
                        e
                    );
                    if self.read.holds(failed) {
                        self.read.clear();
                    }
                }
                self.stats.dropped += 1;
                self.write.clear();
            }
            log::debug!("[PCACHE] current write page: B#{}:P#{}", block, page);

            // 不是整页写入，先读出原内容
            if size != self.page_size {
                self.stats.preloads += 1;
                if let Err(e) = mapped.read_page(block, page, &mut self.write.data) {
                    log::error!("[PCACHE] could not read existing page data: {}", e);
                    return Err(e);
                }
            }
            self.write.assign(slot);
        }

        self.write.data[offset..offset + size].copy_from_slice(buf);
        self.write.mark_dirty();

        if self.read.holds(slot) {
            log::trace!("[PCACHE] updating current read buffer");
            self.read.data[offset..offset + size].copy_from_slice(buf);
        }

        // 写到页尾，立即刷新
        if offset + size == self.page_size {
            self.flush_write_page(mapped)?;
        }

        Ok(())
    }

    /// 从页内读取一段数据
    ///
    /// # 参数
    ///
    /// * `mapped` - 映射设备
    /// * `block` - 逻辑块号
    /// * `page` - 块内页号
    /// * `offset` - 页内偏移
    /// * `buf` - 目标缓冲区，`offset + buf.len()` 不得超过页大小
    pub fn read_page_region<D: NandDevice>(
        &mut self,
        mapped: &mut MappedNandFlash<D>,
        block: u16,
        page: u16,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<()> {
        let size = buf.len();
        log::trace!("[PCACHE] read B#{}:P#{}@{}, {}", block, page, offset, size);

        if offset + size > self.page_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Read size and offset exceed page data size",
            ));
        }
        if mapped.logical_to_physical(block).is_none() {
            return Err(Error::new(ErrorKind::BlockNotMapped, "Logical block is not mapped"));
        }

        let slot = PageSlot::new(block, page);
        if self.read.holds(slot) {
            self.stats.read_hits += 1;
        } else if self.write.holds(slot) {
            log::trace!("[PCACHE] reading current write page");
            self.stats.read_from_write_buffer += 1;
            self.read.data.copy_from_slice(&self.write.data);
            self.read.assign(slot);
        } else {
            self.stats.read_misses += 1;
            if let Err(e) = mapped.read_page(block, page, &mut self.read.data) {
                // 读缓冲内容已不可信
                self.read.clear();
                return Err(e);
            }
            self.read.assign(slot);
        }

        buf.copy_from_slice(&self.read.data[offset..offset + size]);
        Ok(())
    }

    /// 把写缓冲中的页写入设备
    ///
    /// 没有待写页时什么也不做。写入失败时保留写缓冲，便于重试；
    /// 之后若写入其他页，失败的页被丢弃。
    pub fn flush_write_page<D: NandDevice>(
        &mut self,
        mapped: &mut MappedNandFlash<D>,
    ) -> Result<()> {
        let slot = match self.write.slot() {
            Some(slot) if self.write.is_dirty() => slot,
            _ => return Ok(()),
        };

        log::debug!("[PCACHE] flush B#{}:P#{}", slot.block, slot.page);
        if let Err(e) = mapped.write_page(slot.block, slot.page, &self.write.data) {
            log::error!("[PCACHE] failed to write page B#{}:P#{}: {}", slot.block, slot.page, e);
            return Err(e);
        }

        self.stats.flushes += 1;
        self.write.clear();
        Ok(())
    }

    /// 丢弃指定逻辑块的缓存内容（不写入设备）
    ///
    /// 逻辑块被重新映射或取消映射后，缓冲中的页已不属于新物理块
    pub fn invalidate_block(&mut self, block: u16) {
        if self.write.holds_block(block) {
            log::warn!("[PCACHE] dropping buffered write page of LB#{}", block);
            self.write.clear();
        }
        if self.read.holds_block(block) {
            self.read.clear();
        }
    }

    /// 丢弃全部缓存内容（不写入设备）
    pub fn invalidate(&mut self) {
        self.write.clear();
        self.read.clear();
    }
}

impl core::fmt::Debug for PageCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageCache")
            .field("page_size", &self.page_size)
            .field("write", &self.write)
            .field("read", &self.read)
            .field("stats", &self.stats)
            .finish()
    }
}
