//! NAND 介质
//!
//! 字节地址视图：把 `(address, length)` 拆成逐页的 `(块, 页, 偏移)` 访问，
//! 经页缓存和逻辑映射读写设备。

use super::lock::{MediaLock, NoLock};
use super::types::{MediaConfig, MediaFlags, MediaState, MediaStats, TransferReport};
use crate::cache::{PageCache, PageCacheStats, PageSlot};
use crate::error::{Error, ErrorKind, Result};
use crate::mapped::MappedNandFlash;
use crate::mapping::ReconcileReport;
use crate::nand::{BlockStatus, EraseLevel, NandDevice, NandModel};
use core::ops::Range;

/// NAND 介质
///
/// 持有映射设备和页缓存。写入只保证进入页缓存，调用 [`flush`](Self::flush)
/// 后数据才落到设备，调用 [`sync`](Self::sync) 后映射表才持久化。
///
/// # 示例
///
/// ```rust,ignore
/// use mapped_nand::{MappedNandFlash, MemNandFlash, NandMedia, NandModel};
///
/// let nand = MemNandFlash::new(NandModel::new(2048, 64, 256)?);
/// let mut media = NandMedia::new(MappedNandFlash::new(nand)?);
///
/// media.map(0, 10)?;
/// media.write(100, b"hello")?;
/// media.sync()?;
/// ```
pub struct NandMedia<D, L = NoLock> {
    mapped: MappedNandFlash<D>,
    cache: PageCache,
    lock: L,
    config: MediaConfig,
    flags: MediaFlags,
    state: MediaState,
    stats: MediaStats,
}

impl<D: NandDevice> NandMedia<D, NoLock> {
    /// 使用默认配置创建介质
    pub fn new(mapped: MappedNandFlash<D>) -> Self {
        Self::with_config(mapped, MediaConfig::default())
    }

    /// 使用指定配置创建介质
    pub fn with_config(mapped: MappedNandFlash<D>, config: MediaConfig) -> Self {
        Self::with_lock(mapped, config, NoLock)
    }
}

impl<D: NandDevice, L: MediaLock> NandMedia<D, L> {
    /// 使用自定义锁创建介质
    pub fn with_lock(mapped: MappedNandFlash<D>, config: MediaConfig, lock: L) -> Self {
        let model = mapped.model();
        log::info!(
            "[MEDIA] NAND media: {} blocks x {} pages x {} bytes, base {:#x}",
            model.device_size_in_blocks(),
            model.block_size_in_pages(),
            model.page_data_size(),
            config.base_address
        );

        Self {
            cache: PageCache::new(model.page_data_size() as usize),
            mapped,
            lock,
            flags: MediaFlags::from(&config),
            config,
            state: MediaState::Ready,
            stats: MediaStats::default(),
        }
    }

    /// 映射设备
    pub fn mapped(&self) -> &MappedNandFlash<D> {
        &self.mapped
    }

    /// 取回映射设备（缓冲中未刷新的数据被丢弃）
    pub fn into_inner(self) -> MappedNandFlash<D> {
        if self.cache.write_slot().is_some() {
            log::warn!("[MEDIA] dropping unflushed write page");
        }
        self.mapped
    }

    /// 设备几何
    pub fn model(&self) -> NandModel {
        self.mapped.model()
    }

    /// 介质容量（字节）
    pub fn size(&self) -> u64 {
        self.mapped.model().device_size_in_bytes()
    }

    /// 介质配置
    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    /// 介质状态
    pub fn state(&self) -> MediaState {
        self.state
    }

    /// 介质属性标志
    pub fn flags(&self) -> MediaFlags {
        self.flags
    }

    /// 是否已初始化
    pub fn is_initialized(&self) -> bool {
        self.state != MediaState::NotReady
    }

    /// 统计信息
    pub fn stats(&self) -> MediaStats {
        self.stats
    }

    /// 页缓存统计信息
    pub fn cache_stats(&self) -> PageCacheStats {
        self.cache.stats()
    }

    /// 从介质读取数据
    ///
    /// # 参数
    ///
    /// * `address` - 起始地址（含 `base_address`）
    /// * `buf` - 目标缓冲区，长度即读取字节数
    ///
    /// # 返回
    ///
    /// 成功返回读取的字节数
    pub fn read(&mut self, address: u64, buf: &mut [u8]) -> Result<usize> {
        self.read_with(address, buf, |_| {})
    }

    /// 从介质读取数据，完成后调用 `callback`
    ///
    /// 回调在返回前同步调用，出错时报告中包含已读字节数。
    pub fn read_with<F>(&mut self, address: u64, buf: &mut [u8], callback: F) -> Result<usize>
    where
        F: FnOnce(&TransferReport),
    {
        log::trace!("[MEDIA] read {:#x}, {}", address, buf.len());
        self.stats.reads += 1;

        let result = self.begin().and_then(|_| {
            let report = self.read_pages(address, buf);
            self.end();
            Ok(report)
        });
        self.finish(result, buf.len(), callback, |stats, n| stats.bytes_read += n)
    }

    /// 向介质写入数据
    ///
    /// 逻辑块必须事先映射。写入的数据可能仍在页缓存中。
    ///
    /// # 返回
    ///
    /// 成功返回写入的字节数
    ///
    /// # 错误
    ///
    /// - 介质写保护：`PermissionDenied`
    /// - 逻辑块未映射：`BlockNotMapped`
    pub fn write(&mut self, address: u64, buf: &[u8]) -> Result<usize> {
        self.write_with(address, buf, |_| {})
    }

    /// 向介质写入数据，完成后调用 `callback`
    ///
    /// 某页写满后立即写入设备失败时，该页数据已留在写缓冲中，计入
    /// `transferred`，由之后的 [`flush`](Self::flush) 重试。
    pub fn write_with<F>(&mut self, address: u64, buf: &[u8], callback: F) -> Result<usize>
    where
        F: FnOnce(&TransferReport),
    {
        log::trace!("[MEDIA] write {:#x}, {}", address, buf.len());
        self.stats.writes += 1;

        let result = if self.flags.contains(MediaFlags::PROTECTED) {
            log::warn!("[MEDIA] write rejected: media is write-protected");
            Err(Error::new(ErrorKind::PermissionDenied, "Media is write-protected"))
        } else {
            self.begin().and_then(|_| {
                let report = self.write_pages(address, buf);
                self.end();
                Ok(report)
            })
        };
        self.finish(result, buf.len(), callback, |stats, n| stats.bytes_written += n)
    }

    /// 把缓冲中的写页落到设备，再刷新设备
    pub fn flush(&mut self) -> Result<()> {
        self.begin()?;
        let result = self.flush_data();
        self.end();
        result
    }

    /// 刷新数据并保存映射表
    pub fn sync(&mut self) -> Result<()> {
        self.begin()?;
        let result = self
            .flush_data()
            .and_then(|_| self.mapped.save_logical_mapping());
        self.end();
        if let Err(ref e) = result {
            log::error!("[MEDIA] sync failed: {}", e);
        }
        result
    }

    /// 刷新定时器处理
    ///
    /// `sync_on_timer` 为 false 时只刷新数据，不保存映射表。
    pub fn handle_timer(&mut self) -> Result<()> {
        log::trace!("[MEDIA] flush timer");
        if self.config.sync_on_timer {
            self.sync()
        } else {
            self.flush()
        }
    }

    /// 同步并关闭介质
    pub fn close(&mut self) -> Result<()> {
        if !self.is_initialized() {
            return Ok(());
        }
        self.sync()?;
        self.state = MediaState::NotReady;
        log::info!("[MEDIA] closed");
        Ok(())
    }

    /// 关闭介质，不写回缓冲
    pub fn deinit(&mut self) {
        if self.cache.write_slot().is_some() {
            log::warn!("[MEDIA] deinit drops unflushed write page");
        }
        self.cache.invalidate();
        self.state = MediaState::NotReady;
    }

    /// 逻辑块对应的物理块
    pub fn logical_to_physical(&self, logical: u16) -> Option<u16> {
        self.mapped.logical_to_physical(logical)
    }

    /// 物理块对应的逻辑块
    pub fn physical_to_logical(&self, physical: u16) -> Option<u16> {
        self.mapped.physical_to_logical(physical)
    }

    /// 把逻辑块映射到物理块
    ///
    /// 缓冲中属于该逻辑块的页被丢弃。
    pub fn map(&mut self, logical: u16, physical: u16) -> Result<()> {
        self.mapped.map(logical, physical)?;
        self.cache.invalidate_block(logical);
        Ok(())
    }

    /// 取消逻辑块映射
    ///
    /// 缓冲中属于该逻辑块的页被丢弃。
    pub fn unmap(&mut self, logical: u16) -> Result<()> {
        self.mapped.unmap(logical)?;
        self.cache.invalidate_block(logical);
        Ok(())
    }

    /// 执行掉电恢复
    pub fn reconcile(&mut self) -> Result<ReconcileReport> {
        let report = self.mapped.reconcile()?;
        for &logical in &report.unmapped {
            self.cache.invalidate_block(logical);
        }
        Ok(report)
    }

    /// 擦除介质，丢弃全部缓冲
    pub fn erase_all(&mut self, level: EraseLevel) -> Result<()> {
        if self.flags.contains(MediaFlags::PROTECTED) {
            return Err(Error::new(ErrorKind::PermissionDenied, "Media is write-protected"));
        }
        self.cache.invalidate();
        self.mapped.erase_all(level)
    }

    /// 查询物理块状态
    pub fn block_status(&self, physical: u16) -> BlockStatus {
        self.mapped.block_status(physical)
    }

    fn begin(&mut self) -> Result<()> {
        if !self.is_initialized() {
            return Err(Error::new(ErrorKind::InvalidState, "Media is not initialized"));
        }
        self.lock.lock().map_err(|e| {
            log::warn!("[MEDIA] media lock unavailable: {}", e);
            e
        })?;
        self.state = MediaState::Busy;
        Ok(())
    }

    fn end(&mut self) {
        self.state = MediaState::Ready;
        if let Err(e) = self.lock.unlock() {
            log::warn!("[MEDIA] unlock failed: {}", e);
        }
    }

    fn flush_data(&mut self) -> Result<()> {
        self.cache.flush_write_page(&mut self.mapped)?;
        self.mapped.device_mut().flush()
    }

    fn chunks(&self, address: u64, length: usize) -> Result<PageChunks> {
        let relative = address.checked_sub(self.config.base_address).ok_or(Error::new(
            ErrorKind::InvalidInput,
            "Address below media base address",
        ))?;
        let model = self.mapped.model();
        let (block, page, offset) = model.translate_access(relative, length)?;
        Ok(PageChunks {
            block,
            page,
            offset: offset as usize,
            done: 0,
            length,
            page_size: model.page_data_size() as usize,
            pages_per_block: model.block_size_in_pages(),
        })
    }

    fn read_pages(&mut self, address: u64, buf: &mut [u8]) -> (usize, Result<()>) {
        let chunks = match self.chunks(address, buf.len()) {
            Ok(chunks) => chunks,
            Err(e) => return (0, Err(e)),
        };

        let mut done = 0;
        for (block, page, offset, range) in chunks {
            let end = range.end;
            if let Err(e) = self
                .cache
                .read_page_region(&mut self.mapped, block, page, offset, &mut buf[range])
            {
                log::error!("[MEDIA] read of B#{}:P#{} failed: {}", block, page, e);
                return (done, Err(e));
            }
            done = end;
        }
        (done, Ok(()))
    }

    fn write_pages(&mut self, address: u64, buf: &[u8]) -> (usize, Result<()>) {
        let chunks = match self.chunks(address, buf.len()) {
            Ok(chunks) => chunks,
            Err(e) => return (0, Err(e)),
        };

        let mut done = 0;
        for (block, page, offset, range) in chunks {
            let end = range.end;
            if let Err(e) = self
                .cache
                .write_page_region(&mut self.mapped, block, page, offset, &buf[range])
            {
                log::error!("[MEDIA] write of B#{}:P#{} failed: {}", block, page, e);
                // 写穿失败的页仍在写缓冲中，下次刷新时重试
                if self.cache.write_slot() == Some(PageSlot::new(block, page)) {
                    done = end;
                }
                return (done, Err(e));
            }
            done = end;
        }
        (done, Ok(()))
    }

    fn finish<F, S>(
        &mut self,
        result: Result<(usize, Result<()>)>,
        length: usize,
        callback: F,
        count: S,
    ) -> Result<usize>
    where
        F: FnOnce(&TransferReport),
        S: FnOnce(&mut MediaStats, u64),
    {
        let (transferred, status) = match result {
            Ok(report) => report,
            Err(e) => (0, Err(e)),
        };
        count(&mut self.stats, transferred as u64);
        if status.is_err() {
            self.stats.errors += 1;
        }

        callback(&TransferReport {
            status: status.clone(),
            transferred,
            remaining: length - transferred,
        });
        status.map(|_| transferred)
    }
}

impl<D, L> core::fmt::Debug for NandMedia<D, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NandMedia")
            .field("config", &self.config)
            .field("flags", &self.flags)
            .field("state", &self.state)
            .field("cache", &self.cache)
            .field("stats", &self.stats)
            .finish()
    }
}

/// 逐页拆分一次访问：产出 (块, 页, 页内偏移, 缓冲区范围)
struct PageChunks {
    block: u16,
    page: u16,
    offset: usize,
    done: usize,
    length: usize,
    page_size: usize,
    pages_per_block: u16,
}

impl Iterator for PageChunks {
    type Item = (u16, u16, usize, Range<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done >= self.length {
            return None;
        }

        let chunk = (self.page_size - self.offset).min(self.length - self.done);
        let item = (self.block, self.page, self.offset, self.done..self.done + chunk);

        self.done += chunk;
        self.offset = 0;
        self.page += 1;
        if self.page == self.pages_per_block {
            self.page = 0;
            self.block += 1;
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::BusyLock;
    use crate::nand::MemNandFlash;
    use alloc::vec;
    use alloc::vec::Vec;

    fn media(page: u16, pages: u16, blocks: u16) -> NandMedia<MemNandFlash> {
        let nand = MemNandFlash::new(NandModel::new(page, pages, blocks).unwrap());
        NandMedia::new(MappedNandFlash::new(nand).unwrap())
    }

    #[test]
    fn test_write_flush_read() {
        let mut media = media(4, 2, 4);
        media.map(0, 1).unwrap();

        assert_eq!(media.write(0, &[1, 2, 3, 4]).unwrap(), 4);
        media.flush().unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(media.read(0, &mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(media.block_status(1), BlockStatus::Live);
        assert_eq!(media.mapped().device().raw_page(1, 0), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_small_geometry_cannot_sync() {
        let mut media = media(4, 2, 4);
        media.map(0, 1).unwrap();
        assert_eq!(media.sync().unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(media.state(), MediaState::Ready);
    }

    #[test]
    fn test_read_after_unmap() {
        let mut media = media(4, 2, 4);
        media.map(0, 1).unwrap();
        media.unmap(0).unwrap();

        let mut buf = [0u8; 1];
        assert_eq!(
            media.read(0, &mut buf).unwrap_err().kind(),
            ErrorKind::BlockNotMapped
        );
        assert_eq!(media.block_status(1), BlockStatus::Free);
    }

    #[test]
    fn test_fresh_device() {
        let media = media(8, 4, 8);
        assert_eq!(media.mapped().mapping().mapping_block(), None);
        for block in 0..8 {
            assert_eq!(media.logical_to_physical(block), None);
        }
    }

    #[test]
    fn test_reconcile_frees_orphan_block() {
        let mut nand = MemNandFlash::new(NandModel::new(8, 4, 8).unwrap());
        nand.set_block_status(2, BlockStatus::Live);
        let mut media = NandMedia::new(MappedNandFlash::new(nand).unwrap());

        let report = media.reconcile().unwrap();
        assert_eq!(report.released, vec![2]);
        assert_eq!(media.block_status(2), BlockStatus::Free);
    }

    #[test]
    fn test_write_then_read_before_flush() {
        let mut media = media(8, 4, 8);
        media.map(0, 3).unwrap();

        media.write(2, &[7, 8, 9]).unwrap();
        let mut buf = [0u8; 3];
        media.read(2, &mut buf).unwrap();
        assert_eq!(buf, [7, 8, 9]);
        assert_eq!(media.mapped().device().page_programs(), 0);
    }

    #[test]
    fn test_partial_write_integrity() {
        let mut media = media(8, 4, 8);
        media.map(0, 3).unwrap();
        media.write(8, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        media.write(11, &[0xA0, 0xA1]).unwrap();
        media.flush().unwrap();

        let mut page = [0u8; 8];
        media.read(8, &mut page).unwrap();
        assert_eq!(page, [1, 2, 3, 0xA0, 0xA1, 6, 7, 8]);
    }

    #[test]
    fn test_write_across_block_boundary() {
        let mut media = media(4, 2, 8);
        media.map(0, 2).unwrap();
        media.map(1, 5).unwrap();

        // 页 1 后半 + 下一块页 0 整页
        media.write(6, &[1, 2, 3, 4, 5, 6]).unwrap();
        media.flush().unwrap();

        assert_eq!(media.mapped().device().raw_page(2, 1), &[0xFF, 0xFF, 1, 2]);
        assert_eq!(media.mapped().device().raw_page(5, 0), &[3, 4, 5, 6]);

        let mut buf = [0u8; 6];
        media.read(6, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_page_chunks() {
        let chunks: Vec<_> = PageChunks {
            block: 0,
            page: 1,
            offset: 3,
            done: 0,
            length: 10,
            page_size: 4,
            pages_per_block: 2,
        }
        .collect();

        assert_eq!(
            chunks,
            vec![(0, 1, 3, 0..1), (1, 0, 0, 1..5), (1, 1, 0, 5..9), (2, 0, 0, 9..10)]
        );
    }

    #[test]
    fn test_callback_reports_partial_transfer() {
        let mut media = media(4, 2, 8);
        media.map(0, 2).unwrap();

        let mut seen = None;
        let err = media
            .write_with(4, &[1; 8], |report| seen = Some(report.clone()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BlockNotMapped);

        let report = seen.unwrap();
        assert_eq!(report.transferred, 4);
        assert_eq!(report.remaining, 4);
        assert_eq!(report.status.unwrap_err().kind(), ErrorKind::BlockNotMapped);
        assert_eq!(media.stats().errors, 1);
        assert_eq!(media.stats().bytes_written, 4);
    }

    #[test]
    fn test_callback_on_success() {
        let mut media = media(4, 2, 8);
        media.map(0, 2).unwrap();
        media.write(0, &[5; 8]).unwrap();

        let mut buf = [0u8; 8];
        let mut seen = None;
        media
            .read_with(0, &mut buf, |report| seen = Some(report.clone()))
            .unwrap();
        assert_eq!(
            seen,
            Some(TransferReport {
                status: Ok(()),
                transferred: 8,
                remaining: 0
            })
        );
    }

    #[test]
    fn test_access_past_end() {
        let mut media = media(4, 2, 4);
        media.map(3, 0).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(
            media.read(30, &mut buf).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_base_address() {
        let nand = MemNandFlash::new(NandModel::new(4, 2, 4).unwrap());
        let config = MediaConfig {
            base_address: 0x1000,
            ..MediaConfig::default()
        };
        let mut media = NandMedia::with_config(MappedNandFlash::new(nand).unwrap(), config);
        media.map(0, 1).unwrap();

        media.write(0x1004, &[4, 3, 2, 1]).unwrap();
        assert_eq!(media.mapped().device().raw_page(1, 1), &[4, 3, 2, 1]);

        let mut buf = [0u8; 1];
        assert_eq!(
            media.read(0x0FFF, &mut buf).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_write_protected() {
        let nand = MemNandFlash::new(NandModel::new(4, 2, 4).unwrap());
        let config = MediaConfig {
            protected: true,
            ..MediaConfig::default()
        };
        let mut media = NandMedia::with_config(MappedNandFlash::new(nand).unwrap(), config);
        media.map(0, 1).unwrap();

        assert!(media.flags().contains(MediaFlags::PROTECTED));
        assert_eq!(
            media.write(0, &[1]).unwrap_err().kind(),
            ErrorKind::PermissionDenied
        );
        let mut buf = [0u8; 4];
        media.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 4]);
    }

    #[test]
    fn test_not_ready_after_deinit() {
        let mut media = media(4, 2, 4);
        media.map(0, 1).unwrap();
        media.write(0, &[1]).unwrap();

        media.deinit();
        assert!(!media.is_initialized());
        assert_eq!(media.mapped().device().page_programs(), 0);

        let mut buf = [0u8; 1];
        assert_eq!(
            media.read(0, &mut buf).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(media.flush().unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_sync_and_reopen() {
        let mut media = media(8, 4, 8);
        media.map(0, 4).unwrap();
        media.map(5, 6).unwrap();
        media.write(3, b"nand").unwrap();
        media.write(5 * 32, b"map").unwrap();
        media.close().unwrap();
        assert!(!media.is_initialized());
        assert!(!media.mapped().is_mapping_dirty());

        let nand = media.into_inner().into_inner();
        let mut media = NandMedia::new(MappedNandFlash::new(nand).unwrap());
        assert_eq!(media.logical_to_physical(0), Some(4));
        assert_eq!(media.logical_to_physical(5), Some(6));

        let mut buf = [0u8; 4];
        media.read(3, &mut buf).unwrap();
        assert_eq!(&buf, b"nand");
        let mut buf = [0u8; 3];
        media.read(5 * 32, &mut buf).unwrap();
        assert_eq!(&buf, b"map");
    }

    #[test]
    fn test_handle_timer_flushes() {
        let nand = MemNandFlash::new(NandModel::new(8, 4, 8).unwrap());
        let config = MediaConfig {
            sync_on_timer: false,
            ..MediaConfig::default()
        };
        let mut media = NandMedia::with_config(MappedNandFlash::new(nand).unwrap(), config);
        media.map(1, 2).unwrap();
        media.write(32, &[1, 2]).unwrap();

        media.handle_timer().unwrap();
        assert_eq!(&media.mapped().device().raw_page(2, 0)[..2], &[1, 2]);
        assert!(media.mapped().is_mapping_dirty());

        let mut media = NandMedia::new(media.into_inner());
        media.handle_timer().unwrap();
        assert!(!media.mapped().is_mapping_dirty());
    }

    #[test]
    fn test_remap_drops_buffered_page() {
        let mut media = media(8, 4, 8);
        media.map(0, 1).unwrap();
        media.write(0, &[1, 2]).unwrap();

        media.map(0, 2).unwrap();
        media.flush().unwrap();
        assert_eq!(media.mapped().device().page_programs(), 0);
        assert_eq!(media.block_status(1), BlockStatus::Free);
    }

    #[test]
    fn test_erase_all_drops_cache() {
        let mut media = media(8, 4, 8);
        media.map(0, 1).unwrap();
        media.write(0, &[1, 2]).unwrap();

        media.erase_all(EraseLevel::Data).unwrap();
        assert_eq!(media.logical_to_physical(0), None);
        media.flush().unwrap();
        assert_eq!(media.mapped().device().page_programs(), 0);
    }

    #[test]
    fn test_busy_lock_released_after_transfer() {
        let nand = MemNandFlash::new(NandModel::new(4, 2, 4).unwrap());
        let mut media = NandMedia::with_lock(
            MappedNandFlash::new(nand).unwrap(),
            MediaConfig::default(),
            BusyLock::new(),
        );
        media.map(0, 1).unwrap();
        media.write(0, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 1];
        // 逻辑块 1 未映射
        media.read(8, &mut buf).unwrap_err();
        media.flush().unwrap();
        assert_eq!(media.state(), MediaState::Ready);
    }

    #[test]
    fn test_shared_lock_held_elsewhere() {
        let lock = BusyLock::new();
        let nand = MemNandFlash::new(NandModel::new(4, 2, 4).unwrap());
        let mut media = NandMedia::with_lock(
            MappedNandFlash::new(nand).unwrap(),
            MediaConfig::default(),
            &lock,
        );
        media.map(0, 1).unwrap();

        // 定时器中断持有锁
        lock.lock().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(media.read(0, &mut buf).unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(media.flush().unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(media.stats().errors, 1);
        assert!(lock.is_locked());

        lock.unlock().unwrap();
        media.read(0, &mut buf).unwrap();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_bad_block_does_not_block_other_writes() {
        let mut media = media(8, 4, 8);
        media.map(0, 1).unwrap();
        media.map(1, 2).unwrap();
        media.write(0, &[1, 2]).unwrap();

        // 写缓冲中的页所在物理块坏掉
        media.mapped.device_mut().set_block_status(1, BlockStatus::Bad);
        assert_eq!(media.flush().unwrap_err().kind(), ErrorKind::WrongStatus);

        for i in 0..3u8 {
            media.write(32 + i as u64, &[i]).unwrap();
        }
        assert_eq!(media.cache_stats().dropped, 1);
        media.sync().unwrap();
        assert_eq!(&media.mapped().device().raw_page(2, 0)[..3], &[0, 1, 2]);
        assert!(!media.mapped().is_mapping_dirty());
    }

    #[test]
    fn test_failed_write_through_counts_buffered_page() {
        let mut media = media(4, 2, 8);
        media.map(0, 2).unwrap();
        media.mapped.device_mut().fail_programs_after(0);

        let mut seen = None;
        let err = media
            .write_with(0, &[6; 4], |report| seen = Some(report.clone()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        let report = seen.unwrap();
        assert_eq!(report.transferred, 4);
        assert_eq!(report.remaining, 0);

        media.mapped.device_mut().clear_program_failure();
        media.flush().unwrap();
        assert_eq!(media.mapped().device().raw_page(2, 0), &[6; 4]);
    }
}
