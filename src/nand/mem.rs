//! 内存 NAND 设备
//!
//! 在 RAM 中模拟一个受管理的 NAND 设备：块状态表、页数据区、每页一个 CRC32
//! 作为 spare 区 ECC。支持故障注入（编程失败、页数据损坏、坏块），
//! 用于验证映射层的掉电恢复和错误传播。

use super::{BlockStatus, EraseLevel, NandDevice, NandModel};
use crate::consts::ERASED_BYTE;
use crate::error::{Error, ErrorKind, Result};
use alloc::vec;
use alloc::vec::Vec;

/// 内存 NAND 设备
///
/// 页可以被重复编程：擦除/拷贝回写策略属于受管理设备内部，映射层不关心。
pub struct MemNandFlash {
    model: NandModel,
    /// 全部页数据区，按 (块, 页) 顺序排列
    data: Vec<u8>,
    /// 每页的 ECC（None 表示擦除态）
    spare: Vec<Option<u32>>,
    /// 块状态表
    statuses: Vec<BlockStatus>,
    /// 释放块时只标记为 DIRTY，不立即擦除
    deferred_erase: bool,
    /// 剩余可成功编程的页数（None 表示不注入故障）
    programs_until_failure: Option<u32>,
    /// 物理读页次数
    page_reads: u64,
    /// 物理编程次数
    page_programs: u64,
}

impl MemNandFlash {
    /// 创建全部块为 FREE 的设备
    pub fn new(model: NandModel) -> Self {
        let blocks = model.device_size_in_blocks() as usize;
        let pages = blocks * model.block_size_in_pages() as usize;
        Self {
            model,
            data: vec![ERASED_BYTE; pages * model.page_data_size() as usize],
            spare: vec![None; pages],
            statuses: vec![BlockStatus::Free; blocks],
            deferred_erase: false,
            programs_until_failure: None,
            page_reads: 0,
            page_programs: 0,
        }
    }

    /// 释放块时保留为 DIRTY（模拟延迟回收）
    pub fn with_deferred_erase(mut self) -> Self {
        self.deferred_erase = true;
        self
    }

    /// 物理读页次数
    pub fn page_reads(&self) -> u64 {
        self.page_reads
    }

    /// 物理编程次数
    pub fn page_programs(&self) -> u64 {
        self.page_programs
    }

    /// 在成功编程 `count` 页之后，后续编程全部失败
    ///
    /// 用于模拟写映射块过程中掉电
    pub fn fail_programs_after(&mut self, count: u32) {
        self.programs_until_failure = Some(count);
    }

    /// 取消编程故障注入
    pub fn clear_program_failure(&mut self) {
        self.programs_until_failure = None;
    }

    /// 翻转页内一个字节而不更新 ECC
    pub fn corrupt_page(&mut self, block: u16, page: u16) {
        let range = self.page_range(block, page);
        self.data[range.start] ^= 0x01;
        let index = self.page_index(block, page);
        if self.spare[index].is_none() {
            // 擦除态页没有 ECC，补一个不匹配的值
            self.spare[index] = Some(0);
        }
    }

    /// 直接查看页数据区（不经过 ECC 和状态检查）
    pub fn raw_page(&self, block: u16, page: u16) -> &[u8] {
        &self.data[self.page_range(block, page)]
    }

    fn page_index(&self, block: u16, page: u16) -> usize {
        block as usize * self.model.block_size_in_pages() as usize + page as usize
    }

    fn page_range(&self, block: u16, page: u16) -> core::ops::Range<usize> {
        let size = self.model.page_data_size() as usize;
        let start = self.page_index(block, page) * size;
        start..start + size
    }

    fn check_address(&self, block: u16, page: u16) -> Result<()> {
        if block >= self.model.device_size_in_blocks() || page >= self.model.block_size_in_pages() {
            return Err(Error::new(ErrorKind::InvalidInput, "Page address out of range"));
        }
        Ok(())
    }

    fn check_block(&self, block: u16) -> Result<()> {
        if block >= self.model.device_size_in_blocks() {
            return Err(Error::new(ErrorKind::InvalidInput, "Block index out of range"));
        }
        Ok(())
    }

    fn erase_block(&mut self, block: u16) {
        for page in 0..self.model.block_size_in_pages() {
            let range = self.page_range(block, page);
            self.data[range].fill(ERASED_BYTE);
            let index = self.page_index(block, page);
            self.spare[index] = None;
        }
        self.statuses[block as usize] = BlockStatus::Free;
    }
}

impl NandDevice for MemNandFlash {
    fn model(&self) -> NandModel {
        self.model
    }

    fn read_page(&mut self, block: u16, page: u16, data: &mut [u8]) -> Result<()> {
        self.check_address(block, page)?;
        if self.statuses[block as usize] != BlockStatus::Live {
            return Err(Error::new(ErrorKind::WrongStatus, "Read from a block that is not LIVE"));
        }
        let size = self.model.page_data_size() as usize;
        if data.len() < size {
            return Err(Error::new(ErrorKind::InvalidInput, "Buffer too small for page"));
        }

        self.page_reads += 1;
        let range = self.page_range(block, page);
        let stored = &self.data[range];

        if let Some(ecc) = self.spare[self.page_index(block, page)] {
            if crc32fast::hash(stored) != ecc {
                log::error!("[MEMNAND] ECC failure at B#{}:P#{}", block, page);
                return Err(Error::new(ErrorKind::Ecc, "Uncorrectable ECC error"));
            }
        }

        data[..size].copy_from_slice(stored);
        Ok(())
    }

    fn write_page(&mut self, block: u16, page: u16, data: &[u8]) -> Result<()> {
        self.check_address(block, page)?;
        if self.statuses[block as usize] != BlockStatus::Live {
            return Err(Error::new(ErrorKind::WrongStatus, "Write to a block that is not LIVE"));
        }
        let size = self.model.page_data_size() as usize;
        if data.len() < size {
            return Err(Error::new(ErrorKind::InvalidInput, "Buffer too small for page"));
        }

        if let Some(remaining) = self.programs_until_failure.as_mut() {
            if *remaining == 0 {
                log::error!("[MEMNAND] Injected program failure at B#{}:P#{}", block, page);
                return Err(Error::new(ErrorKind::Io, "Page program failed"));
            }
            *remaining -= 1;
        }

        self.page_programs += 1;
        let range = self.page_range(block, page);
        self.data[range].copy_from_slice(&data[..size]);
        let index = self.page_index(block, page);
        self.spare[index] = Some(crc32fast::hash(&data[..size]));
        Ok(())
    }

    fn allocate_block(&mut self, block: u16) -> Result<()> {
        self.check_block(block)?;
        if self.statuses[block as usize] != BlockStatus::Free {
            return Err(Error::new(ErrorKind::WrongStatus, "Allocated block is not FREE"));
        }
        self.statuses[block as usize] = BlockStatus::Live;
        Ok(())
    }

    fn release_block(&mut self, block: u16) -> Result<()> {
        self.check_block(block)?;
        if self.statuses[block as usize] != BlockStatus::Live {
            return Err(Error::new(ErrorKind::WrongStatus, "Released block is not LIVE"));
        }
        if self.deferred_erase {
            self.statuses[block as usize] = BlockStatus::Dirty;
        } else {
            self.erase_block(block);
        }
        Ok(())
    }

    fn block_status(&self, block: u16) -> BlockStatus {
        self.statuses[block as usize]
    }

    fn set_block_status(&mut self, block: u16, status: BlockStatus) {
        self.statuses[block as usize] = status;
    }

    fn erase_all(&mut self, level: EraseLevel) -> Result<()> {
        for block in 0..self.model.device_size_in_blocks() {
            let erase = match (level, self.statuses[block as usize]) {
                (EraseLevel::Full, _) => true,
                (EraseLevel::Data, BlockStatus::Bad) => false,
                (EraseLevel::Data, _) => true,
                (EraseLevel::Dirty, status) => status == BlockStatus::Dirty,
            };
            if erase {
                self.erase_block(block);
            }
        }
        log::debug!("[MEMNAND] erase_all({:?}) done", level);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> MemNandFlash {
        MemNandFlash::new(NandModel::new(8, 4, 4).unwrap())
    }

    #[test]
    fn test_allocate_and_release() {
        let mut nand = device();
        assert_eq!(nand.block_status(2), BlockStatus::Free);

        nand.allocate_block(2).unwrap();
        assert_eq!(nand.block_status(2), BlockStatus::Live);
        assert_eq!(nand.allocate_block(2).unwrap_err().kind(), ErrorKind::WrongStatus);

        nand.release_block(2).unwrap();
        assert_eq!(nand.block_status(2), BlockStatus::Free);
        assert_eq!(nand.release_block(2).unwrap_err().kind(), ErrorKind::WrongStatus);
    }

    #[test]
    fn test_deferred_erase() {
        let mut nand = device().with_deferred_erase();
        nand.allocate_block(1).unwrap();
        nand.release_block(1).unwrap();
        assert_eq!(nand.block_status(1), BlockStatus::Dirty);

        nand.erase_all(EraseLevel::Dirty).unwrap();
        assert_eq!(nand.block_status(1), BlockStatus::Free);
    }

    #[test]
    fn test_read_write_page() {
        let mut nand = device();
        nand.allocate_block(0).unwrap();

        // 未编程页读出擦除态
        let mut buf = [0u8; 8];
        nand.read_page(0, 3, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 8]);

        nand.write_page(0, 3, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        nand.read_page(0, 3, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(nand.page_programs(), 1);
        assert_eq!(nand.page_reads(), 2);
    }

    #[test]
    fn test_status_checks() {
        let mut nand = device();
        let mut buf = [0u8; 8];
        assert_eq!(nand.read_page(0, 0, &mut buf).unwrap_err().kind(), ErrorKind::WrongStatus);
        assert_eq!(nand.write_page(0, 0, &buf).unwrap_err().kind(), ErrorKind::WrongStatus);
        assert_eq!(nand.read_page(9, 0, &mut buf).unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_ecc_failure() {
        let mut nand = device();
        nand.allocate_block(0).unwrap();
        nand.write_page(0, 1, &[7u8; 8]).unwrap();
        nand.corrupt_page(0, 1);

        let mut buf = [0u8; 8];
        assert_eq!(nand.read_page(0, 1, &mut buf).unwrap_err().kind(), ErrorKind::Ecc);
    }

    #[test]
    fn test_program_failure_injection() {
        let mut nand = device();
        nand.allocate_block(0).unwrap();
        nand.fail_programs_after(1);

        nand.write_page(0, 0, &[1u8; 8]).unwrap();
        assert_eq!(nand.write_page(0, 1, &[2u8; 8]).unwrap_err().kind(), ErrorKind::Io);

        nand.clear_program_failure();
        nand.write_page(0, 1, &[2u8; 8]).unwrap();
    }

    #[test]
    fn test_erase_levels() {
        let mut nand = device().with_deferred_erase();
        nand.allocate_block(0).unwrap();
        nand.allocate_block(1).unwrap();
        nand.release_block(1).unwrap();
        nand.set_block_status(2, BlockStatus::Bad);

        nand.erase_all(EraseLevel::Data).unwrap();
        assert_eq!(nand.block_status(0), BlockStatus::Free);
        assert_eq!(nand.block_status(1), BlockStatus::Free);
        assert_eq!(nand.block_status(2), BlockStatus::Bad);

        nand.erase_all(EraseLevel::Full).unwrap();
        assert_eq!(nand.block_status(2), BlockStatus::Free);
    }
}
