//! NAND 设备几何

use crate::consts::{MAX_NUM_BLOCKS, MAX_PAGE_DATA_SIZE};
use crate::error::{Error, ErrorKind, Result};

/// NAND 设备几何描述
///
/// 对应 NandFlashModel 中映射层需要的部分：页数据区大小、每块页数、块数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NandModel {
    page_data_size: u16,
    block_size_in_pages: u16,
    device_size_in_blocks: u16,
}

impl NandModel {
    /// 创建设备几何
    ///
    /// # 参数
    ///
    /// * `page_data_size` - 页数据区大小（字节）
    /// * `block_size_in_pages` - 每块页数
    /// * `device_size_in_blocks` - 块数
    ///
    /// # 错误
    ///
    /// 任一参数为 0、页大于 [`MAX_PAGE_DATA_SIZE`] 或块数超过 [`MAX_NUM_BLOCKS`]
    /// 时返回 `InvalidInput`
    pub fn new(
        page_data_size: u16,
        block_size_in_pages: u16,
        device_size_in_blocks: u16,
    ) -> Result<Self> {
        if page_data_size == 0 || block_size_in_pages == 0 || device_size_in_blocks == 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "NAND geometry values must be non-zero",
            ));
        }
        if page_data_size as usize > MAX_PAGE_DATA_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Page data size exceeds MAX_PAGE_DATA_SIZE",
            ));
        }
        if device_size_in_blocks as usize > MAX_NUM_BLOCKS {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Block count exceeds MAX_NUM_BLOCKS",
            ));
        }

        Ok(Self {
            page_data_size,
            block_size_in_pages,
            device_size_in_blocks,
        })
    }

    /// 页数据区大小（字节）
    pub fn page_data_size(&self) -> u16 {
        self.page_data_size
    }

    /// 每块页数
    pub fn block_size_in_pages(&self) -> u16 {
        self.block_size_in_pages
    }

    /// 块数
    pub fn device_size_in_blocks(&self) -> u16 {
        self.device_size_in_blocks
    }

    /// 块大小（字节）
    pub fn block_size_in_bytes(&self) -> u64 {
        self.page_data_size as u64 * self.block_size_in_pages as u64
    }

    /// 设备容量（字节）
    pub fn device_size_in_bytes(&self) -> u64 {
        self.block_size_in_bytes() * self.device_size_in_blocks as u64
    }

    /// 将字节访问转换为 (块, 页, 页内偏移)
    ///
    /// # 参数
    ///
    /// * `address` - 起始字节地址
    /// * `length` - 访问长度
    ///
    /// # 错误
    ///
    /// 访问范围超出设备容量时返回 `InvalidInput`
    pub fn translate_access(&self, address: u64, length: usize) -> Result<(u16, u16, u16)> {
        let end = address
            .checked_add(length as u64)
            .ok_or(Error::new(ErrorKind::InvalidInput, "Access range overflows"))?;
        if end > self.device_size_in_bytes() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Access range exceeds device capacity",
            ));
        }

        let block_bytes = self.block_size_in_bytes();
        let page_bytes = self.page_data_size as u64;

        let block = (address / block_bytes) as u16;
        let page = ((address % block_bytes) / page_bytes) as u16;
        let offset = (address % page_bytes) as u16;

        Ok((block, page, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry() {
        let model = NandModel::new(2048, 64, 1024).unwrap();
        assert_eq!(model.block_size_in_bytes(), 2048 * 64);
        assert_eq!(model.device_size_in_bytes(), 2048 * 64 * 1024);
    }

    #[test]
    fn test_invalid_geometry() {
        assert_eq!(
            NandModel::new(0, 64, 1024).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            NandModel::new(8192, 64, 1024).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert!(NandModel::new(512, 32, u16::MAX).is_err());
    }

    #[test]
    fn test_translate_access() {
        let model = NandModel::new(4, 2, 4).unwrap();

        assert_eq!(model.translate_access(0, 4).unwrap(), (0, 0, 0));
        assert_eq!(model.translate_access(5, 1).unwrap(), (0, 1, 1));
        assert_eq!(model.translate_access(8, 2).unwrap(), (1, 0, 0));
        assert_eq!(model.translate_access(31, 1).unwrap(), (3, 1, 3));
    }

    #[test]
    fn test_translate_access_past_capacity() {
        let model = NandModel::new(4, 2, 4).unwrap();

        // 容量 32 字节
        assert!(model.translate_access(30, 2).is_ok());
        assert_eq!(
            model.translate_access(30, 3).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert!(model.translate_access(u64::MAX, 1).is_err());
    }
}
