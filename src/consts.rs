//! 映射 NAND 常量定义
//!
//! 包含设备几何上限、逻辑映射块布局相关的常量。

//=============================================================================
// 设备几何
//=============================================================================

/// 支持的最大页数据区大小（字节）
pub const MAX_PAGE_DATA_SIZE: usize = 4096;

/// 支持的最大物理块数量
///
/// 映射表项在设备上以 `i16` 存储，块号必须落在正数范围内
pub const MAX_NUM_BLOCKS: usize = i16::MAX as usize;

//=============================================================================
// 逻辑映射块布局
//=============================================================================

/// 未映射表项在设备上的编码
pub const UNMAPPED_ENTRY: i16 = -1;

/// 单个映射表项序列化后的字节数
pub const MAPPING_ENTRY_SIZE: usize = core::mem::size_of::<i16>();

/// 签名所在页
pub const MAPPING_SIGNATURE_PAGE: u16 = 0;

/// 映射表数据起始页（第 0 页保存签名）
pub const MAPPING_FIRST_DATA_PAGE: u16 = 1;

/// 签名字节掩码，见 [`crate::mapping::pattern`]
pub const MAPPING_PATTERN_MASK: u8 = 0x73;

/// 映射表最后一页的填充字节（NAND 擦除态）
pub const ERASED_BYTE: u8 = 0xFF;
