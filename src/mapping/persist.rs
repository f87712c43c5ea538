//! 映射表持久化
//!
//! 映射块的定位、加载、保存，以及加载后的掉电恢复（reconcile）。
//!
//! # 状态流转
//!
//! ```text
//! NO_MAPPING ──map/unmap──▶ DIRTY ──save──▶ SAVED
//!                              ▲               │
//!                              └──map/unmap────┘
//! LOADED (locate + load) ──map/unmap──▶ DIRTY
//! ```
//!
//! # 保存顺序
//!
//! 1. 分配一个 FREE 块
//! 2. 写入映射表（第 1 页起）
//! 3. 最后写入签名（第 0 页）
//! 4. 释放旧映射块
//!
//! 任何一步失败都不会释放旧映射块，设备上始终至少保留一份完整映射。

use super::LogicalBlockMap;
use crate::consts::{
    ERASED_BYTE, MAPPING_ENTRY_SIZE, MAPPING_FIRST_DATA_PAGE, MAPPING_PATTERN_MASK,
    MAPPING_SIGNATURE_PAGE, UNMAPPED_ENTRY,
};
use crate::error::{Error, ErrorKind, Result};
use crate::nand::{BlockStatus, NandDevice, NandModel};
use alloc::vec;
use alloc::vec::Vec;
use byteorder::{ByteOrder, NativeEndian};

/// 映射块签名第 i 个字节
///
/// 低熵、易辨认的固定模式，写入（save）和校验（locate）共用
#[inline]
pub fn pattern(i: usize) -> u8 {
    ((i << 1) as u8) & MAPPING_PATTERN_MASK
}

/// 掉电恢复结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// 未被映射却处于 LIVE 的块，已释放
    pub released: Vec<u16>,
    /// 仍被映射却处于 DIRTY 的块，已恢复为 LIVE
    pub revived: Vec<u16>,
    /// 映射到 FREE/BAD 块的逻辑块，已取消映射
    pub unmapped: Vec<u16>,
}

impl ReconcileReport {
    /// 是否没有做任何修正
    pub fn is_clean(&self) -> bool {
        self.released.is_empty() && self.revived.is_empty() && self.unmapped.is_empty()
    }
}

/// 序列化映射表所需页数
pub fn mapping_pages(model: &NandModel) -> usize {
    let bytes = model.device_size_in_blocks() as usize * MAPPING_ENTRY_SIZE;
    let page = model.page_data_size() as usize;
    (bytes + page - 1) / page
}

/// 检查映射表能否放进一个块（签名页之后）
pub fn check_mapping_fits(model: &NandModel) -> Result<()> {
    let available = model.block_size_in_pages() as usize - MAPPING_FIRST_DATA_PAGE as usize;
    if mapping_pages(model) > available {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "Logical mapping does not fit in a single block",
        ));
    }
    Ok(())
}

/// 扫描设备，查找映射块
///
/// # 返回
///
/// 找到返回 `Some(block)`；设备上没有映射（例如刚擦除）返回 `None`
///
/// # 错误
///
/// 读页失败且原因不是 `WrongStatus` 时中止扫描并返回该错误
pub fn locate<D: NandDevice>(device: &mut D) -> Result<Option<u16>> {
    let model = device.model();
    let page_size = model.page_data_size() as usize;
    let mut data = vec![0u8; page_size];

    log::debug!("[MAPPING] locate: scanning {} blocks", model.device_size_in_blocks());

    for block in 0..model.device_size_in_blocks() {
        if device.block_status(block) != BlockStatus::Live {
            continue;
        }

        log::trace!("[MAPPING] checking LIVE block #{}", block);
        match device.read_page(block, MAPPING_SIGNATURE_PAGE, &mut data) {
            Ok(()) => {
                if data.iter().enumerate().all(|(i, byte)| *byte == pattern(i)) {
                    log::info!("[MAPPING] logical mapping found in block #{}", block);
                    return Ok(Some(block));
                }
            }
            Err(e) if e.kind() == ErrorKind::WrongStatus => {}
            Err(e) => {
                log::error!("[MAPPING] locate: failed to scan block #{}: {}", block, e);
                return Err(e);
            }
        }
    }

    log::warn!("[MAPPING] no logical mapping found in device");
    Ok(None)
}

/// 从映射块加载映射表，然后执行掉电恢复
///
/// # 参数
///
/// * `device` - NAND 设备
/// * `map` - 目标映射表（被整体替换）
/// * `physical` - 映射块
pub fn load<D: NandDevice>(
    device: &mut D,
    map: &mut LogicalBlockMap,
    physical: u16,
) -> Result<ReconcileReport> {
    let model = device.model();
    check_mapping_fits(&model)?;

    log::debug!("[MAPPING] load from B#{}", physical);

    let page_size = model.page_data_size() as usize;
    let mut raw = vec![0u8; mapping_pages(&model) * page_size];
    for (i, chunk) in raw.chunks_mut(page_size).enumerate() {
        let page = MAPPING_FIRST_DATA_PAGE + i as u16;
        device.read_page(physical, page, chunk).map_err(|e| {
            log::error!("[MAPPING] load: failed to read B#{}:P#{}: {}", physical, page, e);
            e
        })?;
    }

    let entries = decode_entries(&raw, model.device_size_in_blocks(), physical)?;
    map.replace_entries(entries);
    map.set_mapping_block(Some(physical));
    map.mark_clean();

    let report = reconcile(device, map)?;
    log::info!(
        "[MAPPING] mapping loaded from block #{} ({} blocks mapped)",
        physical,
        map.mapped_count()
    );
    Ok(report)
}

/// 掉电恢复：让设备块状态与映射表互相一致
///
/// 以映射表为准，逐个检查除映射块以外的物理块：
///
/// | 设备状态    | 是否被映射 | 处理                     |
/// |------------|-----------|--------------------------|
/// | LIVE       | 否        | 释放（写入完成但映射未保存）|
/// | DIRTY      | 是        | 恢复为 LIVE               |
/// | FREE / BAD | 是        | 取消映射                  |
///
/// 重复执行不会产生新的修改。
pub fn reconcile<D: NandDevice>(
    device: &mut D,
    map: &mut LogicalBlockMap,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    let mapping_block = map.mapping_block();

    for physical in 0..device.model().device_size_in_blocks() {
        if Some(physical) == mapping_block {
            continue;
        }

        let logical = map.physical_to_logical(physical);
        match (device.block_status(physical), logical) {
            (BlockStatus::Live, None) => {
                log::warn!("[MAPPING] release unmapped LIVE #{}", physical);
                device.release_block(physical)?;
                report.released.push(physical);
            }
            (BlockStatus::Dirty, Some(_)) => {
                log::warn!("[MAPPING] mark mapped DIRTY #{} -> LIVE", physical);
                device.set_block_status(physical, BlockStatus::Live);
                report.revived.push(physical);
            }
            (BlockStatus::Free | BlockStatus::Bad, Some(logical)) => {
                log::warn!("[MAPPING] unmap LB#{} on FREE or BAD #{}", logical, physical);
                map.set(logical, None);
                report.unmapped.push(logical);
            }
            _ => {}
        }
    }

    Ok(report)
}

/// 把映射表保存到指定物理块
///
/// 映射表未修改时什么也不做。成功后旧映射块被释放。
///
/// # 错误
///
/// - 目标块不是 FREE：`WrongStatus`
/// - 映射表放不进一个块：`InvalidInput`
/// - 写页失败：设备错误原样返回，旧映射块保持不变，映射表仍为脏
pub fn save<D: NandDevice>(
    device: &mut D,
    map: &mut LogicalBlockMap,
    physical: u16,
) -> Result<()> {
    if !map.is_dirty() {
        return Ok(());
    }

    let model = device.model();
    check_mapping_fits(&model)?;

    device.allocate_block(physical)?;
    log::debug!("[MAPPING] save to B#{} (previous {:?})", physical, map.mapping_block());

    if let Err(e) = write_mapping_block(device, map, physical) {
        log::error!("[MAPPING] save to B#{} failed: {}", physical, e);
        // 尽力归还新块；即使失败，下次加载时 reconcile 也会回收
        if let Err(release_err) = device.release_block(physical) {
            log::warn!("[MAPPING] could not release B#{}: {}", physical, release_err);
        }
        return Err(e);
    }

    let previous = map.mapping_block();
    map.set_mapping_block(Some(physical));
    map.mark_clean();

    if let Some(previous) = previous {
        log::debug!("[MAPPING] releasing previous mapping block #{}", previous);
        device.release_block(previous)?;
    }

    log::info!("[MAPPING] mapping saved on block #{}", physical);
    Ok(())
}

/// 选择一个可用于保存映射表的 FREE 块
pub fn find_free_block<D: NandDevice>(device: &D, map: &LogicalBlockMap) -> Option<u16> {
    (0..device.model().device_size_in_blocks()).find(|&block| {
        device.block_status(block) == BlockStatus::Free && map.physical_to_logical(block).is_none()
    })
}

fn write_mapping_block<D: NandDevice>(
    device: &mut D,
    map: &LogicalBlockMap,
    physical: u16,
) -> Result<()> {
    let model = device.model();
    let page_size = model.page_data_size() as usize;

    let mut raw = encode_entries(map.entries());
    let pages = mapping_pages(&model);
    raw.resize(pages * page_size, ERASED_BYTE);

    for (i, chunk) in raw.chunks(page_size).enumerate() {
        device.write_page(physical, MAPPING_FIRST_DATA_PAGE + i as u16, chunk)?;
    }

    // 签名最后写入
    let signature: Vec<u8> = (0..page_size).map(pattern).collect();
    device.write_page(physical, MAPPING_SIGNATURE_PAGE, &signature)
}

fn encode_entries(entries: &[Option<u16>]) -> Vec<u8> {
    let mut raw = vec![0u8; entries.len() * MAPPING_ENTRY_SIZE];
    for (entry, slot) in entries.iter().zip(raw.chunks_exact_mut(MAPPING_ENTRY_SIZE)) {
        let value = entry.map(|block| block as i16).unwrap_or(UNMAPPED_ENTRY);
        NativeEndian::write_i16(slot, value);
    }
    raw
}

fn decode_entries(raw: &[u8], num_blocks: u16, mapping_block: u16) -> Result<Vec<Option<u16>>> {
    let mut entries = Vec::with_capacity(num_blocks as usize);
    let mut seen = vec![false; num_blocks as usize];

    for slot in raw.chunks_exact(MAPPING_ENTRY_SIZE).take(num_blocks as usize) {
        let value = NativeEndian::read_i16(slot);
        if value == UNMAPPED_ENTRY {
            entries.push(None);
            continue;
        }
        if value < 0 || value as u16 >= num_blocks || value as u16 == mapping_block {
            return Err(Error::new(ErrorKind::Corrupted, "Mapping entry out of range"));
        }
        if core::mem::replace(&mut seen[value as usize], true) {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Physical block mapped by two logical blocks",
            ));
        }
        entries.push(Some(value as u16));
    }

    Ok(entries)
}
