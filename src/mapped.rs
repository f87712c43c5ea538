//! 映射 NAND 设备
//!
//! 在受管理 NAND 设备之上提供逻辑块视图：逻辑块经映射表转换为物理块后再访问
//! 设备。初始化时扫描设备恢复已保存的映射表，没有则从空映射开始。

use crate::error::{Error, ErrorKind, Result};
use crate::mapping::{persist, LogicalBlockMap, ReconcileReport};
use crate::nand::{BlockStatus, EraseLevel, NandDevice, NandModel};

/// 映射 NAND 设备
///
/// 每个实例独占一个底层设备，所有操作同步执行，不含内部锁。
///
/// # 示例
///
/// ```rust,ignore
/// use mapped_nand::{MappedNandFlash, MemNandFlash, NandModel};
///
/// let nand = MemNandFlash::new(NandModel::new(2048, 64, 256)?);
/// let mut mapped = MappedNandFlash::new(nand)?;
///
/// mapped.map(0, 10)?;
/// mapped.write_page(0, 0, &page)?;
/// mapped.save_logical_mapping()?;
/// ```
pub struct MappedNandFlash<D> {
    device: D,
    model: NandModel,
    map: LogicalBlockMap,
}

impl<D: NandDevice> MappedNandFlash<D> {
    /// 初始化映射设备
    ///
    /// 扫描设备查找映射块：找到则加载并执行掉电恢复，否则从空映射开始。
    ///
    /// # 错误
    ///
    /// 扫描或加载过程中的设备错误、映射表损坏
    pub fn new(device: D) -> Result<Self> {
        let model = device.model();
        let mut mapped = Self {
            device,
            model,
            map: LogicalBlockMap::new(model.device_size_in_blocks()),
        };

        match persist::locate(&mut mapped.device)? {
            Some(block) => {
                persist::load(&mut mapped.device, &mut mapped.map, block)?;
            }
            None => {
                log::info!("[MAPPED] starting with no block mapped");
            }
        }

        Ok(mapped)
    }

    /// 获取底层设备的引用
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 获取底层设备的可变引用
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// 取回底层设备
    pub fn into_inner(self) -> D {
        self.device
    }

    /// 设备几何
    pub fn model(&self) -> NandModel {
        self.model
    }

    /// 当前映射表
    pub fn mapping(&self) -> &LogicalBlockMap {
        &self.map
    }

    /// 逻辑块对应的物理块，未映射返回 None
    ///
    /// # Panics
    ///
    /// `logical` 超出设备块数
    pub fn logical_to_physical(&self, logical: u16) -> Option<u16> {
        self.map.logical_to_physical(logical)
    }

    /// 物理块对应的逻辑块，未映射返回 None
    ///
    /// # Panics
    ///
    /// `physical` 超出设备块数
    pub fn physical_to_logical(&self, physical: u16) -> Option<u16> {
        self.map.physical_to_logical(physical)
    }

    /// 读取已映射逻辑块中的一页
    ///
    /// # 错误
    ///
    /// 逻辑块未映射返回 `BlockNotMapped`，其余为设备错误
    pub fn read_page(&mut self, logical: u16, page: u16, data: &mut [u8]) -> Result<()> {
        log::trace!("[MAPPED] read_page LB#{}:P#{}", logical, page);
        let physical = self.resolve(logical)?;
        self.device.read_page(physical, page, data)
    }

    /// 写入已映射逻辑块中的一页
    ///
    /// 不会自动分配物理块，调用者需先 [`map`](Self::map)。
    ///
    /// # 错误
    ///
    /// 逻辑块未映射返回 `BlockNotMapped`，其余为设备错误
    pub fn write_page(&mut self, logical: u16, page: u16, data: &[u8]) -> Result<()> {
        log::trace!("[MAPPED] write_page LB#{}:P#{}", logical, page);
        let physical = self.resolve(logical).map_err(|e| {
            log::error!("[MAPPED] write_page: LB#{} must be mapped", logical);
            e
        })?;
        self.device.write_page(physical, page, data)
    }

    /// 把逻辑块映射到物理块
    ///
    /// 先分配 `physical`（必须为 FREE），再释放逻辑块原来的物理块。
    /// 分配失败时映射表不变。
    ///
    /// # Panics
    ///
    /// 任一块号超出设备块数
    pub fn map(&mut self, logical: u16, physical: u16) -> Result<()> {
        let blocks = self.model.device_size_in_blocks();
        assert!(logical < blocks, "logical block {} out of range", logical);
        assert!(physical < blocks, "physical block {} out of range", physical);

        log::debug!("[MAPPED] map LB#{} -> PB#{}", logical, physical);

        self.device.allocate_block(physical)?;

        if let Some(old) = self.map.logical_to_physical(logical) {
            if let Err(e) = self.device.release_block(old) {
                log::error!("[MAPPED] map: failed to release PB#{}: {}", old, e);
                // 撤销分配，保持映射表与设备一致
                if let Err(undo) = self.device.release_block(physical) {
                    log::warn!(
                        "[MAPPED] map: could not undo allocation of PB#{}: {}",
                        physical,
                        undo
                    );
                }
                return Err(e);
            }
        }

        self.map.set(logical, Some(physical));
        Ok(())
    }

    /// 取消逻辑块映射，并释放其物理块（如有）
    ///
    /// # Panics
    ///
    /// `logical` 超出设备块数
    pub fn unmap(&mut self, logical: u16) -> Result<()> {
        log::debug!("[MAPPED] unmap LB#{}", logical);

        if let Some(physical) = self.map.logical_to_physical(logical) {
            self.device.release_block(physical)?;
        }
        self.map.set(logical, None);
        Ok(())
    }

    /// 映射表是否有未保存的修改
    pub fn is_mapping_dirty(&self) -> bool {
        self.map.is_dirty()
    }

    /// 把映射表保存到指定的 FREE 物理块
    pub fn save_logical_mapping_to(&mut self, physical: u16) -> Result<()> {
        persist::save(&mut self.device, &mut self.map, physical)
    }

    /// 把映射表保存到第一个可用的 FREE 块
    ///
    /// 映射表未修改时什么也不做。
    ///
    /// # 错误
    ///
    /// 没有 FREE 块时返回 `NoSpace`
    pub fn save_logical_mapping(&mut self) -> Result<()> {
        if !self.map.is_dirty() {
            return Ok(());
        }

        let physical = persist::find_free_block(&self.device, &self.map).ok_or(Error::new(
            ErrorKind::NoSpace,
            "No FREE block available for the logical mapping",
        ))?;
        self.save_logical_mapping_to(physical)
    }

    /// 重新执行掉电恢复
    pub fn reconcile(&mut self) -> Result<ReconcileReport> {
        persist::reconcile(&mut self.device, &mut self.map)
    }

    /// 擦除映射区内的所有块
    ///
    /// `Data` 及以上级别会清空映射表。
    pub fn erase_all(&mut self, level: EraseLevel) -> Result<()> {
        log::warn!("[MAPPED] erase_all({:?})", level);
        self.device.erase_all(level)?;
        if level > EraseLevel::Dirty {
            self.map.reset();
        }
        Ok(())
    }

    /// 查询物理块状态
    pub fn block_status(&self, physical: u16) -> BlockStatus {
        self.device.block_status(physical)
    }

    fn resolve(&self, logical: u16) -> Result<u16> {
        self.map.logical_to_physical(logical).ok_or_else(|| {
            log::debug!("[MAPPED] LB#{} not mapped", logical);
            Error::new(ErrorKind::BlockNotMapped, "Logical block is not mapped")
        })
    }
}
