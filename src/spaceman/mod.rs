//! 空间管理器
//!
//! 用一张覆盖整个设备的位图记录块的使用情况。块 0 和配置的保留块在创建时即标记为已用。
//! 分配器可以整体克隆，事务用它做回滚检查点。

use crate::{
    bitmap,
    error::{Error, ErrorKind, Result},
    utils::try_alloc_zeroed,
};
use alloc::vec::Vec;

/// 块分配器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceManager {
    /// 块位图，1 表示已用
    bitmap: Vec<u8>,
    /// 总块数
    total_blocks: u64,
    /// 已用块数
    used_blocks: u64,
    /// 上次分配的位置，用作下一次查找的起点
    last_alloc: u64,
}

impl SpaceManager {
    /// 创建空间管理器
    ///
    /// # 参数
    ///
    /// * `total_blocks` - 设备总块数
    /// * `reserved_blocks` - 设备开头保留的块数（至少为 1，块 0 永不分配）
    pub fn new(total_blocks: u64, reserved_blocks: u64) -> Result<Self> {
        let reserved = reserved_blocks.max(1);
        if reserved > total_blocks {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "reserved blocks exceed device size",
            ));
        }

        let bytes = usize::try_from(total_blocks.div_ceil(8))
            .map_err(|_| Error::new(ErrorKind::NoMemory, "bitmap too large"))?;
        let mut sm = Self {
            bitmap: try_alloc_zeroed(bytes)?,
            total_blocks,
            used_blocks: 0,
            last_alloc: reserved,
        };
        for bno in 0..reserved {
            bitmap::set_bit(&mut sm.bitmap, bno)?;
        }
        sm.used_blocks = reserved;
        Ok(sm)
    }

    /// 分配一个块
    ///
    /// 从 `goal` 开始查找空闲块，`goal` 为 0 时从上次分配的位置开始，到末尾后回绕。
    ///
    /// # 返回
    ///
    /// 成功返回分配的块号，没有空闲块时返回 `NoSpace`
    pub fn alloc_block(&mut self, goal: u64) -> Result<u64> {
        let start = if goal == 0 || goal >= self.total_blocks {
            self.last_alloc
        } else {
            goal
        };

        let found = bitmap::find_first_zero(&self.bitmap, start, self.total_blocks)
            .or_else(|| bitmap::find_first_zero(&self.bitmap, 1, start));

        let Some(bno) = found else {
            log::warn!(
                "[SPACEMAN] no free blocks ({} of {} used)",
                self.used_blocks,
                self.total_blocks
            );
            return Err(Error::new(ErrorKind::NoSpace, "no free blocks"));
        };

        bitmap::set_bit(&mut self.bitmap, bno)?;
        self.used_blocks += 1;
        self.last_alloc = bno + 1;
        log::trace!("[SPACEMAN] alloc block {:#x}", bno);
        Ok(bno)
    }

    /// 释放一段连续的块
    ///
    /// 释放未分配的块说明元数据已损坏，返回 `Corrupted`，位图不做任何修改。
    pub fn free_blocks(&mut self, start: u64, count: u64) -> Result<()> {
        let end = start
            .checked_add(count)
            .filter(|&end| start != 0 && end <= self.total_blocks)
            .ok_or(Error::new(ErrorKind::Corrupted, "freeing blocks outside the device"))?;

        if (start..end).any(|bno| !bitmap::test_bit(&self.bitmap, bno)) {
            log::error!(
                "[SPACEMAN] double free in range {:#x}+{}",
                start,
                count
            );
            return Err(Error::new(ErrorKind::Corrupted, "freeing a free block"));
        }

        for bno in start..end {
            bitmap::clear_bit(&mut self.bitmap, bno)?;
        }
        self.used_blocks -= count;
        log::trace!("[SPACEMAN] freed {:#x}+{}", start, count);
        Ok(())
    }

    /// 块是否已分配
    pub fn is_allocated(&self, bno: u64) -> bool {
        bitmap::test_bit(&self.bitmap, bno)
    }

    /// 已用块数（包含保留块）
    pub fn used_blocks(&self) -> u64 {
        self.used_blocks
    }

    /// 空闲块数
    pub fn free_count(&self) -> u64 {
        self.total_blocks - self.used_blocks
    }

    /// 总块数
    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }
}
