//! 事务上下文

use super::Transaction;
use crate::{
    block::{BlockDev, BlockDevice},
    catalog::Catalog,
    error::Result,
    spaceman::SpaceManager,
    superblock::Superblock,
};

/// 事务上下文
///
/// 借出卷在事务期间可以修改的全部状态。superblock 的对象 id 计数器、
/// 空间管理器和目录都只能通过它改动，保证这些修改都被事务的检查点覆盖。
pub struct TxContext<'a, D: BlockDevice> {
    pub(crate) tx: &'a mut Transaction,
    pub(crate) sb: &'a mut Superblock,
    pub(crate) catalog: &'a mut Catalog,
    pub(crate) spaceman: &'a mut SpaceManager,
    pub(crate) bdev: &'a mut BlockDev<D>,
}

impl<'a, D: BlockDevice> TxContext<'a, D> {
    /// 将修改过的块加入事务
    pub fn join(&mut self, lba: u64) {
        if self.tx.joined.insert(lba) {
            log::trace!("[TRANS] join block {:#x}", lba);
        }
    }

    /// 分配一个新的对象 id
    pub fn alloc_obj_id(&mut self) -> Result<u64> {
        self.sb.alloc_obj_id()
    }

    /// 分配一个块
    pub fn alloc_block(&mut self, goal: u64) -> Result<u64> {
        self.spaceman.alloc_block(goal)
    }

    /// 释放一段连续的块
    pub fn free_blocks(&mut self, start: u64, count: u64) -> Result<()> {
        self.spaceman.free_blocks(start, count)
    }

    /// superblock
    pub fn sb(&self) -> &Superblock {
        self.sb
    }

    /// 目录
    pub fn catalog(&self) -> &Catalog {
        self.catalog
    }

    /// 目录（可写）
    pub fn catalog_mut(&mut self) -> &mut Catalog {
        self.catalog
    }

    /// 块设备
    pub fn bdev(&mut self) -> &mut BlockDev<D> {
        self.bdev
    }
}
