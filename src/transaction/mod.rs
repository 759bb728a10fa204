//! Transaction 系统
//!
//! 卷上的每个修改操作都必须在一个活跃事务中执行。
//!
//! ## 工作原理
//!
//! 1. **开始**: 保存 superblock、目录和空间管理器的检查点
//! 2. **加入**: 修改过的块通过 [`TxContext::join`] 记入事务，修改留在 block cache 中
//! 3. **提交**: 将加入事务的块刷新到磁盘，丢弃检查点
//! 4. **回滚**: 恢复检查点，并把加入事务的块从缓存中丢弃（不写回）
//!
//! 流数据总是写入新分配的块，回滚后这些块重新变为空闲，
//! 磁盘上被已提交记录引用的内容不会被改动。
//!
//! ## 使用说明
//!
//! ```rust,ignore
//! state.transaction_start(MaxOps { cat: 1, blks: 0 })?;
//! let result = {
//!     let mut ctx = state.tx_context()?;
//!     do_something(&mut ctx)
//! };
//! match result {
//!     Ok(()) => state.transaction_commit()?,
//!     Err(e) => {
//!         state.transaction_abort();
//!         return Err(e);
//!     }
//! }
//! ```

mod context;

pub use context::TxContext;

use crate::{
    block::BlockDevice,
    catalog::Catalog,
    error::{Error, ErrorKind, Result},
    fs::VolumeState,
    spaceman::SpaceManager,
    superblock::Superblock,
};
use alloc::collections::BTreeSet;

/// 事务预计的修改量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaxOps {
    /// 目录记录操作数
    pub cat: u32,
    /// 新分配的块数
    pub blks: u32,
}

/// 回滚检查点
#[derive(Debug)]
struct Checkpoint {
    sb: Superblock,
    catalog: Catalog,
    spaceman: SpaceManager,
}

/// 活跃事务
#[derive(Debug)]
pub struct Transaction {
    checkpoint: Checkpoint,
    /// 加入本事务的块
    joined: BTreeSet<u64>,
    maxops: MaxOps,
}

impl Transaction {
    /// 已加入事务的块数
    pub fn joined_blocks(&self) -> usize {
        self.joined.len()
    }

    /// 开始时声明的修改量
    pub fn maxops(&self) -> MaxOps {
        self.maxops
    }
}

impl<D: BlockDevice> VolumeState<D> {
    /// 开始事务
    ///
    /// 已有活跃事务时返回 `Busy`
    pub fn transaction_start(&mut self, maxops: MaxOps) -> Result<()> {
        if self.tx.is_some() {
            return Err(Error::new(ErrorKind::Busy, "transaction already running"));
        }
        log::debug!(
            "[TRANS] start (cat={}, blks={})",
            maxops.cat,
            maxops.blks
        );
        self.tx = Some(Transaction {
            checkpoint: Checkpoint {
                sb: self.sb.clone(),
                catalog: self.catalog.clone(),
                spaceman: self.spaceman.clone(),
            },
            joined: BTreeSet::new(),
            maxops,
        });
        Ok(())
    }

    /// 提交事务
    ///
    /// 写回失败时事务保持活跃，调用者应当调用 [`transaction_abort`](Self::transaction_abort)。
    pub fn transaction_commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or(Error::new(ErrorKind::InvalidState, "no running transaction"))?;

        let bdev = self.bdev.get_mut();
        for &lba in &tx.joined {
            bdev.flush_lba(lba)?;
        }
        bdev.flush()?;

        log::debug!("[TRANS] commit ({} blocks)", tx.joined.len());
        self.tx = None;
        Ok(())
    }

    /// 回滚事务
    ///
    /// 没有活跃事务时什么也不做
    pub fn transaction_abort(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };

        log::warn!("[TRANS] abort ({} blocks discarded)", tx.joined.len());
        let bdev = self.bdev.get_mut();
        for &lba in &tx.joined {
            bdev.invalidate_lba(lba);
        }
        self.sb = tx.checkpoint.sb;
        self.catalog = tx.checkpoint.catalog;
        self.spaceman = tx.checkpoint.spaceman;
    }

    /// 是否有活跃事务
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// 当前活跃事务
    pub fn transaction(&self) -> Option<&Transaction> {
        self.tx.as_ref()
    }

    /// 获取事务上下文
    ///
    /// 事务内的全部可变状态只能经由上下文访问。没有活跃事务时返回 `InvalidState`。
    pub fn tx_context(&mut self) -> Result<TxContext<'_, D>> {
        let VolumeState {
            bdev,
            sb,
            catalog,
            spaceman,
            tx,
        } = self;
        let tx = tx
            .as_mut()
            .ok_or(Error::new(ErrorKind::InvalidState, "no running transaction"))?;
        Ok(TxContext {
            tx,
            sb,
            catalog,
            spaceman,
            bdev: bdev.get_mut(),
        })
    }
}
