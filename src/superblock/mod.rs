//! 卷 superblock
//!
//! 只保存 xattr 子系统需要的卷级状态：块大小、对象 id 计数器和加密标志。
//! 计数器属于持久化状态，只能在事务中通过 [`crate::transaction::TxContext`] 修改。

use crate::{
    consts::*,
    error::{Error, ErrorKind, Result},
};
use bitflags::bitflags;

bitflags! {
    /// 卷标志（`apfs_fs_flags`）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VolumeFlags: u64 {
        /// 卷未加密
        const UNENCRYPTED = APFS_FS_UNENCRYPTED;
    }
}

/// 卷 superblock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    block_size: u32,
    block_size_bits: u32,
    next_obj_id: u64,
    flags: VolumeFlags,
}

impl Superblock {
    /// 创建 superblock
    ///
    /// # 参数
    ///
    /// * `block_size` - 块大小，必须是 `[4096, 65536]` 范围内的 2 的幂
    /// * `first_obj_id` - 第一个可分配的对象 id
    /// * `encrypted` - 卷是否加密
    pub fn new(block_size: u32, first_obj_id: u64, encrypted: bool) -> Result<Self> {
        if !block_size.is_power_of_two()
            || !(APFS_MIN_BLOCK_SIZE..=APFS_MAX_BLOCK_SIZE).contains(&block_size)
        {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "block size must be a power of two in [4096, 65536]",
            ));
        }
        if first_obj_id == 0 || first_obj_id > OBJ_ID_MASK {
            return Err(Error::new(ErrorKind::InvalidInput, "invalid first object id"));
        }

        let flags = if encrypted {
            VolumeFlags::empty()
        } else {
            VolumeFlags::UNENCRYPTED
        };

        Ok(Self {
            block_size,
            block_size_bits: block_size.trailing_zeros(),
            next_obj_id: first_obj_id,
            flags,
        })
    }

    /// 获取块大小
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// 块大小的 log2
    pub fn block_size_bits(&self) -> u32 {
        self.block_size_bits
    }

    /// 下一个将被分配的对象 id
    pub fn next_obj_id(&self) -> u64 {
        self.next_obj_id
    }

    /// 卷标志
    pub fn flags(&self) -> VolumeFlags {
        self.flags
    }

    /// 卷是否加密
    pub fn is_encrypted(&self) -> bool {
        !self.flags.contains(VolumeFlags::UNENCRYPTED)
    }

    /// 分配一个新的对象 id
    pub(crate) fn alloc_obj_id(&mut self) -> Result<u64> {
        let id = self.next_obj_id;
        if id > OBJ_ID_MASK {
            return Err(Error::new(ErrorKind::NoSpace, "object id space exhausted"));
        }
        self.next_obj_id += 1;
        Ok(id)
    }
}
