//! 缓存槽位

use crate::error::Result;
use crate::utils::try_alloc_zeroed;
use alloc::vec::Vec;
use bitflags::bitflags;

bitflags! {
    /// 槽位状态
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CacheFlags: u8 {
        /// 内容有效：已从设备读入，或已被调用者整块覆盖
        const UPTODATE = 1 << 0;
        /// 内容比设备上的新，驱逐前必须写回
        const DIRTY    = 1 << 1;
    }
}

/// 一个缓存槽位
///
/// 刚预留的槽位全零且没有 `UPTODATE`。提交读请求但设备报错时，槽位就停在
/// 这个状态，等待读完成的一方看到它会报告 `Io`，不会把零当作块内容。
#[derive(Debug)]
pub struct CacheBuffer {
    lba: u64,
    data: Vec<u8>,
    flags: CacheFlags,
}

impl CacheBuffer {
    /// 为 `lba` 预留一个全零槽位
    ///
    /// 内存不足时返回 `NoMemory`
    pub fn try_new(lba: u64, block_size: usize) -> Result<Self> {
        Ok(Self {
            lba,
            data: try_alloc_zeroed(block_size)?,
            flags: CacheFlags::empty(),
        })
    }

    /// 槽位对应的块号
    pub fn lba(&self) -> u64 {
        self.lba
    }

    /// 槽位内容
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 可写的槽位内容
    ///
    /// 只改内容不改状态，脏标记由 [`BlockCache::set_dirty`](super::BlockCache::set_dirty) 维护。
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// 当前状态
    pub fn flags(&self) -> CacheFlags {
        self.flags
    }

    /// 用设备上读到的内容填充槽位
    ///
    /// `src` 比块短时只覆盖前缀，剩余部分保持原样。
    pub fn fill(&mut self, src: &[u8]) {
        let n = src.len().min(self.data.len());
        self.data[..n].copy_from_slice(&src[..n]);
        self.flags.insert(CacheFlags::UPTODATE);
    }

    /// 声明槽位内容有效（调用者会整块覆盖）
    pub fn set_uptodate(&mut self) {
        self.flags.insert(CacheFlags::UPTODATE);
    }

    pub(super) fn set_dirty(&mut self, dirty: bool) {
        self.flags.set(CacheFlags::DIRTY, dirty);
    }

    /// 是否需要写回
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(CacheFlags::DIRTY)
    }

    /// 内容是否有效
    pub fn is_uptodate(&self) -> bool {
        self.flags.contains(CacheFlags::UPTODATE)
    }
}
