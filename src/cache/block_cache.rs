//! 按块号索引的 LRU 缓存
//!
//! 槽位放在 `lru::LruCache` 里，脏块号另外记在一个有序集合中，
//! 写回时按块号递增的顺序进行。
//!
//! 驱逐只挑干净槽位。容量被脏块占满时 [`BlockCache::slot`] 返回 `NoSpace`，
//! 调用者写回一部分脏块后再试。

use crate::error::{Error, ErrorKind, Result};

use super::buffer::CacheBuffer;
use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::num::NonZeroUsize;
use lru::LruCache;

/// 卷默认的缓存槽位数
pub const DEFAULT_CACHE_SIZE: usize = 256;

/// 缓存计数器快照
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// 查找时块已在缓存中
    pub hits: u64,
    /// 查找时块不在缓存中
    pub misses: u64,
    /// 为腾位置丢掉的干净槽位
    pub evictions: u64,
    /// 写回设备的脏块
    pub writebacks: u64,
    /// 快照时刻的脏块数
    pub dirty_blocks: usize,
}

impl CacheStats {
    /// 查找总次数
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// 命中比例，没有查找时为 0
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            n => self.hits as f64 / n as f64,
        }
    }
}

/// 块缓存
pub struct BlockCache {
    slots: LruCache<u64, CacheBuffer>,
    dirty: BTreeSet<u64>,
    block_size: usize,
    stats: CacheStats,
}

impl BlockCache {
    /// 创建容量为 `capacity` 个块的缓存（0 按 1 处理）
    pub fn new(capacity: usize, block_size: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: LruCache::new(cap),
            dirty: BTreeSet::new(),
            block_size,
            stats: CacheStats::default(),
        }
    }

    /// 取得 `lba` 的槽位，不在缓存中就预留一个
    ///
    /// 返回值的第二项表示槽位是否刚预留。
    pub fn slot(&mut self, lba: u64) -> Result<(&mut CacheBuffer, bool)> {
        let fresh = !self.slots.contains(&lba);
        if fresh {
            self.stats.misses += 1;
            if self.slots.len() == self.slots.cap().get() {
                self.evict_one_clean()?;
            }
            let buf = CacheBuffer::try_new(lba, self.block_size)?;
            self.slots.put(lba, buf);
            log::trace!("[CACHE] reserved LBA={:#x} ({} used)", lba, self.slots.len());
        } else {
            self.stats.hits += 1;
        }

        match self.slots.get_mut(&lba) {
            Some(buf) => Ok((buf, fresh)),
            None => Err(Error::new(ErrorKind::InvalidState, "cache slot vanished")),
        }
    }

    fn evict_one_clean(&mut self) -> Result<()> {
        // iter() 从最近使用到最久未用
        let dirty = &self.dirty;
        let victim = self
            .slots
            .iter()
            .rev()
            .map(|(&lba, _)| lba)
            .find(|lba| !dirty.contains(lba));

        let Some(lba) = victim else {
            log::warn!("[CACHE] {} slots, every one dirty", self.slots.len());
            return Err(Error::new(ErrorKind::NoSpace, "no clean cache slot to evict"));
        };
        self.slots.pop(&lba);
        self.stats.evictions += 1;
        log::trace!("[CACHE] evicted LBA={:#x}", lba);
        Ok(())
    }

    /// 查看槽位，不影响 LRU 顺序
    pub fn peek(&self, lba: u64) -> Option<&CacheBuffer> {
        self.slots.peek(&lba)
    }

    /// 取槽位并把它移到最近使用端
    pub fn get_mut(&mut self, lba: u64) -> Option<&mut CacheBuffer> {
        let found = self.slots.get_mut(&lba);
        if found.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        found
    }

    /// 有效槽位的内容，槽位不存在或未读入时为 `None`
    pub fn uptodate_data(&self, lba: u64) -> Option<&[u8]> {
        self.slots
            .peek(&lba)
            .filter(|buf| buf.is_uptodate())
            .map(CacheBuffer::data)
    }

    /// 把槽位标记为脏
    pub fn set_dirty(&mut self, lba: u64) -> Result<()> {
        let buf = self
            .slots
            .peek_mut(&lba)
            .ok_or(Error::new(ErrorKind::NotFound, "block not cached"))?;
        buf.set_dirty(true);
        self.dirty.insert(lba);
        Ok(())
    }

    /// 若 `lba` 是脏块，交给 `sink` 写回
    ///
    /// 写回失败时块保持为脏。返回是否真的写了。
    pub fn write_back<W>(&mut self, lba: u64, mut sink: W) -> Result<bool>
    where
        W: FnMut(u64, &[u8]) -> Result<()>,
    {
        let Some(buf) = self.slots.peek_mut(&lba) else {
            return Ok(false);
        };
        if !buf.is_dirty() {
            return Ok(false);
        }
        sink(lba, buf.data())?;
        buf.set_dirty(false);
        self.dirty.remove(&lba);
        self.stats.writebacks += 1;
        Ok(true)
    }

    /// 按块号顺序写回至多 `limit` 个脏块（至少一个）
    pub fn write_back_some<W>(&mut self, limit: usize, mut sink: W) -> Result<usize>
    where
        W: FnMut(u64, &[u8]) -> Result<()>,
    {
        let batch: Vec<u64> = self.dirty.iter().copied().take(limit.max(1)).collect();
        let mut written = 0;
        for lba in batch {
            if self.write_back(lba, &mut sink)? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// 写回全部脏块
    pub fn write_back_all<W>(&mut self, sink: W) -> Result<usize>
    where
        W: FnMut(u64, &[u8]) -> Result<()>,
    {
        let pending = self.dirty.len();
        if pending > 0 {
            log::debug!("[CACHE] writing back {} dirty blocks", pending);
        }
        self.write_back_some(pending, sink)
    }

    /// 丢弃槽位，脏内容不写回
    ///
    /// 返回槽位此前是否存在。
    pub fn discard(&mut self, lba: u64) -> bool {
        self.dirty.remove(&lba);
        self.slots.pop(&lba).is_some()
    }

    /// 计数器快照
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            dirty_blocks: self.dirty.len(),
            ..self.stats
        }
    }

    /// 槽位上限
    pub fn capacity(&self) -> usize {
        self.slots.cap().get()
    }

    /// 已占用槽位数
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// 没有任何槽位
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 脏块数
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }
}

impl core::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "BlockCache({}/{} slots, {} dirty)",
            self.slots.len(),
            self.slots.cap(),
            self.dirty.len()
        )
    }
}
