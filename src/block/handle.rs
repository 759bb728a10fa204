//! 单块访问句柄

use crate::block::{BlockDev, BlockDevice};
use crate::error::{Error, ErrorKind, Result};
use crate::utils::try_alloc_zeroed;
use alloc::vec::Vec;

/// 块内容存放在哪里
enum Backing {
    /// 缓存槽位里
    Cached,
    /// 没有缓存时的私有副本，`dirty` 表示释放时要写回
    Local { data: Vec<u8>, dirty: bool },
}

/// 对一个块的独占访问
///
/// 句柄借走了 `&mut BlockDev`，持有期间槽位不会被驱逐，也不会有第二个句柄。
/// 带缓存时修改只落在槽位里并记为脏；不带缓存时修改落在私有副本里，
/// 在 [`release`](Self::release) 或析构时写回设备。
///
/// ```rust,ignore
/// let mut blk = Block::get_noread(&mut bdev, bno)?;
/// blk.with_data_mut(|data| data[..chunk.len()].copy_from_slice(chunk))?;
/// blk.release()?;
/// ```
pub struct Block<'a, D: BlockDevice> {
    block_dev: &'a mut BlockDev<D>,
    lba: u64,
    backing: Backing,
}

impl<'a, D: BlockDevice> Block<'a, D> {
    /// 读入 `lba` 并取得句柄
    ///
    /// 设备读失败时丢弃刚预留的槽位并返回错误。
    pub fn get(block_dev: &'a mut BlockDev<D>, lba: u64) -> Result<Self> {
        block_dev.check_lba(lba)?;

        let backing = if block_dev.has_cache() {
            block_dev.reserve_slot(lba)?;
            if let Err(e) = block_dev.fill_slot(lba) {
                block_dev.invalidate_lba(lba);
                return Err(e);
            }
            Backing::Cached
        } else {
            let mut data = try_alloc_zeroed(block_dev.block_size() as usize)?;
            block_dev.read_block(lba, &mut data)?;
            Backing::Local { data, dirty: false }
        };

        Ok(Self { block_dev, lba, backing })
    }

    /// 取得 `lba` 的句柄但不读设备
    ///
    /// 给即将被整块覆盖的新块用。新槽位是全零，直接视为有效。
    pub fn get_noread(block_dev: &'a mut BlockDev<D>, lba: u64) -> Result<Self> {
        block_dev.check_lba(lba)?;

        let backing = if block_dev.has_cache() {
            block_dev.reserve_slot(lba)?;
            if let Some(slot) = block_dev.bcache.as_mut().and_then(|cache| cache.get_mut(lba)) {
                slot.set_uptodate();
            }
            Backing::Cached
        } else {
            let data = try_alloc_zeroed(block_dev.block_size() as usize)?;
            Backing::Local { data, dirty: false }
        };

        Ok(Self { block_dev, lba, backing })
    }

    /// 块号
    pub fn lba(&self) -> u64 {
        self.lba
    }

    /// 只读访问块内容
    pub fn with_data<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&[u8]) -> R,
    {
        if let Backing::Local { data, .. } = &self.backing {
            return Ok(f(data));
        }
        match self.block_dev.bcache.as_ref().and_then(|cache| cache.peek(self.lba)) {
            Some(slot) => Ok(f(slot.data())),
            None => Err(Error::new(ErrorKind::InvalidState, "block not cached")),
        }
    }

    /// 修改块内容，之后块被视为脏
    pub fn with_data_mut<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        if let Backing::Local { data, dirty } = &mut self.backing {
            *dirty = true;
            return Ok(f(data));
        }

        self.block_dev.inc_write_count();
        let cache = self
            .block_dev
            .bcache
            .as_mut()
            .ok_or(Error::new(ErrorKind::InvalidState, "cache went away"))?;
        let slot = cache
            .get_mut(self.lba)
            .ok_or(Error::new(ErrorKind::InvalidState, "block not cached"))?;
        let result = f(slot.data_mut());
        cache.set_dirty(self.lba)?;
        Ok(result)
    }

    /// 释放句柄，返回私有副本的写回错误
    pub fn release(mut self) -> Result<()> {
        self.write_back_local()
    }

    fn write_back_local(&mut self) -> Result<()> {
        if let Backing::Local { data, dirty } = &mut self.backing {
            if *dirty {
                self.block_dev.write_block(self.lba, &data[..])?;
                *dirty = false;
            }
        }
        Ok(())
    }
}

impl<'a, D: BlockDevice> Drop for Block<'a, D> {
    fn drop(&mut self) {
        if let Err(e) = self.write_back_local() {
            log::error!("[BLOCK] lost write of LBA={:#x}: {}", self.lba, e);
        }
    }
}
