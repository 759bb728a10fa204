//! 块 I/O 操作实现
//!
//! 除了整块读写，这里还提供两段式读取：`submit_read` 只负责把块读进缓存，
//! `wait_read` 再检查块是否最新并交给调用者。先对一批块全部提交、再逐个等待，
//! 与内核 `submit_bh` / `wait_on_buffer` 的用法一致。

use super::{BlockDev, BlockDevice};
use crate::error::{Error, ErrorKind, Result};
use crate::utils::try_alloc_zeroed;

impl<D: BlockDevice> BlockDev<D> {
    /// 把块 `lba` 读进 `buf`，返回块大小
    ///
    /// 缓存里有有效内容时不访问设备；否则读设备并顺手放进缓存。
    pub fn read_block(&mut self, lba: u64, buf: &mut [u8]) -> Result<usize> {
        let block_size = self.block_size() as usize;

        if buf.len() < block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer shorter than a block",
            ));
        }

        self.inc_read_count();

        if let Some(data) = self.bcache.as_ref().and_then(|c| c.uptodate_data(lba)) {
            buf[..block_size].copy_from_slice(data);
            return Ok(block_size);
        }

        self.read_block_from_device(lba, &mut buf[..block_size])?;

        // 缓存被脏块占满时不缓存这次读到的内容
        if let Some(Ok((slot, _))) = self.bcache.as_mut().map(|c| c.slot(lba)) {
            if !slot.is_dirty() {
                slot.fill(&buf[..block_size]);
            }
        }

        Ok(block_size)
    }

    /// 把 `buf` 写为块 `lba`，返回块大小
    ///
    /// 带缓存时只更新槽位并记为脏，等 `flush` 或脏块压力时才落盘。
    pub fn write_block(&mut self, lba: u64, buf: &[u8]) -> Result<usize> {
        let block_size = self.block_size() as usize;

        if buf.len() < block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer shorter than a block",
            ));
        }

        self.check_lba(lba)?;
        self.inc_write_count();

        if self.has_cache() {
            self.reserve_slot(lba)?;
            if let Some(cache) = &mut self.bcache {
                if let Some(slot) = cache.get_mut(lba) {
                    slot.fill(&buf[..block_size]);
                }
                cache.set_dirty(lba)?;
            }
            return Ok(block_size);
        }

        self.write_block_to_device(lba, &buf[..block_size])
    }

    /// 提交一个块的读请求
    ///
    /// 块已在缓存中且是最新的则什么也不做。设备读取失败不会在这里报错：
    /// 槽位保持"未更新"状态，由随后的 [`wait_read`](Self::wait_read) 报告 `Io`。
    ///
    /// 无缓存时提交是空操作，读取推迟到 `wait_read`。
    pub fn submit_read(&mut self, lba: u64) -> Result<()> {
        self.check_lba(lba)?;
        if !self.has_cache() {
            return Ok(());
        }

        self.inc_read_count();
        self.reserve_slot(lba)?;
        if let Err(e) = self.fill_slot(lba) {
            log::debug!("[BLOCK] submit_read LBA={:#x} failed: {}", lba, e);
        }
        Ok(())
    }

    /// 等待一个已提交的读请求完成，并以只读方式访问块数据
    ///
    /// # 返回
    ///
    /// - 块是最新的：返回闭包结果
    /// - 块未能读入（设备报错）：返回 `Io`
    /// - 提交后块已被驱逐：重新同步读取一次
    pub fn wait_read<F, R>(&mut self, lba: u64, f: F) -> Result<R>
    where
        F: FnOnce(&[u8]) -> R,
    {
        let uptodate = self
            .bcache
            .as_ref()
            .and_then(|cache| cache.peek(lba))
            .map(|buf| buf.is_uptodate());

        match uptodate {
            Some(true) => match self.bcache.as_ref().and_then(|cache| cache.uptodate_data(lba)) {
                Some(data) => Ok(f(data)),
                None => Err(Error::new(ErrorKind::Io, "block not uptodate")),
            },
            Some(false) => {
                self.invalidate_lba(lba);
                Err(Error::new(ErrorKind::Io, "block not uptodate"))
            }
            None => {
                let mut temp = try_alloc_zeroed(self.block_size() as usize)?;
                self.read_block(lba, &mut temp)
                    .map_err(|_| Error::new(ErrorKind::Io, "block not uptodate"))?;
                Ok(f(&temp))
            }
        }
    }

    /// 在缓存中为块预留槽位
    ///
    /// 缓存被脏块占满时先写回四分之一容量的脏块再重试。
    ///
    /// # 返回
    ///
    /// 槽位是否是新分配的（无缓存时返回 false）
    pub(crate) fn reserve_slot(&mut self, lba: u64) -> Result<bool> {
        let Some(cache) = self.bcache.as_mut() else {
            return Ok(false);
        };

        match cache.slot(lba) {
            Ok((_, fresh)) => Ok(fresh),
            Err(e) if e.kind() == ErrorKind::NoSpace => {
                let batch = cache.capacity() / 4;
                log::warn!("[BLOCK] cache pinned by dirty blocks, writing back {}", batch);
                self.flush_some_dirty_blocks(batch)?;
                match self.bcache.as_mut() {
                    Some(cache) => cache.slot(lba).map(|(_, fresh)| fresh),
                    None => Ok(false),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// 若缓存槽位尚未更新，从设备读取内容填充它
    pub(crate) fn fill_slot(&mut self, lba: u64) -> Result<()> {
        let uptodate = self
            .bcache
            .as_ref()
            .and_then(|cache| cache.peek(lba))
            .map_or(true, |buf| buf.is_uptodate());
        if uptodate {
            return Ok(());
        }

        let mut temp = try_alloc_zeroed(self.block_size() as usize)?;
        self.read_block_from_device(lba, &mut temp)?;

        if let Some(slot) = self.bcache.as_mut().and_then(|cache| cache.get_mut(lba)) {
            slot.fill(&temp);
        }
        Ok(())
    }
}
