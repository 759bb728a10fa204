//! extent 映射、分配与截断

use super::{CachedExtent, DstreamInfo};
use crate::{
    block::BlockDevice,
    catalog::{Catalog, CatalogKey, Query, QueryFlags, RawRecord},
    consts::*,
    error::{Error, ErrorKind, Result},
    superblock::Superblock,
    transaction::TxContext,
    types::{j_file_extent_key, j_file_extent_val, j_key},
};

/// 解码后的文件 extent 记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentRecord {
    /// 逻辑字节偏移
    pub logical_addr: u64,
    /// 字节长度
    pub len: u64,
    /// 起始物理块号（0 表示空洞）
    pub phys_block_num: u64,
    /// crypto id
    pub crypto_id: u64,
}

impl ExtentRecord {
    fn decode(rec: RawRecord<'_>) -> Result<Self> {
        let key = j_file_extent_key::parse(rec.key)?;
        let val = j_file_extent_val::parse(rec.val)?;
        if rec.key.len() != j_file_extent_key::SIZE || rec.val.len() != j_file_extent_val::SIZE {
            return Err(Error::new(ErrorKind::Corrupted, "bad extent record size"));
        }
        let ext = Self {
            logical_addr: key.logical_addr,
            len: val.len(),
            phys_block_num: val.phys_block_num,
            crypto_id: val.crypto_id,
        };
        if ext.logical_addr.checked_add(ext.len).is_none() {
            log::error!(
                "[DSTREAM] extent {:#x}+{:#x} of stream {:#x} wraps the address space",
                ext.logical_addr,
                ext.len,
                key.hdr.obj_id()
            );
            return Err(Error::new(ErrorKind::Corrupted, "extent end overflows"));
        }
        Ok(ext)
    }

    /// 最后一个物理块号，空洞或超出 u64 时为 None
    fn last_phys(&self, bits: u32) -> Option<u64> {
        if self.phys_block_num == 0 || self.len == 0 {
            return None;
        }
        self.phys_block_num.checked_add((self.len - 1) >> bits)
    }
}

/// 查找覆盖或位于 `offset` 之前的最后一个 extent
pub fn read_extent(catalog: &Catalog, id: u64, offset: u64) -> Result<Option<ExtentRecord>> {
    let mut q = Query::new(CatalogKey::file_extent(id, offset), QueryFlags::CAT);
    if !catalog.query(&mut q)? {
        return Ok(None);
    }
    match q.record() {
        Some(rec) => ExtentRecord::decode(rec).map(Some),
        None => Ok(None),
    }
}

impl DstreamInfo {
    /// 将逻辑块号映射到物理块号
    ///
    /// # 返回
    ///
    /// 物理块号；落在空洞中或超出所有 extent 时返回 0
    pub fn logic_to_phys_bno(&self, catalog: &Catalog, sb: &Superblock, lblk: u64) -> Result<u64> {
        let bits = sb.block_size_bits();
        let offset = lblk << bits;

        let mut cached = self.cached_ext.lock();
        if cached.covers(offset) {
            return phys_at(&cached, offset, bits).ok_or_else(|| self.corrupt("cached extent overflows"));
        }

        let Some(ext) = read_extent(catalog, self.id, offset)? else {
            return Ok(0);
        };
        if offset - ext.logical_addr >= ext.len {
            return Ok(0);
        }
        if ext.phys_block_num != 0 && ext.last_phys(bits).is_none() {
            return Err(self.corrupt("extent runs past the last block number"));
        }

        let found = CachedExtent {
            logical_addr: ext.logical_addr,
            phys_block_num: ext.phys_block_num,
            len: ext.len,
            dirty: false,
        };
        let bno = phys_at(&found, offset, bits)
            .ok_or_else(|| self.corrupt("extent runs past the last block number"))?;
        if !cached.dirty {
            *cached = found;
        }
        Ok(bno)
    }

    /// 为逻辑块分配一个新的物理块
    ///
    /// 新块与缓存的 extent 在逻辑和物理上都相邻时直接扩展缓存，
    /// 否则先把缓存的 extent 写成目录记录，再以新块开始一个新的 extent。
    pub fn get_new_bno<D: BlockDevice>(&self, ctx: &mut TxContext<'_, D>, lblk: u64) -> Result<u64> {
        let bs = ctx.sb().block_size() as u64;
        let offset = lblk << ctx.sb().block_size_bits();

        let mut cached = self.cached_ext.lock();
        // 目标块只是提示，算不出来就交给分配器自己找
        let next_phys = (cached.len != 0 && cached.phys_block_num != 0)
            .then(|| cached.phys_block_num.checked_add(cached.len / bs))
            .flatten();
        let bno = ctx.alloc_block(next_phys.unwrap_or(0))?;

        let contiguous = next_phys == Some(bno)
            && cached.logical_addr.checked_add(cached.len) == Some(offset);
        if contiguous {
            cached.len += bs;
            cached.dirty = true;
        } else {
            if cached.dirty {
                self.write_extent_record(ctx, &cached)?;
            }
            *cached = CachedExtent {
                logical_addr: offset,
                phys_block_num: bno,
                len: bs,
                dirty: true,
            };
        }

        log::trace!("[DSTREAM] {:#x}: lblk {} -> block {:#x}", self.id, lblk, bno);
        Ok(bno)
    }

    /// 将缓存的 extent 写成目录记录
    pub fn flush_extent_cache<D: BlockDevice>(&self, ctx: &mut TxContext<'_, D>) -> Result<()> {
        let mut cached = self.cached_ext.lock();
        if cached.dirty {
            self.write_extent_record(ctx, &cached)?;
            cached.dirty = false;
        }
        Ok(())
    }

    fn write_extent_record<D: BlockDevice>(
        &self,
        ctx: &mut TxContext<'_, D>,
        ext: &CachedExtent,
    ) -> Result<()> {
        let mut raw_key = [0u8; j_file_extent_key::SIZE];
        j_file_extent_key {
            hdr: j_key::new(self.id, APFS_TYPE_FILE_EXTENT),
            logical_addr: ext.logical_addr,
        }
        .write_to(&mut raw_key);

        let crypto_id = if ctx.sb().is_encrypted() { self.id } else { 0 };
        let mut raw_val = [0u8; j_file_extent_val::SIZE];
        j_file_extent_val::new(ext.len, ext.phys_block_num, crypto_id).write_to(&mut raw_val);

        let mut q = Query::new(
            CatalogKey::file_extent(self.id, ext.logical_addr),
            QueryFlags::CAT | QueryFlags::EXACT,
        );
        let catalog = ctx.catalog_mut();
        if catalog.query(&mut q)? {
            catalog.replace(q, &raw_key, &raw_val)
        } else {
            catalog.insert(q, &raw_key, &raw_val)
        }
    }

    /// 截断数据流
    ///
    /// 从最后一个 extent 开始向前，删除或缩短超出新大小的 extent，并释放其物理块。
    /// 每一步都重新查询，因为删除会使上一次的查询位置失效。
    pub fn truncate<D: BlockDevice>(&mut self, ctx: &mut TxContext<'_, D>, new_size: u64) -> Result<()> {
        self.flush_extent_cache(ctx)?;

        let bs = ctx.sb().block_size() as u64;
        let keep_bytes = new_size
            .checked_next_multiple_of(bs)
            .ok_or(Error::new(ErrorKind::InvalidInput, "truncate size out of range"))?;

        loop {
            let mut q = Query::new(CatalogKey::file_extent(self.id, u64::MAX), QueryFlags::CAT);
            if !ctx.catalog().query(&mut q)? {
                break;
            }
            let ext = match q.record() {
                Some(rec) => ExtentRecord::decode(rec)?,
                None => break,
            };
            // decode 已保证 logical_addr + len 不溢出
            if ext.logical_addr + ext.len <= keep_bytes {
                break;
            }
            if ext.len % bs != 0 {
                return Err(self.corrupt("misaligned extent length"));
            }

            if ext.logical_addr >= keep_bytes {
                ctx.catalog_mut().remove(q)?;
                if ext.phys_block_num != 0 {
                    ctx.free_blocks(ext.phys_block_num, ext.len / bs)?;
                }
            } else {
                let kept = keep_bytes - ext.logical_addr;
                let mut raw_key = [0u8; j_file_extent_key::SIZE];
                let mut raw_val = [0u8; j_file_extent_val::SIZE];
                if let Some(rec) = q.record() {
                    raw_key.copy_from_slice(rec.key);
                }
                j_file_extent_val::new(kept, ext.phys_block_num, ext.crypto_id).write_to(&mut raw_val);
                ctx.catalog_mut().replace(q, &raw_key, &raw_val)?;
                if ext.phys_block_num != 0 {
                    let tail = ext
                        .phys_block_num
                        .checked_add(kept / bs)
                        .ok_or_else(|| self.corrupt("extent runs past the last block number"))?;
                    ctx.free_blocks(tail, (ext.len - kept) / bs)?;
                }
            }
        }

        *self.cached_ext.lock() = CachedExtent::default();
        self.size = new_size;
        log::debug!("[DSTREAM] {:#x}: truncated to {} bytes", self.id, new_size);
        Ok(())
    }
}

impl DstreamInfo {
    fn corrupt(&self, what: &'static str) -> Error {
        log::error!("[DSTREAM] stream {:#x}: {}", self.id, what);
        Error::new(ErrorKind::Corrupted, what)
    }
}

/// extent 内某偏移对应的物理块号，空洞为 0，块号溢出时为 None
fn phys_at(ext: &CachedExtent, offset: u64, bits: u32) -> Option<u64> {
    if ext.phys_block_num == 0 {
        return Some(0);
    }
    ext.phys_block_num.checked_add((offset - ext.logical_addr) >> bits)
}
