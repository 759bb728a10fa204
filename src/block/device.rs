//! 块设备 trait 与块号换算

use crate::cache::{BlockCache, CacheStats};
use crate::error::{Error, ErrorKind, Result};

/// 底层存储
///
/// 读写以扇区为单位，`lba` 参数是扇区号。卷按 `block_size` 访问，
/// [`BlockDev`] 负责换算。
///
/// ```rust,ignore
/// struct RamDisk(Vec<u8>);
///
/// impl BlockDevice for RamDisk {
///     fn block_size(&self) -> u32 { 4096 }
///     fn sector_size(&self) -> u32 { 512 }
///     fn total_blocks(&self) -> u64 { self.0.len() as u64 / 4096 }
///
///     fn read_blocks(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
///         let start = lba as usize * 512;
///         let len = count as usize * 512;
///         buf[..len].copy_from_slice(&self.0[start..start + len]);
///         Ok(len)
///     }
///
///     fn write_blocks(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize> {
///         let start = lba as usize * 512;
///         let len = count as usize * 512;
///         self.0[start..start + len].copy_from_slice(&buf[..len]);
///         Ok(len)
///     }
/// }
/// ```
pub trait BlockDevice {
    /// 卷块大小，APFS 一般是 4096
    fn block_size(&self) -> u32;

    /// 扇区大小
    fn sector_size(&self) -> u32;

    /// 设备上的卷块总数
    fn total_blocks(&self) -> u64;

    /// 从扇区 `lba` 起读 `count` 个扇区到 `buf`，返回字节数
    fn read_blocks(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize>;

    /// 从扇区 `lba` 起写 `count` 个扇区，返回字节数
    fn write_blocks(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize>;

    /// 把设备自身的写缓存落盘
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 卷看到的块设备
///
/// 在 [`BlockDevice`] 之上加了块号到扇区的换算、可选的 [`BlockCache`]
/// 以及读写计数。自身不加锁，卷把它放在 `spin::Mutex` 里，
/// 持有共享屏障的读路径也经由这把锁串行地发起 I/O。
pub struct BlockDev<D> {
    device: D,
    /// 逻辑读次数，缓存命中也算
    read_count: u64,
    /// 逻辑写次数
    write_count: u64,
    /// 真正落到设备上的读
    physical_read_count: u64,
    /// 真正落到设备上的写
    physical_write_count: u64,
    pub(super) bcache: Option<BlockCache>,
}

/// 把一个卷块写到设备上
fn write_through<D: BlockDevice>(
    device: &mut D,
    writes: &mut u64,
    lba: u64,
    data: &[u8],
) -> Result<usize> {
    if lba >= device.total_blocks() {
        return Err(Error::new(ErrorKind::Io, "block number beyond end of device"));
    }
    let per_block = device.block_size() / device.sector_size();
    *writes += 1;
    device.write_blocks(lba * per_block as u64, per_block, data)
}

impl<D: BlockDevice> BlockDev<D> {
    /// 包装设备，不带缓存
    ///
    /// 块大小不是扇区大小的整数倍时返回 `InvalidInput`。
    pub fn new(device: D) -> Result<Self> {
        let sector = device.sector_size();
        if sector == 0 || device.block_size() % sector != 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "block size is not a whole number of sectors",
            ));
        }

        Ok(Self {
            device,
            read_count: 0,
            write_count: 0,
            physical_read_count: 0,
            physical_write_count: 0,
            bcache: None,
        })
    }

    /// 包装设备，并带一个 `cache_blocks` 块的缓存
    pub fn new_with_cache(device: D, cache_blocks: usize) -> Result<Self> {
        let mut bdev = Self::new(device)?;
        bdev.bcache = Some(BlockCache::new(cache_blocks, bdev.block_size() as usize));
        Ok(bdev)
    }

    /// 底层设备
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 底层设备（可写）
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// 卷块大小
    pub fn block_size(&self) -> u32 {
        self.device.block_size()
    }

    /// 卷块总数
    pub fn total_blocks(&self) -> u64 {
        self.device.total_blocks()
    }

    /// 是否带缓存
    pub fn has_cache(&self) -> bool {
        self.bcache.is_some()
    }

    /// 缓存计数器，没有缓存时为 `None`
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.bcache.as_ref().map(BlockCache::stats)
    }

    /// 逻辑读次数
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    /// 逻辑写次数
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// 设备读次数
    pub fn physical_read_count(&self) -> u64 {
        self.physical_read_count
    }

    /// 设备写次数
    pub fn physical_write_count(&self) -> u64 {
        self.physical_write_count
    }

    /// 块号对应的首个扇区
    pub(super) fn block_to_sector(&self, lba: u64) -> u64 {
        lba * self.sectors_per_block() as u64
    }

    pub(super) fn sectors_per_block(&self) -> u32 {
        self.device.block_size() / self.device.sector_size()
    }

    /// 块号超出设备范围时返回 `Io`
    pub(super) fn check_lba(&self, lba: u64) -> Result<()> {
        if lba >= self.device.total_blocks() {
            return Err(Error::new(ErrorKind::Io, "block number beyond end of device"));
        }
        Ok(())
    }

    /// 绕过缓存读一个块
    pub(super) fn read_block_from_device(&mut self, lba: u64, buf: &mut [u8]) -> Result<usize> {
        self.check_lba(lba)?;
        let sector = self.block_to_sector(lba);
        let count = self.sectors_per_block();
        self.physical_read_count += 1;
        self.device.read_blocks(sector, count, buf)
    }

    /// 绕过缓存写一个块
    pub(crate) fn write_block_to_device(&mut self, lba: u64, buf: &[u8]) -> Result<usize> {
        write_through(&mut self.device, &mut self.physical_write_count, lba, buf)
    }

    pub(super) fn inc_read_count(&mut self) {
        self.read_count += 1;
    }

    pub(super) fn inc_write_count(&mut self) {
        self.write_count += 1;
    }

    /// 若 `lba` 在缓存中是脏的，立即写回
    pub fn flush_lba(&mut self, lba: u64) -> Result<()> {
        let Self { device, bcache, physical_write_count, .. } = self;
        if let Some(cache) = bcache {
            cache.write_back(lba, |lba, data| {
                write_through(device, physical_write_count, lba, data).map(drop)
            })?;
        }
        Ok(())
    }

    /// 从缓存中丢掉 `lba`，不写回
    ///
    /// 事务回滚时使用，被撤销的新块内容不能落盘。
    pub fn invalidate_lba(&mut self, lba: u64) {
        if let Some(cache) = &mut self.bcache {
            cache.discard(lba);
        }
    }

    /// 写回至多 `count` 个脏块，给新槽位腾地方
    pub(super) fn flush_some_dirty_blocks(&mut self, count: usize) -> Result<usize> {
        let Self { device, bcache, physical_write_count, .. } = self;
        match bcache {
            Some(cache) => cache.write_back_some(count, |lba, data| {
                write_through(device, physical_write_count, lba, data).map(drop)
            }),
            None => Ok(0),
        }
    }

    /// 写回全部脏块，再让设备落盘
    pub fn flush(&mut self) -> Result<()> {
        let Self { device, bcache, physical_write_count, .. } = self;
        if let Some(cache) = bcache {
            cache.write_back_all(|lba, data| {
                write_through(device, physical_write_count, lba, data).map(drop)
            })?;
        }
        self.device.flush()
    }
}
