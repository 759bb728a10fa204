//! 卷与卷级读写屏障

use super::types::{VolumeConfig, VolumeStats};
use crate::{
    block::{BlockDev, BlockDevice},
    catalog::Catalog,
    error::{Error, ErrorKind, Result},
    spaceman::SpaceManager,
    superblock::Superblock,
    transaction::Transaction,
    xattr::{self, XattrSetFlags},
};
use spin::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// 卷状态
///
/// 读路径持有 `&VolumeState`，块 I/O 经由内部的设备锁串行化；
/// 修改路径持有 `&mut VolumeState`，只能通过 [`Volume::lock_exclusive`] 获得。
pub struct VolumeState<D: BlockDevice> {
    pub(crate) bdev: Mutex<BlockDev<D>>,
    pub(crate) sb: Superblock,
    pub(crate) catalog: Catalog,
    pub(crate) spaceman: SpaceManager,
    pub(crate) tx: Option<Transaction>,
}

impl<D: BlockDevice> VolumeState<D> {
    /// 在块设备上创建一个空卷
    pub fn new(device: D, config: VolumeConfig) -> Result<Self> {
        let sb = Superblock::new(device.block_size(), config.first_obj_id, config.encrypted)?;
        let total_blocks = device.total_blocks();
        let bdev = if config.cache_blocks > 0 {
            BlockDev::new_with_cache(device, config.cache_blocks)?
        } else {
            BlockDev::new(device)?
        };
        let spaceman = SpaceManager::new(total_blocks, config.reserved_blocks)?;

        log::info!(
            "[VOLUME] created: block_size={}, blocks={}, encrypted={}",
            sb.block_size(),
            total_blocks,
            sb.is_encrypted()
        );

        Ok(Self {
            bdev: Mutex::new(bdev),
            sb,
            catalog: Catalog::new(),
            spaceman,
            tx: None,
        })
    }

    /// superblock
    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    /// 目录
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// 空间管理器
    pub fn spaceman(&self) -> &SpaceManager {
        &self.spaceman
    }

    /// 块设备（加锁访问）
    pub fn bdev(&self) -> spin::MutexGuard<'_, BlockDev<D>> {
        self.bdev.lock()
    }

    /// 卷统计信息
    pub fn stats(&self) -> VolumeStats {
        let bdev = self.bdev.lock();
        VolumeStats {
            block_size: self.sb.block_size(),
            total_blocks: self.spaceman.total_blocks(),
            used_blocks: self.spaceman.used_blocks(),
            free_blocks: self.spaceman.free_count(),
            next_obj_id: self.sb.next_obj_id(),
            catalog_records: self.catalog.len(),
            physical_reads: bdev.physical_read_count(),
            physical_writes: bdev.physical_write_count(),
            cache: bdev.cache_stats(),
        }
    }
}

/// 卷
///
/// 包裹卷状态的单一读写屏障：读操作取共享模式，修改操作取独占模式。
/// 屏障是卷级的，不同 inode 上的写操作同样互斥。
///
/// # 示例
///
/// ```rust,ignore
/// let vol = Volume::create(device, VolumeConfig::default())?;
/// vol.setxattr(ino, b"osx.com.example.tag", Some(b"red"), XattrSetFlags::empty())?;
///
/// let mut buf = [0u8; 16];
/// let n = vol.getxattr(ino, b"osx.com.example.tag", Some(&mut buf))?;
/// assert_eq!(&buf[..n], b"red");
/// ```
pub struct Volume<D: BlockDevice> {
    state: RwLock<VolumeState<D>>,
}

impl<D: BlockDevice> Volume<D> {
    /// 在块设备上创建一个空卷
    pub fn create(device: D, config: VolumeConfig) -> Result<Self> {
        Ok(Self {
            state: RwLock::new(VolumeState::new(device, config)?),
        })
    }

    /// 取共享屏障
    pub fn read(&self) -> RwLockReadGuard<'_, VolumeState<D>> {
        self.state.read()
    }

    /// 取独占屏障
    ///
    /// 删除某个 inode 的全部 xattr（[`xattr::delete_all`]）需要调用者在整个循环期间持有它。
    pub fn lock_exclusive(&self) -> RwLockWriteGuard<'_, VolumeState<D>> {
        self.state.write()
    }

    /// 读取带命名空间前缀的属性
    ///
    /// # 返回
    ///
    /// `buf` 为 None 时返回值长度，否则返回写入的字节数
    pub fn getxattr(&self, ino: u64, full_name: &[u8], buf: Option<&mut [u8]>) -> Result<usize> {
        let (handler, name) = xattr::resolve(full_name)?;
        handler.get(self, ino, name, buf)
    }

    /// 设置带命名空间前缀的属性，`value` 为 None 表示删除
    pub fn setxattr(
        &self,
        ino: u64,
        full_name: &[u8],
        value: Option<&[u8]>,
        flags: XattrSetFlags,
    ) -> Result<()> {
        let (handler, name) = xattr::resolve(full_name)?;
        handler.set(self, ino, name, value, flags)
    }

    /// 删除带命名空间前缀的属性
    pub fn removexattr(&self, ino: u64, full_name: &[u8]) -> Result<()> {
        self.setxattr(ino, full_name, None, XattrSetFlags::REPLACE)
    }

    /// 列出 inode 的全部属性名（带命名空间前缀，以 NUL 分隔）
    pub fn listxattr(&self, ino: u64, buf: Option<&mut [u8]>) -> Result<usize> {
        xattr::xattr_list(self, ino, buf)
    }

    /// 卷统计信息
    pub fn stats(&self) -> VolumeStats {
        self.read().stats()
    }

    /// 将缓存中的脏块全部写回
    ///
    /// 有活跃事务时返回 `Busy`
    pub fn sync(&self) -> Result<()> {
        let mut state = self.lock_exclusive();
        if state.in_transaction() {
            return Err(Error::new(ErrorKind::Busy, "transaction running"));
        }
        state.bdev.get_mut().flush()
    }
}
