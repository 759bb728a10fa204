//! 数据流（dstream）
//!
//! 数据流的物理布局由目录中的 `FILE_EXTENT` 记录描述：键为 `(流 id, 逻辑字节偏移)`，
//! 值为 `(长度, 起始物理块, crypto id)`。写入时新分配的块先合并进句柄上缓存的
//! extent，遇到不连续的块或显式刷新时才写成目录记录。

mod extents;

pub use extents::{read_extent, ExtentRecord};

use spin::Mutex;

/// 句柄上缓存的一个 extent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachedExtent {
    /// 逻辑字节偏移
    pub logical_addr: u64,
    /// 起始物理块号（0 表示空洞）
    pub phys_block_num: u64,
    /// 字节长度，0 表示缓存为空
    pub len: u64,
    /// 是否尚未写成目录记录
    pub dirty: bool,
}

impl CachedExtent {
    /// 缓存的 extent 是否覆盖某个逻辑字节偏移
    fn covers(&self, offset: u64) -> bool {
        self.len != 0 && offset >= self.logical_addr && offset - self.logical_addr < self.len
    }
}

/// 数据流句柄
///
/// 每个句柄独占自己的 extent 缓存，缓存由专用的锁保护。
#[derive(Debug)]
pub struct DstreamInfo {
    /// 流对象 id
    pub id: u64,
    /// 逻辑大小（字节）
    pub size: u64,
    /// 稀疏字节数（xattr 流总是完整分配，恒为 0）
    pub sparse_bytes: u64,
    pub(crate) cached_ext: Mutex<CachedExtent>,
}

impl DstreamInfo {
    /// 创建句柄，extent 缓存为空
    pub fn new(id: u64, size: u64) -> Self {
        Self {
            id,
            size,
            sparse_bytes: 0,
            cached_ext: Mutex::new(CachedExtent::default()),
        }
    }

    /// 当前缓存的 extent
    pub fn cached_extent(&self) -> CachedExtent {
        *self.cached_ext.lock()
    }

    /// 按块大小向上取整后的分配大小
    pub fn alloced_size(&self, block_size: u32) -> u64 {
        let mask = block_size as u64 - 1;
        (self.size + mask) & !mask
    }
}
