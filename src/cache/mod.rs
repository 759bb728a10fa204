//! 块缓存
//!
//! 目录节点块和 xattr 数据流块都经过这里。[`BlockCache`] 以块号为键，
//! 用 `lru` 决定驱逐顺序，只驱逐干净槽位；[`CacheBuffer`] 的 `UPTODATE`
//! 状态把"已读入"和"只是预留"区分开，两段式读取靠它判断读是否成功。
//!
//! 槽位内存通过 `alloc` 分配，分配失败报告 `NoMemory`。

mod block_cache;
mod buffer;

pub use block_cache::{BlockCache, CacheStats, DEFAULT_CACHE_SIZE};
pub use buffer::{CacheBuffer, CacheFlags};
