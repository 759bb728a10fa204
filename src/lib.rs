//! apfs_core: APFS 扩展属性子系统的纯 Rust 实现
//!
//! 这个库实现 APFS 卷上的扩展属性（xattr）存储：
//! - **记录编解码** - 目录中 xattr 记录的严格解码与构造
//! - **两种存储方式** - 小值内联在记录中，大值写入独立的数据流
//! - **事务化修改** - 所有修改在事务中完成，失败时整体回滚
//! - **卷级读写屏障** - 读操作共享，修改操作独占
//!
//! # 示例
//!
//! ```rust,ignore
//! use apfs_core::{Volume, VolumeConfig, XattrSetFlags};
//!
//! let vol = Volume::create(ram_disk, VolumeConfig::default())?;
//!
//! // 超过 3804 字节的值会单独存成数据流
//! let icon = [0u8; 8192];
//! vol.setxattr(ino, b"osx.com.apple.ResourceFork", Some(&icon), XattrSetFlags::CREATE)?;
//!
//! // 传 None 只查询长度
//! let len = vol.getxattr(ino, b"osx.com.apple.ResourceFork", None)?;
//! assert_eq!(len, icon.len());
//!
//! let mut names = [0u8; 64];
//! let used = vol.listxattr(ino, Some(&mut names))?;
//! assert_eq!(&names[..used], b"osx.com.apple.ResourceFork\0");
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`block`] - 块设备抽象和 I/O 操作
//! - [`cache`] - 块缓存
//! - [`consts`] / [`types`] - 磁盘格式常量与结构
//! - [`catalog`] - 目录记录索引与查询
//! - [`dstream`] - 数据流 extent 映射
//! - [`transaction`] - 事务
//! - [`fs`] - 卷与读写屏障
//! - [`xattr`] - 扩展属性

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod error;
pub mod utils;

// 存储
pub mod block;
pub mod cache;
pub mod bitmap;

// 磁盘格式
pub mod consts;
pub mod types;
pub mod superblock;

// 卷内对象
pub mod spaceman;
pub mod catalog;
pub mod dstream;
pub mod transaction;
pub mod fs;

pub mod xattr;

#[cfg(test)]
pub(crate) mod test_utils;

pub use block::{Block, BlockDev, BlockDevice};
pub use cache::{BlockCache, CacheBuffer, CacheFlags, CacheStats, DEFAULT_CACHE_SIZE};
pub use error::{Error, ErrorKind, Result};
pub use fs::{Volume, VolumeConfig, VolumeState, VolumeStats};
pub use superblock::Superblock;
pub use transaction::{MaxOps, Transaction, TxContext};
pub use xattr::{xattr_get, xattr_list, xattr_remove, xattr_set, XattrSetFlags};
