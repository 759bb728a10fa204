//! APFS 扩展属性 (Extended Attributes)
//!
//! 属性以目录记录的形式存放，键为 `(inode id, 名称)`。值有两种存储方式：
//!
//! 1. **内联** - 不超过 `APFS_XATTR_MAX_EMBEDDED_SIZE` 字节的值直接存放在记录中
//! 2. **数据流** - 更大的值写入一个独立的数据流，记录中只保存流描述符
//!
//! # 模块结构
//!
//! - `record` - 记录编解码与数据流描述符解析
//! - `read` - 内联值与数据流值的读取
//! - `write` - 为大值创建数据流
//! - `api` - get / set / 删除 / 列出
//! - `handler` - `osx.` 命名空间处理器
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use apfs_core::xattr::{self, XattrSetFlags};
//!
//! xattr::xattr_set(&vol, ino, b"com.example.note", Some(b"hello"), XattrSetFlags::CREATE)?;
//!
//! let mut buf = [0u8; 64];
//! let len = xattr::xattr_get(&vol, ino, b"com.example.note", Some(&mut buf))?;
//! assert_eq!(&buf[..len], b"hello");
//!
//! // 删除 inode 的全部属性（调用者持有独占屏障并已开始事务）
//! let mut state = vol.lock_exclusive();
//! state.transaction_start(MaxOps::default())?;
//! xattr::delete_all(&mut state, ino)?;
//! state.transaction_commit()?;
//! ```

mod api;
mod handler;
mod read;
mod record;
mod write;

pub use api::{
    delete_all, delete_any_xattr, detach_xattr, get, get_with_policy, list, repeat_until_empty, set,
    xattr_get, xattr_list, xattr_remove, xattr_set, DeleteStep, OrphanStream,
};
pub use handler::{resolve, XattrNamespace, XATTR_HANDLERS};
pub use read::{extents_read, inline_read};
pub use record::{
    build_dstream_xattr_val, build_inline_xattr_val, build_xattr_key, dstream_from_xattr,
    mark_fs_owned, validate_name, XattrFlags, XattrRecord,
};
pub use write::create_xattr_dstream;

use bitflags::bitflags;

bitflags! {
    /// xattr set 标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct XattrSetFlags: u32 {
        /// 属性必须不存在
        const CREATE  = 0x1;
        /// 属性必须已存在
        const REPLACE = 0x2;
    }
}
