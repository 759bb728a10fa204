//! 目录查询

use super::CatalogKey;
use alloc::vec::Vec;
use bitflags::bitflags;

bitflags! {
    /// 查询标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueryFlags: u32 {
        /// 查询目录树
        const CAT      = 0x0001;
        /// 只接受键完全匹配的记录（否则取不大于搜索键的最大记录）
        const EXACT    = 0x0002;
        /// 忽略名称，只按对象 id 与类型匹配
        const ANY_NAME = 0x0004;
        /// 游标模式：每次调用返回下一条匹配记录
        const MULTIPLE = 0x0008;
        /// 游标已走完
        const DONE     = 0x0010;
    }
}

/// 查询到的一条原始记录
///
/// 借用自查询内部的节点缓冲区，查询被下一次查找或变更操作消耗后即失效。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord<'a> {
    /// 原始键字节
    pub key: &'a [u8],
    /// 原始值字节
    pub val: &'a [u8],
}

/// 目录查询
///
/// 持有搜索键和上一次命中记录的拷贝（相当于 B 树节点缓冲区）。
/// 对目录的 insert / replace / remove 都按值接收 `Query`，
/// 因此从它解码出的记录不可能跨过一次变更继续存活。
#[derive(Debug)]
pub struct Query {
    pub(super) key: CatalogKey,
    pub(super) flags: QueryFlags,
    pub(super) found: Option<CatalogKey>,
    pub(super) key_buf: Vec<u8>,
    pub(super) val_buf: Vec<u8>,
}

impl Query {
    /// 创建查询
    pub fn new(key: CatalogKey, flags: QueryFlags) -> Self {
        Self {
            key,
            flags,
            found: None,
            key_buf: Vec::new(),
            val_buf: Vec::new(),
        }
    }

    /// 搜索键
    pub fn key(&self) -> &CatalogKey {
        &self.key
    }

    /// 查询标志
    pub fn flags(&self) -> QueryFlags {
        self.flags
    }

    /// 最近一次命中记录的排序键
    pub fn found_key(&self) -> Option<&CatalogKey> {
        self.found.as_ref()
    }

    /// 最近一次命中的原始记录
    pub fn record(&self) -> Option<RawRecord<'_>> {
        self.found.as_ref().map(|_| RawRecord {
            key: &self.key_buf,
            val: &self.val_buf,
        })
    }
}
