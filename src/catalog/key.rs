//! 目录记录的排序键

use crate::{
    consts::*,
    error::{Error, ErrorKind, Result},
    types::{j_file_extent_key, j_key, j_xattr_key},
    utils::try_to_vec,
};
use alloc::vec::Vec;

/// 目录记录的排序键
///
/// 按 `(对象 id, 记录类型, 序号, 名称)` 排序。xattr 记录的序号为 0、名称为磁盘上的
/// 名称（不含结尾 NUL）；文件 extent 记录的序号为逻辑字节偏移、名称为空。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CatalogKey {
    /// 所属对象 id
    pub obj_id: u64,
    /// 记录类型（`APFS_TYPE_*`）
    pub obj_type: u8,
    /// 类型内序号
    pub number: u64,
    /// 名称字节
    pub name: Vec<u8>,
}

impl CatalogKey {
    /// xattr 键；`name` 为 None 时是该对象所有 xattr 之前的最小键
    pub fn xattr(obj_id: u64, name: Option<&[u8]>) -> Result<Self> {
        Ok(Self {
            obj_id,
            obj_type: APFS_TYPE_XATTR,
            number: 0,
            name: match name {
                Some(name) => try_to_vec(name)?,
                None => Vec::new(),
            },
        })
    }

    /// 文件 extent 键
    pub fn file_extent(obj_id: u64, logical_addr: u64) -> Self {
        Self {
            obj_id,
            obj_type: APFS_TYPE_FILE_EXTENT,
            number: logical_addr,
            name: Vec::new(),
        }
    }

    /// 同一对象、同一类型的最小键
    pub(super) fn first_of(&self) -> Self {
        Self {
            obj_id: self.obj_id,
            obj_type: self.obj_type,
            number: 0,
            name: Vec::new(),
        }
    }

    /// 是否与另一键属于同一对象的同一类记录
    pub fn same_owner(&self, other: &CatalogKey) -> bool {
        self.obj_id == other.obj_id && self.obj_type == other.obj_type
    }

    /// 从磁盘格式的原始键字节推导排序键
    ///
    /// xattr 名称取键后的实际字节（去掉一个结尾 NUL），不信任 `name_len` 字段，
    /// 这样格式错误的记录仍能被定位，由解码时报告损坏。
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        let hdr = j_key::parse(raw)?;
        match hdr.obj_type() {
            APFS_TYPE_XATTR => {
                j_xattr_key::parse(raw)?;
                let mut name = &raw[j_xattr_key::SIZE..];
                if let [rest @ .., 0] = name {
                    name = rest;
                }
                Self::xattr(hdr.obj_id(), Some(name))
            }
            APFS_TYPE_FILE_EXTENT => {
                let key = j_file_extent_key::parse(raw)?;
                Ok(Self::file_extent(hdr.obj_id(), key.logical_addr))
            }
            _ => Err(Error::new(ErrorKind::Unsupported, "unknown catalog record type")),
        }
    }
}
