//! 命名空间处理器
//!
//! 磁盘上的属性名没有命名空间。对外统一加上虚拟的 `osx.` 前缀，
//! 处理器负责剥掉前缀并把请求交给存储层。

use super::{
    api::{xattr_get, xattr_set},
    XattrSetFlags,
};
use crate::{
    block::BlockDevice,
    consts::XATTR_MAC_OSX_PREFIX,
    error::{Error, ErrorKind, Result},
    fs::Volume,
};

/// xattr 命名空间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XattrNamespace {
    /// `osx.` 虚拟命名空间，覆盖磁盘上的全部属性
    Osx,
}

impl XattrNamespace {
    /// 命名空间前缀
    pub const fn prefix(self) -> &'static str {
        match self {
            XattrNamespace::Osx => XATTR_MAC_OSX_PREFIX,
        }
    }

    /// 读取属性（`name` 已去掉前缀）
    pub fn get<D: BlockDevice>(
        self,
        vol: &Volume<D>,
        ino: u64,
        name: &[u8],
        buf: Option<&mut [u8]>,
    ) -> Result<usize> {
        match self {
            XattrNamespace::Osx => xattr_get(vol, ino, name, buf),
        }
    }

    /// 设置或删除属性（`name` 已去掉前缀）
    pub fn set<D: BlockDevice>(
        self,
        vol: &Volume<D>,
        ino: u64,
        name: &[u8],
        value: Option<&[u8]>,
        flags: XattrSetFlags,
    ) -> Result<()> {
        match self {
            XattrNamespace::Osx => xattr_set(vol, ino, name, value, flags),
        }
    }
}

/// 已注册的处理器
pub const XATTR_HANDLERS: &[XattrNamespace] = &[XattrNamespace::Osx];

/// 按前缀选择处理器
///
/// # 返回
///
/// 处理器和去掉前缀后的磁盘名称。没有匹配的前缀返回 `Unsupported`，
/// 前缀之后为空返回 `InvalidInput`。
pub fn resolve(full_name: &[u8]) -> Result<(XattrNamespace, &[u8])> {
    for &handler in XATTR_HANDLERS {
        if let Some(name) = full_name.strip_prefix(handler.prefix().as_bytes()) {
            if name.is_empty() {
                return Err(Error::new(ErrorKind::InvalidInput, "empty xattr name"));
            }
            return Ok((handler, name));
        }
    }
    Err(Error::new(ErrorKind::Unsupported, "unknown xattr namespace"))
}
