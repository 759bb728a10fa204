//! xattr 记录编解码
//!
//! 磁盘上的 xattr 记录：
//!
//! ```text
//! key: j_xattr_key { hdr, name_len } + name[name_len]     (name 以 NUL 结尾)
//! val: j_xattr_val { flags, xdata_len } + xdata
//!      xdata = 内联值（EMBEDDED）或 j_xattr_dstream（DATA_STREAM）
//! ```
//!
//! 解码直接借用查询缓冲区中的字节，不做拷贝。任何长度或结构不符都报告为 `Corrupted`，
//! 从不截断或补齐。

use crate::{
    catalog::Query,
    consts::*,
    dstream::DstreamInfo,
    error::{Error, ErrorKind, Result},
    superblock::Superblock,
    types::{j_dstream, j_key, j_xattr_dstream, j_xattr_key, j_xattr_val},
    utils::try_alloc_zeroed,
};
use alloc::vec::Vec;
use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};

bitflags! {
    /// xattr 值标志（`j_xattr_val.flags`）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct XattrFlags: u16 {
        /// 值存放在数据流中
        const DATA_STREAM       = 0x0001;
        /// 值内联存放在记录中
        const DATA_EMBEDDED     = 0x0002;
        /// 文件系统自用属性
        const FILE_SYSTEM_OWNED = 0x0004;
        /// 保留
        const RESERVED_8        = 0x0008;
    }
}

/// 解码后的 xattr 记录
///
/// 借用自产生它的查询的节点缓冲区。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XattrRecord<'a> {
    /// 属性名（不含 NUL）
    pub name: &'a [u8],
    /// 值是否存放在数据流中
    pub has_dstream: bool,
    /// 内联值，或数据流描述符的原始字节
    pub xdata: &'a [u8],
}

impl<'a> XattrRecord<'a> {
    /// 从原始键和值字节解码
    pub fn from_raw(raw_key: &'a [u8], raw_val: &'a [u8]) -> Result<Self> {
        let corrupted = |msg| Err(Error::new(ErrorKind::Corrupted, msg));

        if raw_val.len() < j_xattr_val::SIZE || raw_key.len() < j_xattr_key::SIZE {
            return corrupted("xattr record too short");
        }
        let key = j_xattr_key::parse(raw_key)?;
        let val = j_xattr_val::parse(raw_val)?;
        let namelen = raw_key.len() - j_xattr_key::SIZE;
        let datalen = raw_val.len() - j_xattr_val::SIZE;

        if namelen < 1 {
            return corrupted("xattr name is empty");
        }
        if namelen != key.name_len as usize {
            return corrupted("xattr name length mismatch");
        }
        if raw_key[raw_key.len() - 1] != 0 {
            return corrupted("xattr name not NUL-terminated");
        }

        let has_dstream = XattrFlags::from_bits_retain(val.flags).contains(XattrFlags::DATA_STREAM);
        if has_dstream {
            if datalen != j_xattr_dstream::SIZE {
                return corrupted("bad xattr dstream size");
            }
        } else if datalen != val.xdata_len as usize {
            return corrupted("inline xattr length mismatch");
        }

        Ok(Self {
            name: &raw_key[j_xattr_key::SIZE..raw_key.len() - 1],
            has_dstream,
            xdata: &raw_val[j_xattr_val::SIZE..],
        })
    }

    /// 解码查询命中的记录
    pub fn from_query(query: &'a Query) -> Result<Self> {
        let rec = query
            .record()
            .ok_or(Error::new(ErrorKind::InvalidState, "query has no record"))?;
        Self::from_raw(rec.key, rec.val)
    }
}

/// 从数据流型记录构造数据流句柄
///
/// 每次调用都返回新的句柄：extent 缓存为空，有自己的锁，稀疏字节数为 0。
/// 句柄不借用记录字节，可以在查询失效后继续使用。
pub fn dstream_from_xattr(xattr: &XattrRecord<'_>) -> Result<DstreamInfo> {
    if !xattr.has_dstream {
        return Err(Error::new(ErrorKind::InvalidInput, "xattr has no dstream"));
    }
    let desc = j_xattr_dstream::parse(xattr.xdata)?;
    Ok(DstreamInfo::new(desc.xattr_obj_id, desc.dstream.size))
}

/// 检查属性名能否写入磁盘
///
/// 名称不能为空、不能包含 NUL，且含 NUL 的长度必须放得进 16 位长度字段。
pub fn validate_name(name: &[u8]) -> Result<()> {
    if name.is_empty() {
        return Err(Error::new(ErrorKind::InvalidInput, "empty xattr name"));
    }
    if name.contains(&0) {
        return Err(Error::new(ErrorKind::InvalidInput, "xattr name contains NUL"));
    }
    if name.len() >= u16::MAX as usize {
        return Err(Error::new(ErrorKind::InvalidInput, "xattr name too long"));
    }
    Ok(())
}

/// 构造 xattr 记录键
pub fn build_xattr_key(ino: u64, name: &[u8]) -> Result<Vec<u8>> {
    validate_name(name)?;
    let namelen = name.len() + 1;
    let mut raw = try_alloc_zeroed(j_xattr_key::SIZE + namelen)?;
    j_xattr_key {
        hdr: j_key::new(ino, APFS_TYPE_XATTR),
        name_len: namelen as u16,
    }
    .write_to(&mut raw);
    raw[j_xattr_key::SIZE..j_xattr_key::SIZE + name.len()].copy_from_slice(name);
    Ok(raw)
}

/// 构造内联 xattr 记录值
pub fn build_inline_xattr_val(value: &[u8]) -> Result<Vec<u8>> {
    if value.len() > APFS_XATTR_MAX_EMBEDDED_SIZE {
        return Err(Error::new(ErrorKind::InvalidInput, "value too large to embed"));
    }
    let mut raw = try_alloc_zeroed(j_xattr_val::SIZE + value.len())?;
    j_xattr_val {
        flags: XattrFlags::DATA_EMBEDDED.bits(),
        xdata_len: value.len() as u16,
    }
    .write_to(&mut raw);
    raw[j_xattr_val::SIZE..].copy_from_slice(value);
    Ok(raw)
}

/// 构造数据流型 xattr 记录值
///
/// 只有加密卷才填写 `default_crypto_id`，取值为流自身的 id。
pub fn build_dstream_xattr_val(ds: &DstreamInfo, sb: &Superblock) -> Result<Vec<u8>> {
    let mut raw = try_alloc_zeroed(j_xattr_val::SIZE + j_xattr_dstream::SIZE)?;
    j_xattr_val {
        flags: XattrFlags::DATA_STREAM.bits(),
        xdata_len: j_xattr_dstream::SIZE as u16,
    }
    .write_to(&mut raw);

    j_xattr_dstream {
        xattr_obj_id: ds.id,
        dstream: j_dstream {
            size: ds.size,
            alloced_size: ds.alloced_size(sb.block_size()),
            default_crypto_id: if sb.is_encrypted() { ds.id } else { 0 },
            total_bytes_written: 0,
            total_bytes_read: 0,
        },
    }
    .write_to(&mut raw[j_xattr_val::SIZE..]);
    Ok(raw)
}

/// 在已构造的记录值上置 `FILE_SYSTEM_OWNED` 标志
pub fn mark_fs_owned(raw_val: &mut [u8]) {
    let flags = LittleEndian::read_u16(&raw_val[0..2]) | XattrFlags::FILE_SYSTEM_OWNED.bits();
    LittleEndian::write_u16(&mut raw_val[0..2], flags);
}
