//! APFS 数据结构定义
//!
//! 这个模块包含了直接对应磁盘格式的数据结构。
//!
//! ## 设计原则
//!
//! 1. **磁盘格式结构** - 保留 C 风格命名（便于对照 APFS 格式文档）
//! 2. **编解码** - 通过 `byteorder` 显式按小端读写，不做指针强转
//! 3. **长度检查** - 所有 `parse` 在字节不足时返回 `Corrupted`

#![allow(non_camel_case_types)] // 允许C风格命名

use crate::{
    consts::*,
    error::{Error, ErrorKind, Result},
};
use byteorder::{ByteOrder, LittleEndian};

#[inline]
fn check_len(raw: &[u8], need: usize) -> Result<()> {
    if raw.len() < need {
        return Err(Error::new(ErrorKind::Corrupted, "record too short"));
    }
    Ok(())
}

//=============================================================================
// 记录键头
//=============================================================================

/// 所有目录记录键的公共头
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct j_key {
    pub obj_id_and_type: u64, // 0: 对象 id（低 60 位）+ 类型（高 4 位）
}

impl j_key {
    /// 磁盘大小
    pub const SIZE: usize = 8;

    /// 由对象 id 与记录类型构造
    pub fn new(obj_id: u64, obj_type: u8) -> Self {
        Self {
            obj_id_and_type: (obj_id & OBJ_ID_MASK) | ((obj_type as u64) << OBJ_TYPE_SHIFT),
        }
    }

    /// 对象 id
    pub fn obj_id(&self) -> u64 {
        self.obj_id_and_type & OBJ_ID_MASK
    }

    /// 记录类型
    pub fn obj_type(&self) -> u8 {
        ((self.obj_id_and_type & OBJ_TYPE_MASK) >> OBJ_TYPE_SHIFT) as u8
    }

    pub fn parse(raw: &[u8]) -> Result<Self> {
        check_len(raw, Self::SIZE)?;
        Ok(Self {
            obj_id_and_type: LittleEndian::read_u64(&raw[0..8]),
        })
    }

    pub fn write_to(&self, out: &mut [u8]) {
        LittleEndian::write_u64(&mut out[0..8], self.obj_id_and_type);
    }
}

//=============================================================================
// 扩展属性记录
//=============================================================================

/// xattr 记录键（后跟 `name_len` 字节的名称，含 NUL）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct j_xattr_key {
    pub hdr: j_key,    // 0
    pub name_len: u16, // 8: 名称长度（含结尾 NUL）
}

impl j_xattr_key {
    /// 固定部分大小
    pub const SIZE: usize = 10;

    pub fn parse(raw: &[u8]) -> Result<Self> {
        check_len(raw, Self::SIZE)?;
        Ok(Self {
            hdr: j_key::parse(raw)?,
            name_len: LittleEndian::read_u16(&raw[8..10]),
        })
    }

    pub fn write_to(&self, out: &mut [u8]) {
        self.hdr.write_to(out);
        LittleEndian::write_u16(&mut out[8..10], self.name_len);
    }
}

/// xattr 记录值（后跟内联数据或 `j_xattr_dstream`）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct j_xattr_val {
    pub flags: u16,     // 0: XattrFlags
    pub xdata_len: u16, // 2: 内联数据长度
}

impl j_xattr_val {
    /// 固定部分大小
    pub const SIZE: usize = 4;

    pub fn parse(raw: &[u8]) -> Result<Self> {
        check_len(raw, Self::SIZE)?;
        Ok(Self {
            flags: LittleEndian::read_u16(&raw[0..2]),
            xdata_len: LittleEndian::read_u16(&raw[2..4]),
        })
    }

    pub fn write_to(&self, out: &mut [u8]) {
        LittleEndian::write_u16(&mut out[0..2], self.flags);
        LittleEndian::write_u16(&mut out[2..4], self.xdata_len);
    }
}

/// 数据流属性
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct j_dstream {
    pub size: u64,                // 0: 逻辑大小
    pub alloced_size: u64,        // 8: 已分配大小（块对齐）
    pub default_crypto_id: u64,   // 16: 加密卷上的默认 crypto id
    pub total_bytes_written: u64, // 24
    pub total_bytes_read: u64,    // 32
}

impl j_dstream {
    pub const SIZE: usize = 40;

    pub fn parse(raw: &[u8]) -> Result<Self> {
        check_len(raw, Self::SIZE)?;
        Ok(Self {
            size: LittleEndian::read_u64(&raw[0..8]),
            alloced_size: LittleEndian::read_u64(&raw[8..16]),
            default_crypto_id: LittleEndian::read_u64(&raw[16..24]),
            total_bytes_written: LittleEndian::read_u64(&raw[24..32]),
            total_bytes_read: LittleEndian::read_u64(&raw[32..40]),
        })
    }

    pub fn write_to(&self, out: &mut [u8]) {
        LittleEndian::write_u64(&mut out[0..8], self.size);
        LittleEndian::write_u64(&mut out[8..16], self.alloced_size);
        LittleEndian::write_u64(&mut out[16..24], self.default_crypto_id);
        LittleEndian::write_u64(&mut out[24..32], self.total_bytes_written);
        LittleEndian::write_u64(&mut out[32..40], self.total_bytes_read);
    }
}

/// 数据流型 xattr 的值负载
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct j_xattr_dstream {
    pub xattr_obj_id: u64, // 0: 数据流对象 id
    pub dstream: j_dstream, // 8
}

impl j_xattr_dstream {
    pub const SIZE: usize = 48;

    pub fn parse(raw: &[u8]) -> Result<Self> {
        check_len(raw, Self::SIZE)?;
        Ok(Self {
            xattr_obj_id: LittleEndian::read_u64(&raw[0..8]),
            dstream: j_dstream::parse(&raw[8..])?,
        })
    }

    pub fn write_to(&self, out: &mut [u8]) {
        LittleEndian::write_u64(&mut out[0..8], self.xattr_obj_id);
        self.dstream.write_to(&mut out[8..48]);
    }
}

//=============================================================================
// 文件 extent 记录
//=============================================================================

/// 文件 extent 记录键
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct j_file_extent_key {
    pub hdr: j_key,        // 0
    pub logical_addr: u64, // 8: 逻辑字节偏移
}

impl j_file_extent_key {
    pub const SIZE: usize = 16;

    pub fn parse(raw: &[u8]) -> Result<Self> {
        check_len(raw, Self::SIZE)?;
        Ok(Self {
            hdr: j_key::parse(raw)?,
            logical_addr: LittleEndian::read_u64(&raw[8..16]),
        })
    }

    pub fn write_to(&self, out: &mut [u8]) {
        self.hdr.write_to(out);
        LittleEndian::write_u64(&mut out[8..16], self.logical_addr);
    }
}

/// 文件 extent 记录值
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct j_file_extent_val {
    pub len_and_flags: u64,  // 0: 长度（低 56 位）+ 标志
    pub phys_block_num: u64, // 8: 起始物理块号，0 表示空洞
    pub crypto_id: u64,      // 16
}

impl j_file_extent_val {
    pub const SIZE: usize = 24;

    pub fn new(len: u64, phys_block_num: u64, crypto_id: u64) -> Self {
        Self {
            len_and_flags: len & J_FILE_EXTENT_LEN_MASK,
            phys_block_num,
            crypto_id,
        }
    }

    /// extent 字节长度
    pub fn len(&self) -> u64 {
        self.len_and_flags & J_FILE_EXTENT_LEN_MASK
    }

    /// extent 标志
    pub fn flags(&self) -> u8 {
        (self.len_and_flags >> J_FILE_EXTENT_FLAG_SHIFT) as u8
    }

    pub fn parse(raw: &[u8]) -> Result<Self> {
        check_len(raw, Self::SIZE)?;
        Ok(Self {
            len_and_flags: LittleEndian::read_u64(&raw[0..8]),
            phys_block_num: LittleEndian::read_u64(&raw[8..16]),
            crypto_id: LittleEndian::read_u64(&raw[16..24]),
        })
    }

    pub fn write_to(&self, out: &mut [u8]) {
        LittleEndian::write_u64(&mut out[0..8], self.len_and_flags);
        LittleEndian::write_u64(&mut out[8..16], self.phys_block_num);
        LittleEndian::write_u64(&mut out[16..24], self.crypto_id);
    }
}
