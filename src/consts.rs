//! APFS 常量定义
//!
//! 这个模块包含了 xattr 子系统用到的磁盘格式常量，包括：
//! - 块大小范围
//! - 目录记录（catalog record）的键类型编码
//! - xattr 值标志与大小上限
//! - 文件 extent 记录的位域

//=============================================================================
// 基础常量
//=============================================================================

/// 默认物理扇区大小（512 字节）
pub const APFS_DEFAULT_SECTOR_SIZE: u32 = 512;

/// 默认块大小（4096 字节）
pub const APFS_DEFAULT_BLOCK_SIZE: u32 = 4096;

/// 最小块大小（4096 字节）
pub const APFS_MIN_BLOCK_SIZE: u32 = 4096;

/// 最大块大小（65536 字节）
pub const APFS_MAX_BLOCK_SIZE: u32 = 65536;

/// 第一个可分配给用户对象的 id
pub const APFS_MIN_USER_INO_NUM: u64 = 16;

//=============================================================================
// 目录记录键（j_key）
//=============================================================================

/// `obj_id_and_type` 中对象 id 的掩码
pub const OBJ_ID_MASK: u64 = 0x0fff_ffff_ffff_ffff;

/// `obj_id_and_type` 中记录类型的掩码
pub const OBJ_TYPE_MASK: u64 = 0xf000_0000_0000_0000;

/// 记录类型的位移
pub const OBJ_TYPE_SHIFT: u32 = 60;

/// 记录类型：扩展属性
pub const APFS_TYPE_XATTR: u8 = 4;

/// 记录类型：文件 extent
pub const APFS_TYPE_FILE_EXTENT: u8 = 8;

//=============================================================================
// 扩展属性
//=============================================================================

/// 内联存储的最大值长度，超过则使用数据流
pub const APFS_XATTR_MAX_EMBEDDED_SIZE: usize = 3804;

/// get 路径允许返回的最大属性长度
pub const XATTR_SIZE_MAX: usize = 65536;

/// 读路径可表示的最大数据流长度
///
/// 读取结果需要能以正的 `i32` 字节数返回给调用者，更大的流直接报 `TooBig`。
pub const XATTR_MAX_STREAM_SIZE: u64 = i32::MAX as u64;

/// 对外呈现的命名空间前缀（磁盘上的名称不带命名空间）
pub const XATTR_MAC_OSX_PREFIX: &str = "osx.";

/// 符号链接目标的系统属性名
pub const APFS_XATTR_NAME_SYMLINK: &str = "com.apple.fs.symlink";

/// 一次 xattr set 操作最多修改的目录记录数
pub const APFS_XATTR_SET_MAXOPS: u32 = 1;

//=============================================================================
// 文件 extent
//=============================================================================

/// `len_and_flags` 中长度的掩码
pub const J_FILE_EXTENT_LEN_MASK: u64 = 0x00ff_ffff_ffff_ffff;

/// `len_and_flags` 中标志的位移
pub const J_FILE_EXTENT_FLAG_SHIFT: u32 = 56;

//=============================================================================
// 卷标志
//=============================================================================

/// 卷未加密
pub const APFS_FS_UNENCRYPTED: u64 = 0x0000_0001;
