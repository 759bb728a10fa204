//! 卷配置与统计类型

use crate::cache::{CacheStats, DEFAULT_CACHE_SIZE};
use crate::consts::APFS_MIN_USER_INO_NUM;

/// 卷配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeConfig {
    /// 块缓存大小（块数），0 表示不使用缓存
    pub cache_blocks: usize,
    /// 卷是否加密
    pub encrypted: bool,
    /// 第一个可分配的对象 id
    pub first_obj_id: u64,
    /// 设备开头保留、永不分配的块数
    pub reserved_blocks: u64,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            cache_blocks: DEFAULT_CACHE_SIZE,
            encrypted: false,
            first_obj_id: APFS_MIN_USER_INO_NUM,
            reserved_blocks: 1,
        }
    }
}

/// 卷统计信息
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeStats {
    /// 块大小（字节）
    pub block_size: u32,
    /// 总块数
    pub total_blocks: u64,
    /// 已用块数
    pub used_blocks: u64,
    /// 空闲块数
    pub free_blocks: u64,
    /// 下一个对象 id
    pub next_obj_id: u64,
    /// 目录记录数
    pub catalog_records: usize,
    /// 物理读取次数
    pub physical_reads: u64,
    /// 物理写入次数
    pub physical_writes: u64,
    /// 块缓存统计（无缓存时为 None）
    pub cache: Option<CacheStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_config_default() {
        let config = VolumeConfig::default();
        assert_eq!(config.cache_blocks, 256);
        assert!(!config.encrypted);
        assert_eq!(config.first_obj_id, 16);
        assert_eq!(config.reserved_blocks, 1);
    }
}
