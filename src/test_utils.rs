//! 测试用内存设备与卷

use crate::{
    block::BlockDevice,
    error::{Error, ErrorKind, Result},
    fs::{VolumeConfig, VolumeState},
};
use alloc::collections::BTreeSet;
use alloc::vec::Vec;

/// 内存块设备，支持注入读写错误
pub struct MemDevice {
    block_size: u32,
    sector_size: u32,
    total_blocks: u64,
    storage: Vec<u8>,
    failing_reads: BTreeSet<u64>,
    fail_writes: bool,
}

impl MemDevice {
    pub fn new(total_blocks: u64) -> Self {
        Self {
            block_size: 4096,
            sector_size: 512,
            total_blocks,
            storage: alloc::vec![0u8; total_blocks as usize * 4096],
            failing_reads: BTreeSet::new(),
            fail_writes: false,
        }
    }

    pub fn set_sector_size(&mut self, sector_size: u32) {
        self.sector_size = sector_size;
    }

    pub fn set_block_size(&mut self, block_size: u32) {
        self.block_size = block_size;
        self.storage = alloc::vec![0u8; self.total_blocks as usize * block_size as usize];
    }

    pub fn block(&self, lba: u64) -> &[u8] {
        let bs = self.block_size as usize;
        &self.storage[lba as usize * bs..(lba as usize + 1) * bs]
    }

    pub fn block_mut(&mut self, lba: u64) -> &mut [u8] {
        let bs = self.block_size as usize;
        &mut self.storage[lba as usize * bs..(lba as usize + 1) * bs]
    }

    /// 之后任何覆盖该块的读取都返回 `Io`
    pub fn fail_read_of(&mut self, lba: u64) {
        self.failing_reads.insert(lba);
    }

    pub fn clear_read_faults(&mut self) {
        self.failing_reads.clear();
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    fn byte_range(&self, lba: u64, count: u32) -> (usize, usize) {
        let start = lba as usize * self.sector_size as usize;
        (start, start + count as usize * self.sector_size as usize)
    }
}

impl BlockDevice for MemDevice {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    fn read_blocks(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
        let (start, end) = self.byte_range(lba, count);
        if end > self.storage.len() {
            return Err(Error::new(ErrorKind::Io, "read beyond device"));
        }
        let bs = self.block_size as usize;
        if (start / bs..=(end - 1) / bs).any(|b| self.failing_reads.contains(&(b as u64))) {
            return Err(Error::new(ErrorKind::Io, "injected read failure"));
        }
        buf[..end - start].copy_from_slice(&self.storage[start..end]);
        Ok(end - start)
    }

    fn write_blocks(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize> {
        if self.fail_writes {
            return Err(Error::new(ErrorKind::Io, "injected write failure"));
        }
        let (start, end) = self.byte_range(lba, count);
        if end > self.storage.len() {
            return Err(Error::new(ErrorKind::Io, "write beyond device"));
        }
        self.storage[start..end].copy_from_slice(&buf[..end - start]);
        Ok(end - start)
    }
}

/// 默认配置的空卷状态
pub fn mem_state(total_blocks: u64) -> VolumeState<MemDevice> {
    mem_state_with(total_blocks, false)
}

/// 指定是否加密的空卷状态
pub fn mem_state_with(total_blocks: u64, encrypted: bool) -> VolumeState<MemDevice> {
    let config = VolumeConfig {
        encrypted,
        ..VolumeConfig::default()
    };
    VolumeState::new(MemDevice::new(total_blocks), config).unwrap()
}
