//! xattr 值读取
//!
//! 内联值直接从记录拷贝；数据流值先为所有块提交读请求，再按顺序等待并拷贝，
//! 让设备可以并行完成这些读取。

use super::record::XattrRecord;
use crate::{
    block::BlockDevice,
    consts::XATTR_MAX_STREAM_SIZE,
    dstream::DstreamInfo,
    error::{Error, ErrorKind, Result},
    fs::VolumeState,
};
use alloc::vec::Vec;

/// 读取内联值
///
/// # 参数
///
/// * `buf` - None 时只返回值长度
/// * `only_whole` - 为 true 时缓冲区放不下整个值则返回 `Range`，否则截断拷贝
///
/// # 返回
///
/// 值长度或实际拷贝的字节数
pub fn inline_read(xattr: &XattrRecord<'_>, buf: Option<&mut [u8]>, only_whole: bool) -> Result<usize> {
    let len = xattr.xdata.len();
    let Some(buf) = buf else {
        return Ok(len);
    };

    if buf.len() < len && only_whole {
        return Err(Error::new(ErrorKind::Range, "buffer too small for xattr"));
    }
    let n = len.min(buf.len());
    buf[..n].copy_from_slice(&xattr.xdata[..n]);
    Ok(n)
}

/// 读取数据流值
///
/// 流中不允许有空洞：任何一个块映射为 0 都视为损坏。
/// 所有读请求都先提交，之后才开始等待，等待时发现块未能读入则返回 `Io`。
pub fn extents_read<D: BlockDevice>(
    state: &VolumeState<D>,
    dstream: &DstreamInfo,
    buf: Option<&mut [u8]>,
    only_whole: bool,
) -> Result<usize> {
    if dstream.size > XATTR_MAX_STREAM_SIZE {
        return Err(Error::new(ErrorKind::TooBig, "xattr stream too large"));
    }
    let size = dstream.size as usize;
    let Some(buf) = buf else {
        return Ok(size);
    };

    if buf.len() < size && only_whole {
        return Err(Error::new(ErrorKind::Range, "buffer too small for xattr"));
    }
    let length = size.min(buf.len());
    if length == 0 {
        return Ok(0);
    }

    let sb = &state.sb;
    let bs = sb.block_size() as usize;
    let blkcnt = (length + bs - 1) / bs;

    let mut bnos = Vec::new();
    bnos.try_reserve_exact(blkcnt)
        .map_err(|_| Error::new(ErrorKind::NoMemory, "out of memory"))?;
    for lblk in 0..blkcnt as u64 {
        let bno = dstream.logic_to_phys_bno(&state.catalog, sb, lblk)?;
        if bno == 0 {
            log::error!("[XATTR] stream {:#x} has a hole at block {}", dstream.id, lblk);
            return Err(Error::new(ErrorKind::Corrupted, "xattr stream is sparse"));
        }
        bnos.push(bno);
    }

    let mut bdev = state.bdev.lock();
    for &bno in &bnos {
        bdev.submit_read(bno)?;
    }

    for (i, &bno) in bnos.iter().enumerate() {
        let off = i * bs;
        let tocopy = bs.min(length - off);
        bdev.wait_read(bno, |data| {
            buf[off..off + tocopy].copy_from_slice(&data[..tocopy]);
        })
        .map_err(|e| {
            log::error!("[XATTR] failed to read block {:#x} of stream {:#x}", bno, dstream.id);
            e
        })?;
    }

    Ok(length)
}
