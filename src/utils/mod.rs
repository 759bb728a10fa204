//! 杂项工具

use crate::error::{Error, ErrorKind, Result};
use alloc::vec::Vec;

/// 分配 `len` 字节的全零缓冲区
///
/// 分配失败时返回 `NoMemory`，不触发全局 OOM 处理。
pub fn try_alloc_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::new(ErrorKind::NoMemory, "buffer allocation failed"))?;
    buf.resize(len, 0);
    Ok(buf)
}

/// 复制一份字节切片
///
/// 分配失败时返回 `NoMemory`
pub fn try_to_vec(src: &[u8]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(src.len())
        .map_err(|_| Error::new(ErrorKind::NoMemory, "buffer allocation failed"))?;
    buf.extend_from_slice(src);
    Ok(buf)
}
