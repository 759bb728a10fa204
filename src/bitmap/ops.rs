//! 空闲块位图的按位操作
//!
//! 位 `i` 在第 `i / 8` 字节的第 `i % 8` 位，低位在前。置位表示块已占用。

use crate::error::{Error, ErrorKind, Result};

#[inline]
fn locate(bitmap: &[u8], index: u64) -> Result<(usize, u8)> {
    let byte_index = (index / 8) as usize;
    if byte_index >= bitmap.len() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "bit index past end of bitmap",
        ));
    }
    Ok((byte_index, 1 << (index % 8)))
}

/// 位 `index` 是否置位，越界按未置位处理
pub fn test_bit(bitmap: &[u8], index: u64) -> bool {
    match locate(bitmap, index) {
        Ok((byte, mask)) => bitmap[byte] & mask != 0,
        Err(_) => false,
    }
}

/// 置位 `index`，越界时返回 `InvalidInput`
pub fn set_bit(bitmap: &mut [u8], index: u64) -> Result<()> {
    let (byte, mask) = locate(bitmap, index)?;
    bitmap[byte] |= mask;
    Ok(())
}

/// 清除 `index`，越界时返回 `InvalidInput`
pub fn clear_bit(bitmap: &mut [u8], index: u64) -> Result<()> {
    let (byte, mask) = locate(bitmap, index)?;
    bitmap[byte] &= !mask;
    Ok(())
}

/// `[start, end)` 中第一个空闲位
///
/// 对齐到字节边界且整字节为 0xFF 时一次跳过 8 位。
pub fn find_first_zero(bitmap: &[u8], start: u64, end: u64) -> Option<u64> {
    let end = end.min(bitmap.len() as u64 * 8);
    let mut index = start;

    while index < end {
        let byte = bitmap[(index / 8) as usize];
        if index % 8 == 0 && byte == 0xFF {
            index += 8;
            continue;
        }
        if byte & (1 << (index % 8)) == 0 {
            return Some(index);
        }
        index += 1;
    }

    None
}

/// 统计 `[0, end)` 范围内被设置的位数
pub fn count_set(bitmap: &[u8], end: u64) -> u64 {
    let end = end.min(bitmap.len() as u64 * 8);
    let full_bytes = (end / 8) as usize;
    let mut count: u64 = bitmap[..full_bytes]
        .iter()
        .map(|b| b.count_ones() as u64)
        .sum();
    for index in (full_bytes as u64 * 8)..end {
        if test_bit(bitmap, index) {
            count += 1;
        }
    }
    count
}
