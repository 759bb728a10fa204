//! xattr 存储操作
//!
//! 这里的函数直接作用在 [`VolumeState`] 上：读操作借用 `&VolumeState`，
//! 修改操作借用 `&mut VolumeState` 并要求已有活跃事务。
//! `xattr_*` 系列在外层加上卷屏障和事务，供命名空间处理器调用。

use super::{
    read::{extents_read, inline_read},
    record::{
        build_dstream_xattr_val, build_inline_xattr_val, build_xattr_key, dstream_from_xattr,
        mark_fs_owned, validate_name, XattrRecord,
    },
    write::create_xattr_dstream,
    XattrSetFlags,
};
use crate::{
    block::BlockDevice,
    catalog::{CatalogKey, Query, QueryFlags},
    consts::*,
    dstream::DstreamInfo,
    error::{Error, ErrorKind, Result},
    fs::{Volume, VolumeState},
    transaction::{MaxOps, TxContext},
};

/// 解码查询命中的记录，损坏时记下所属 inode
fn decode_logged(q: &Query, ino: u64) -> Result<XattrRecord<'_>> {
    XattrRecord::from_query(q).map_err(|e| {
        log::error!("[XATTR] bad xattr record in inode {:#x}: {}", ino, e);
        e
    })
}

/// 读取属性值，可选择是否允许截断
///
/// # 参数
///
/// * `buf` - None 时只返回值长度
/// * `only_whole` - 为 false 时缓冲区不足则拷贝能放下的前缀
///
/// # 返回
///
/// 值长度或拷贝的字节数；属性不存在返回 `NotFound`
pub fn get_with_policy<D: BlockDevice>(
    state: &VolumeState<D>,
    ino: u64,
    name: &[u8],
    buf: Option<&mut [u8]>,
    only_whole: bool,
) -> Result<usize> {
    let mut q = Query::new(
        CatalogKey::xattr(ino, Some(name))?,
        QueryFlags::CAT | QueryFlags::EXACT,
    );
    if !state.catalog.query(&mut q)? {
        return Err(Error::new(ErrorKind::NotFound, "no such xattr"));
    }

    let xattr = decode_logged(&q, ino)?;
    if xattr.has_dstream {
        let dstream = dstream_from_xattr(&xattr)?;
        extents_read(state, &dstream, buf, only_whole)
    } else {
        inline_read(&xattr, buf, only_whole)
    }
}

/// 读取属性值
///
/// 缓冲区放不下整个值时返回 `Range`。不加锁，调用者需持有共享或独占屏障。
pub fn get<D: BlockDevice>(
    state: &VolumeState<D>,
    ino: u64,
    name: &[u8],
    buf: Option<&mut [u8]>,
) -> Result<usize> {
    get_with_policy(state, ino, name, buf, true)
}

/// 在共享屏障下读取属性值
///
/// 值长度超过 `XATTR_SIZE_MAX` 时返回 `TooBig`。
pub fn xattr_get<D: BlockDevice>(
    vol: &Volume<D>,
    ino: u64,
    name: &[u8],
    buf: Option<&mut [u8]>,
) -> Result<usize> {
    let len = {
        let state = vol.read();
        get(&*state, ino, name, buf)?
    };
    if len > XATTR_SIZE_MAX {
        return Err(Error::new(ErrorKind::TooBig, "xattr value too large"));
    }
    Ok(len)
}

/// 与目录记录脱钩、等待释放的数据流
///
/// 由 [`detach_xattr`] 返回；调用者必须在同一事务内调用 [`release`](Self::release)。
#[must_use]
#[derive(Debug)]
pub struct OrphanStream(DstreamInfo);

impl OrphanStream {
    /// 流对象 id
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// 截断到 0，释放流的全部块和 extent 记录
    pub fn release<D: BlockDevice>(mut self, ctx: &mut TxContext<'_, D>) -> Result<()> {
        self.0.truncate(ctx, 0)
    }
}

/// 删除查询命中的 xattr 记录
///
/// 只删除目录记录。值在数据流中时返回孤立的流，由调用者释放。
pub fn detach_xattr<D: BlockDevice>(
    ctx: &mut TxContext<'_, D>,
    q: Query,
) -> Result<Option<OrphanStream>> {
    let xattr = decode_logged(&q, q.key().obj_id)?;
    let orphan = if xattr.has_dstream {
        Some(OrphanStream(dstream_from_xattr(&xattr)?))
    } else {
        None
    };
    ctx.catalog_mut().remove(q)?;
    Ok(orphan)
}

fn delete_xattr<D: BlockDevice>(ctx: &mut TxContext<'_, D>, q: Query) -> Result<()> {
    if let Some(orphan) = detach_xattr(ctx, q)? {
        orphan.release(ctx)?;
    }
    Ok(())
}

/// 设置或删除一个属性
///
/// `value` 为 None 表示删除。`CREATE` 要求属性不存在，`REPLACE` 要求属性已存在；
/// 删除一个不存在的属性总是返回 `NotFound`。
///
/// 必须在活跃事务中调用。出错时卷状态可能已被部分修改（例如新流已分配），
/// 调用者应当中止事务。
pub fn set<D: BlockDevice>(
    state: &mut VolumeState<D>,
    ino: u64,
    name: &[u8],
    value: Option<&[u8]>,
    flags: XattrSetFlags,
) -> Result<()> {
    validate_name(name)?;
    let mut ctx = state.tx_context()?;

    let Some(value) = value else {
        return remove_locked(&mut ctx, ino, name, flags);
    };

    // 大值先写成数据流
    let dstream = if value.len() > APFS_XATTR_MAX_EMBEDDED_SIZE {
        Some(create_xattr_dstream(&mut ctx, value)?)
    } else {
        None
    };

    let mut q = Query::new(
        CatalogKey::xattr(ino, Some(name))?,
        QueryFlags::CAT | QueryFlags::EXACT,
    );
    let found = ctx.catalog().query(&mut q)?;
    if !found && flags.contains(XattrSetFlags::REPLACE) {
        return Err(Error::new(ErrorKind::NotFound, "no such xattr"));
    }
    if found && flags.contains(XattrSetFlags::CREATE) {
        return Err(Error::new(ErrorKind::AlreadyExists, "xattr exists"));
    }

    let old_dstream = if found {
        let xattr = decode_logged(&q, ino)?;
        if xattr.has_dstream {
            Some(dstream_from_xattr(&xattr)?)
        } else {
            None
        }
    } else {
        None
    };

    let raw_key = build_xattr_key(ino, name)?;
    let mut raw_val = match &dstream {
        Some(ds) => build_dstream_xattr_val(ds, ctx.sb())?,
        None => build_inline_xattr_val(value)?,
    };
    if name == APFS_XATTR_NAME_SYMLINK.as_bytes() {
        mark_fs_owned(&mut raw_val);
    }

    if found {
        ctx.catalog_mut().replace(q, &raw_key, &raw_val)?;
    } else {
        ctx.catalog_mut().insert(q, &raw_key, &raw_val)?;
    }

    if let Some(mut old) = old_dstream {
        old.truncate(&mut ctx, 0)?;
    }

    log::debug!(
        "[XATTR] set \"{}\" on inode {:#x}: {} bytes{}",
        name.escape_ascii(),
        ino,
        value.len(),
        if dstream.is_some() { " (stream)" } else { "" }
    );
    Ok(())
}

fn remove_locked<D: BlockDevice>(
    ctx: &mut TxContext<'_, D>,
    ino: u64,
    raw_name: &[u8],
    flags: XattrSetFlags,
) -> Result<()> {
    let mut q = Query::new(
        CatalogKey::xattr(ino, Some(raw_name))?,
        QueryFlags::CAT | QueryFlags::EXACT,
    );
    if !ctx.catalog().query(&mut q)? {
        return Err(Error::new(ErrorKind::NotFound, "no such xattr"));
    }
    if flags.contains(XattrSetFlags::CREATE) {
        return Err(Error::new(ErrorKind::AlreadyExists, "xattr exists"));
    }
    delete_xattr(ctx, q)?;
    log::debug!("[XATTR] removed an xattr from inode {:#x}", ino);
    Ok(())
}

/// 在独占屏障和事务中设置或删除一个属性
///
/// 成功则提交事务，任何错误（包括提交失败）都会中止事务，卷回到调用前的状态。
pub fn xattr_set<D: BlockDevice>(
    vol: &Volume<D>,
    ino: u64,
    name: &[u8],
    value: Option<&[u8]>,
    flags: XattrSetFlags,
) -> Result<()> {
    let mut state = vol.lock_exclusive();
    state.transaction_start(MaxOps {
        cat: APFS_XATTR_SET_MAXOPS,
        blks: 0,
    })?;

    let result = set(&mut *state, ino, name, value, flags).and_then(|()| state.transaction_commit());
    if let Err(e) = result {
        log::debug!("[XATTR] set on inode {:#x} failed: {}", ino, e);
        state.transaction_abort();
        return Err(e);
    }
    Ok(())
}

/// 在独占屏障和事务中删除一个属性
pub fn xattr_remove<D: BlockDevice>(vol: &Volume<D>, ino: u64, name: &[u8]) -> Result<()> {
    xattr_set(vol, ino, name, None, XattrSetFlags::REPLACE)
}

/// 单步删除的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStep {
    /// 删除了一个属性，可能还有更多
    Deleted,
    /// 已经没有属性了
    Empty,
}

/// 删除 inode 的任意一个属性
pub fn delete_any_xattr<D: BlockDevice>(ctx: &mut TxContext<'_, D>, ino: u64) -> Result<DeleteStep> {
    let mut q = Query::new(
        CatalogKey::xattr(ino, None)?,
        QueryFlags::CAT | QueryFlags::ANY_NAME | QueryFlags::EXACT,
    );
    if !ctx.catalog().query(&mut q)? {
        return Ok(DeleteStep::Empty);
    }
    delete_xattr(ctx, q)?;
    Ok(DeleteStep::Deleted)
}

/// 反复执行单步操作直到返回 `Empty`
///
/// # 返回
///
/// 返回 `Deleted` 的次数
pub fn repeat_until_empty<F>(mut step: F) -> Result<usize>
where
    F: FnMut() -> Result<DeleteStep>,
{
    let mut count = 0;
    loop {
        match step()? {
            DeleteStep::Deleted => count += 1,
            DeleteStep::Empty => return Ok(count),
        }
    }
}

/// 删除 inode 的全部属性
///
/// 必须在活跃事务中调用；`&mut VolumeState` 只能经由独占屏障取得，
/// 整个循环期间不会有其他读写者。没有属性时直接成功。
pub fn delete_all<D: BlockDevice>(state: &mut VolumeState<D>, ino: u64) -> Result<()> {
    let mut ctx = state.tx_context()?;
    let count = repeat_until_empty(|| delete_any_xattr(&mut ctx, ino))?;
    log::debug!("[XATTR] deleted {} xattrs of inode {:#x}", count, ino);
    Ok(())
}

/// 列出 inode 的全部属性名
///
/// 每个名称写作 `"osx." + 名称 + NUL`，依次紧挨着排列。
///
/// # 返回
///
/// 写入（或 `buf` 为 None 时需要）的总字节数。缓冲区放不下下一个名称时返回 `Range`，
/// 不写入不完整的名称。
pub fn list<D: BlockDevice>(state: &VolumeState<D>, ino: u64, mut buf: Option<&mut [u8]>) -> Result<usize> {
    let prefix = XATTR_MAC_OSX_PREFIX.as_bytes();
    let mut q = Query::new(
        CatalogKey::xattr(ino, None)?,
        QueryFlags::CAT | QueryFlags::EXACT | QueryFlags::ANY_NAME | QueryFlags::MULTIPLE,
    );

    let mut total = 0;
    while state.catalog.query(&mut q)? {
        let xattr = decode_logged(&q, ino)?;
        let entry_len = prefix.len() + xattr.name.len() + 1;

        if let Some(buf) = buf.as_deref_mut() {
            if entry_len > buf.len() - total {
                return Err(Error::new(ErrorKind::Range, "buffer too small for xattr list"));
            }
            let out = &mut buf[total..total + entry_len];
            out[..prefix.len()].copy_from_slice(prefix);
            out[prefix.len()..entry_len - 1].copy_from_slice(xattr.name);
            out[entry_len - 1] = 0;
        }
        total += entry_len;
    }
    Ok(total)
}

/// 在共享屏障下列出全部属性名
pub fn xattr_list<D: BlockDevice>(vol: &Volume<D>, ino: u64, buf: Option<&mut [u8]>) -> Result<usize> {
    let state = vol.read();
    list(&*state, ino, buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dstream::read_extent;
    use crate::fs::VolumeConfig;
    use crate::test_utils::MemDevice;
    use crate::types::{j_file_extent_key, j_file_extent_val, j_key, j_xattr_val};
    use crate::xattr::XattrFlags;
    use alloc::vec::Vec;

    const INO: u64 = 0x20;

    fn volume(blocks: u64) -> Volume<MemDevice> {
        Volume::create(MemDevice::new(blocks), VolumeConfig::default()).unwrap()
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect()
    }

    fn read_all(vol: &Volume<MemDevice>, ino: u64, name: &[u8]) -> Vec<u8> {
        let len = xattr_get(vol, ino, name, None).unwrap();
        let mut buf = alloc::vec![0u8; len];
        assert_eq!(xattr_get(vol, ino, name, Some(&mut buf)).unwrap(), len);
        buf
    }

    fn used_blocks(vol: &Volume<MemDevice>) -> u64 {
        vol.stats().used_blocks
    }

    #[test]
    fn test_inline_round_trip() {
        let vol = volume(32);
        let baseline = used_blocks(&vol);

        for (i, len) in [0usize, 1, 100, APFS_XATTR_MAX_EMBEDDED_SIZE].into_iter().enumerate() {
            let name = ["empty", "one", "hundred", "max"][i].as_bytes();
            let value = pattern(len, i as u8);
            xattr_set(&vol, INO, name, Some(&value), XattrSetFlags::CREATE).unwrap();
            assert_eq!(read_all(&vol, INO, name), value);
        }

        // 内联值不占用块
        assert_eq!(used_blocks(&vol), baseline);
        assert_eq!(vol.stats().catalog_records, 4);
    }

    #[test]
    fn test_stream_round_trip() {
        let vol = volume(64);
        let baseline = used_blocks(&vol);

        let sizes = [
            APFS_XATTR_MAX_EMBEDDED_SIZE + 1,
            4095,
            4096,
            4097,
            3 * 4096 + 1,
        ];
        let mut expected_blocks = 0;
        for (i, &len) in sizes.iter().enumerate() {
            let name = ["s3805", "s4095", "s4096", "s4097", "s12289"][i].as_bytes();
            let value = pattern(len, 7 + i as u8);
            xattr_set(&vol, INO, name, Some(&value), XattrSetFlags::empty()).unwrap();
            expected_blocks += ((len + 4095) / 4096) as u64;
            assert_eq!(read_all(&vol, INO, name), value);
        }
        assert_eq!(used_blocks(&vol), baseline + expected_blocks);

        // 每个流一个 xattr 记录加一个 extent 记录
        assert_eq!(vol.stats().catalog_records, 2 * sizes.len());
    }

    #[test]
    fn test_create_conflict_keeps_prior_value() {
        let vol = volume(32);
        xattr_set(&vol, INO, b"a", Some(b"one"), XattrSetFlags::CREATE).unwrap();
        let err = xattr_set(&vol, INO, b"a", Some(b"two"), XattrSetFlags::CREATE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(read_all(&vol, INO, b"a"), b"one");

        // 大值先建流再发现冲突，事务回滚收回流
        let before = vol.stats();
        let big = pattern(10000, 3);
        let err = xattr_set(&vol, INO, b"a", Some(&big), XattrSetFlags::CREATE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let after = vol.stats();
        assert_eq!(after.used_blocks, before.used_blocks);
        assert_eq!(after.next_obj_id, before.next_obj_id);
        assert_eq!(after.catalog_records, before.catalog_records);
        assert_eq!(read_all(&vol, INO, b"a"), b"one");
    }

    #[test]
    fn test_replace_requires_existing() {
        let vol = volume(32);
        let err = xattr_set(&vol, INO, b"b", Some(b"x"), XattrSetFlags::REPLACE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(xattr_get(&vol, INO, b"b", None).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(vol.stats().catalog_records, 0);

        xattr_set(&vol, INO, b"b", Some(b"x"), XattrSetFlags::empty()).unwrap();
        xattr_set(&vol, INO, b"b", Some(b"yy"), XattrSetFlags::REPLACE).unwrap();
        assert_eq!(read_all(&vol, INO, b"b"), b"yy");
    }

    #[test]
    fn test_remove_inline_and_stream() {
        let vol = volume(32);
        let baseline = used_blocks(&vol);
        xattr_set(&vol, INO, b"small", Some(b"v"), XattrSetFlags::empty()).unwrap();
        xattr_set(&vol, INO, b"large", Some(&pattern(9000, 1)), XattrSetFlags::empty()).unwrap();
        assert_eq!(used_blocks(&vol), baseline + 3);

        xattr_remove(&vol, INO, b"small").unwrap();
        xattr_remove(&vol, INO, b"large").unwrap();
        assert_eq!(xattr_get(&vol, INO, b"small", None).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(xattr_get(&vol, INO, b"large", None).unwrap_err().kind(), ErrorKind::NotFound);

        // 流的块和 extent 记录都被释放
        assert_eq!(used_blocks(&vol), baseline);
        assert_eq!(vol.stats().catalog_records, 0);

        // 删除不存在的属性，不论标志
        let err = xattr_set(&vol, INO, b"small", None, XattrSetFlags::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_stream_replace_accounting() {
        let vol = volume(64);
        let baseline = used_blocks(&vol);

        xattr_set(&vol, INO, b"v", Some(&pattern(9000, 1)), XattrSetFlags::empty()).unwrap();
        assert_eq!(used_blocks(&vol), baseline + 3);

        let first_stream = {
            let state = vol.read();
            let mut q = Query::new(CatalogKey::xattr(INO, Some(b"v")).unwrap(), QueryFlags::CAT | QueryFlags::EXACT);
            assert!(state.catalog().query(&mut q).unwrap());
            dstream_from_xattr(&XattrRecord::from_query(&q).unwrap()).unwrap().id
        };

        let second = pattern(5000, 2);
        xattr_set(&vol, INO, b"v", Some(&second), XattrSetFlags::REPLACE).unwrap();
        assert_eq!(used_blocks(&vol), baseline + 2);
        assert_eq!(read_all(&vol, INO, b"v"), second);
        assert_eq!(
            vol.read().catalog().count_of(first_stream, APFS_TYPE_FILE_EXTENT),
            0
        );

        xattr_set(&vol, INO, b"v", Some(b"tiny"), XattrSetFlags::REPLACE).unwrap();
        assert_eq!(used_blocks(&vol), baseline);
        assert_eq!(read_all(&vol, INO, b"v"), b"tiny");
        assert_eq!(vol.stats().catalog_records, 1);

        // 内联换回流
        let third = pattern(4097, 3);
        xattr_set(&vol, INO, b"v", Some(&third), XattrSetFlags::REPLACE).unwrap();
        assert_eq!(used_blocks(&vol), baseline + 2);
        assert_eq!(read_all(&vol, INO, b"v"), third);
    }

    #[test]
    fn test_whole_only_and_partial_reads() {
        let vol = volume(32);
        xattr_set(&vol, INO, b"inline", Some(b"abcdefgh"), XattrSetFlags::empty()).unwrap();
        let stream = pattern(5000, 9);
        xattr_set(&vol, INO, b"stream", Some(&stream), XattrSetFlags::empty()).unwrap();

        let state = vol.read();

        let mut small = [0xEEu8; 4];
        let err = get(&*state, INO, b"inline", Some(&mut small)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        assert_eq!(small, [0xEE; 4]);
        assert_eq!(get_with_policy(&*state, INO, b"inline", Some(&mut small), false).unwrap(), 4);
        assert_eq!(&small, b"abcd");

        let mut part = alloc::vec![0xEEu8; 4500];
        let err = get(&*state, INO, b"stream", Some(&mut part)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        assert!(part.iter().all(|&b| b == 0xEE));
        assert_eq!(get_with_policy(&*state, INO, b"stream", Some(&mut part), false).unwrap(), 4500);
        assert_eq!(&part[..], &stream[..4500]);
    }

    #[test]
    fn test_corrupt_inline_length() {
        let vol = volume(32);
        {
            let mut state = vol.lock_exclusive();
            let raw_key = build_xattr_key(INO, b"bad").unwrap();
            let mut raw_val = build_inline_xattr_val(b"12345").unwrap();
            raw_val[2] = 9;
            let q = Query::new(CatalogKey::xattr(INO, Some(b"bad")).unwrap(), QueryFlags::CAT);
            state.catalog.insert(q, &raw_key, &raw_val).unwrap();
        }

        let err = xattr_get(&vol, INO, b"bad", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
        let err = xattr_list(&vol, INO, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);

        // 损坏的记录不能被替换
        let err = xattr_set(&vol, INO, b"bad", Some(b"ok"), XattrSetFlags::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);

        // 删除路径同样报告损坏，记录原样保留
        let err = xattr_remove(&vol, INO, b"bad").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
        let mut state = vol.lock_exclusive();
        state.transaction_start(MaxOps::default()).unwrap();
        let err = delete_all(&mut *state, INO).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
        state.transaction_abort();
        assert_eq!(state.catalog().count_of(INO, APFS_TYPE_XATTR), 1);
    }

    fn plant_extent(vol: &Volume<MemDevice>, stream: u64, logical: u64, len: u64, phys: u64) {
        let mut state = vol.lock_exclusive();
        let mut raw_key = [0u8; j_file_extent_key::SIZE];
        j_file_extent_key {
            hdr: j_key::new(stream, APFS_TYPE_FILE_EXTENT),
            logical_addr: logical,
        }
        .write_to(&mut raw_key);
        let mut raw_val = [0u8; j_file_extent_val::SIZE];
        j_file_extent_val::new(len, phys, 0).write_to(&mut raw_val);

        let mut q = Query::new(CatalogKey::file_extent(stream, logical), QueryFlags::CAT | QueryFlags::EXACT);
        if state.catalog.query(&mut q).unwrap() {
            state.catalog.replace(q, &raw_key, &raw_val).unwrap();
        } else {
            state.catalog.insert(q, &raw_key, &raw_val).unwrap();
        }
    }

    #[test]
    fn test_extent_beyond_last_block_number() {
        let vol = volume(32);
        xattr_set(&vol, INO, b"s", Some(&pattern(8192, 1)), XattrSetFlags::empty()).unwrap();
        plant_extent(&vol, 16, 0, 8192, u64::MAX);

        let mut buf = alloc::vec![0u8; 8192];
        let err = xattr_get(&vol, INO, b"s", Some(&mut buf)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
        // 只查询长度不解析 extent
        assert_eq!(xattr_get(&vol, INO, b"s", None).unwrap(), 8192);
    }

    #[test]
    fn test_extent_wrapping_logical_space() {
        let vol = volume(32);
        xattr_set(&vol, INO, b"s", Some(&pattern(8192, 1)), XattrSetFlags::empty()).unwrap();
        plant_extent(&vol, 16, u64::MAX - 4095, 8192, 5);
        let before = vol.stats();

        let err = xattr_remove(&vol, INO, b"s").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);

        {
            let mut state = vol.lock_exclusive();
            state.transaction_start(MaxOps::default()).unwrap();
            let err = delete_all(&mut *state, INO).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Corrupted);
            state.transaction_abort();
        }

        // 两次失败都已回滚，卷仍然可用
        let after = vol.stats();
        assert_eq!(after.catalog_records, before.catalog_records);
        assert_eq!(after.used_blocks, before.used_blocks);
        xattr_set(&vol, INO, b"other", Some(b"fine"), XattrSetFlags::CREATE).unwrap();
        assert_eq!(read_all(&vol, INO, b"other"), b"fine");
    }

    #[test]
    fn test_list_names() {
        let vol = volume(32);
        for name in ["gamma", "alpha", "beta"].map(str::as_bytes) {
            xattr_set(&vol, INO, name, Some(b"1"), XattrSetFlags::empty()).unwrap();
        }
        // 其他 inode 的属性不出现在列表中
        xattr_set(&vol, INO + 1, b"other", Some(b"1"), XattrSetFlags::empty()).unwrap();

        let expected = b"osx.alpha\0osx.beta\0osx.gamma\0";
        assert_eq!(xattr_list(&vol, INO, None).unwrap(), expected.len());

        let mut buf = [0u8; 29];
        assert_eq!(xattr_list(&vol, INO, Some(&mut buf)).unwrap(), 29);
        assert_eq!(&buf, expected);

        assert_eq!(xattr_list(&vol, INO + 2, None).unwrap(), 0);
    }

    #[test]
    fn test_list_range_writes_no_partial_name() {
        let vol = volume(32);
        for name in ["alpha", "beta", "gamma"].map(str::as_bytes) {
            xattr_set(&vol, INO, name, Some(b"1"), XattrSetFlags::empty()).unwrap();
        }

        let mut buf = [0xEEu8; 20];
        let err = xattr_list(&vol, INO, Some(&mut buf)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        assert_eq!(&buf[..19], b"osx.alpha\0osx.beta\0");
        assert_eq!(buf[19], 0xEE);
    }

    #[test]
    fn test_delete_all() {
        let vol = volume(64);
        let baseline = used_blocks(&vol);

        for i in 0..3u8 {
            let name = ["i0", "i1", "i2"][i as usize].as_bytes();
            xattr_set(&vol, INO, name, Some(&pattern(10, i)), XattrSetFlags::empty()).unwrap();
        }
        xattr_set(&vol, INO, b"s0", Some(&pattern(5000, 1)), XattrSetFlags::empty()).unwrap();
        xattr_set(&vol, INO, b"s1", Some(&pattern(9000, 2)), XattrSetFlags::empty()).unwrap();
        let keep = pattern(4500, 3);
        xattr_set(&vol, INO + 1, b"keep", Some(&keep), XattrSetFlags::empty()).unwrap();
        assert_eq!(used_blocks(&vol), baseline + 2 + 3 + 2);

        {
            let mut state = vol.lock_exclusive();
            state.transaction_start(MaxOps::default()).unwrap();
            delete_all(&mut *state, INO).unwrap();
            state.transaction_commit().unwrap();
        }

        assert_eq!(xattr_list(&vol, INO, None).unwrap(), 0);
        assert_eq!(used_blocks(&vol), baseline + 2);
        assert_eq!(read_all(&vol, INO + 1, b"keep"), keep);
        assert_eq!(vol.stats().catalog_records, 2);
    }

    #[test]
    fn test_delete_all_without_xattrs() {
        let vol = volume(16);
        let mut state = vol.lock_exclusive();
        state.transaction_start(MaxOps::default()).unwrap();
        delete_all(&mut *state, INO).unwrap();
        state.transaction_commit().unwrap();
        assert!(state.catalog().is_empty());
    }

    #[test]
    fn test_delete_all_requires_transaction() {
        let vol = volume(16);
        let mut state = vol.lock_exclusive();
        let err = delete_all(&mut *state, INO).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_repeat_until_empty_counts_steps() {
        let mut left = 3;
        let count = repeat_until_empty(|| {
            if left == 0 {
                return Ok(DeleteStep::Empty);
            }
            left -= 1;
            Ok(DeleteStep::Deleted)
        })
        .unwrap();
        assert_eq!(count, 3);

        let err = repeat_until_empty(|| Err(Error::new(ErrorKind::Io, "boom"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_detach_then_release() {
        let vol = volume(32);
        let baseline = used_blocks(&vol);
        xattr_set(&vol, INO, b"big", Some(&pattern(8192, 5)), XattrSetFlags::empty()).unwrap();

        let mut state = vol.lock_exclusive();
        state.transaction_start(MaxOps::default()).unwrap();
        let mut ctx = state.tx_context().unwrap();

        let mut q = Query::new(CatalogKey::xattr(INO, Some(b"big")).unwrap(), QueryFlags::CAT | QueryFlags::EXACT);
        assert!(ctx.catalog().query(&mut q).unwrap());
        let orphan = detach_xattr(&mut ctx, q).unwrap().unwrap();

        // 记录已删除，流还在
        assert_eq!(ctx.catalog().count_of(INO, APFS_TYPE_XATTR), 0);
        assert_eq!(ctx.catalog().count_of(orphan.id(), APFS_TYPE_FILE_EXTENT), 1);
        assert_eq!(ctx.spaceman.used_blocks(), baseline + 2);

        orphan.release(&mut ctx).unwrap();
        assert_eq!(ctx.spaceman.used_blocks(), baseline);
        assert!(ctx.catalog().is_empty());
        drop(ctx);
        state.transaction_commit().unwrap();
    }

    #[test]
    fn test_abort_restores_state() {
        let vol = volume(32);
        xattr_set(&vol, INO, b"keep", Some(b"old"), XattrSetFlags::empty()).unwrap();
        let before = vol.stats();

        let mut state = vol.lock_exclusive();
        state.transaction_start(MaxOps { cat: 1, blks: 0 }).unwrap();
        set(&mut *state, INO, b"new", Some(&pattern(9000, 4)), XattrSetFlags::empty()).unwrap();
        set(&mut *state, INO, b"keep", None, XattrSetFlags::REPLACE).unwrap();
        assert_eq!(state.spaceman().used_blocks(), before.used_blocks + 3);
        let stream_blocks: Vec<u64> = {
            let ext = read_extent(state.catalog(), before.next_obj_id, 0).unwrap().unwrap();
            (0..3).map(|i| ext.phys_block_num + i).collect()
        };

        state.transaction_abort();
        assert!(!state.in_transaction());
        assert_eq!(state.bdev().cache_stats().unwrap().dirty_blocks, 0);
        for &bno in &stream_blocks {
            assert!(state.bdev().device().block(bno).iter().all(|&b| b == 0));
        }
        drop(state);

        let after = vol.stats();
        assert_eq!(after.used_blocks, before.used_blocks);
        assert_eq!(after.next_obj_id, before.next_obj_id);
        assert_eq!(after.catalog_records, before.catalog_records);
        assert_eq!(read_all(&vol, INO, b"keep"), b"old");
        assert_eq!(xattr_get(&vol, INO, b"new", None).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_out_of_space_rolls_back() {
        // 块 0 保留，只剩 2 个空闲块
        let vol = volume(3);
        let err = xattr_set(&vol, INO, b"big", Some(&pattern(9000, 1)), XattrSetFlags::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSpace);
        let stats = vol.stats();
        assert_eq!(stats.used_blocks, 1);
        assert_eq!(stats.next_obj_id, 16);
        assert_eq!(stats.catalog_records, 0);
    }

    #[test]
    fn test_read_error_without_cache() {
        let config = VolumeConfig {
            cache_blocks: 0,
            ..VolumeConfig::default()
        };
        let vol = Volume::create(MemDevice::new(32), config).unwrap();
        let value = pattern(5000, 6);
        xattr_set(&vol, INO, b"s", Some(&value), XattrSetFlags::empty()).unwrap();
        assert_eq!(read_all(&vol, INO, b"s"), value);

        {
            let state = vol.read();
            let bno = read_extent(state.catalog(), 16, 0).unwrap().unwrap().phys_block_num;
            state.bdev().device_mut().fail_read_of(bno + 1);
        }

        let mut buf = alloc::vec![0u8; 5000];
        let err = xattr_get(&vol, INO, b"s", Some(&mut buf)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        // 只查询长度不读设备
        assert_eq!(xattr_get(&vol, INO, b"s", None).unwrap(), 5000);
    }

    #[test]
    fn test_read_error_after_eviction() {
        let config = VolumeConfig {
            cache_blocks: 4,
            ..VolumeConfig::default()
        };
        let vol = Volume::create(MemDevice::new(32), config).unwrap();
        xattr_set(&vol, INO, b"first", Some(&pattern(5000, 1)), XattrSetFlags::empty()).unwrap();
        // 第二个流挤出第一个流的缓存块
        let second = pattern(4 * 4096, 2);
        xattr_set(&vol, INO, b"second", Some(&second), XattrSetFlags::empty()).unwrap();

        {
            let state = vol.read();
            let bno = read_extent(state.catalog(), 16, 0).unwrap().unwrap().phys_block_num;
            let mut bdev = state.bdev();
            assert!(bdev.has_cache());
            bdev.device_mut().fail_read_of(bno);
        }

        let mut buf = alloc::vec![0u8; 5000];
        let err = xattr_get(&vol, INO, b"first", Some(&mut buf)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(read_all(&vol, INO, b"second"), second);

        // 故障消除后可以重新读取
        vol.read().bdev().device_mut().clear_read_faults();
        assert_eq!(read_all(&vol, INO, b"first"), pattern(5000, 1));
    }

    #[test]
    fn test_size_ceiling() {
        let vol = volume(64);
        let value = pattern(XATTR_SIZE_MAX + 1, 8);
        xattr_set(&vol, INO, b"huge", Some(&value), XattrSetFlags::empty()).unwrap();

        let err = xattr_get(&vol, INO, b"huge", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TooBig);
        // 存储层本身不设上限
        assert_eq!(get(&*vol.read(), INO, b"huge", None).unwrap(), XATTR_SIZE_MAX + 1);
    }

    #[test]
    fn test_symlink_is_fs_owned() {
        let vol = volume(16);
        xattr_set(&vol, INO, APFS_XATTR_NAME_SYMLINK.as_bytes(), Some(b"/target"), XattrSetFlags::CREATE).unwrap();
        xattr_set(&vol, INO, b"plain", Some(b"x"), XattrSetFlags::CREATE).unwrap();

        let state = vol.read();
        let flags_of = |name: &[u8]| {
            let mut q = Query::new(CatalogKey::xattr(INO, Some(name)).unwrap(), QueryFlags::CAT | QueryFlags::EXACT);
            assert!(state.catalog().query(&mut q).unwrap());
            let rec = q.record().unwrap();
            XattrFlags::from_bits_retain(j_xattr_val::parse(rec.val).unwrap().flags)
        };
        assert!(flags_of(APFS_XATTR_NAME_SYMLINK.as_bytes()).contains(XattrFlags::FILE_SYSTEM_OWNED));
        assert!(!flags_of(&b"plain"[..]).contains(XattrFlags::FILE_SYSTEM_OWNED));
        drop(state);
        assert_eq!(read_all(&vol, INO, APFS_XATTR_NAME_SYMLINK.as_bytes()), b"/target");
    }

    #[test]
    fn test_encrypted_stream_descriptor() {
        let config = VolumeConfig {
            encrypted: true,
            ..VolumeConfig::default()
        };
        let vol = Volume::create(MemDevice::new(32), config).unwrap();
        xattr_set(&vol, INO, b"sec", Some(&pattern(6000, 1)), XattrSetFlags::empty()).unwrap();

        let state = vol.read();
        let mut q = Query::new(CatalogKey::xattr(INO, Some(b"sec")).unwrap(), QueryFlags::CAT | QueryFlags::EXACT);
        assert!(state.catalog().query(&mut q).unwrap());
        let rec = XattrRecord::from_query(&q).unwrap();
        let desc = crate::types::j_xattr_dstream::parse(rec.xdata).unwrap();
        assert_eq!(desc.dstream.default_crypto_id, desc.xattr_obj_id);
        assert_eq!(desc.dstream.alloced_size, 8192);
        assert_eq!(read_extent(state.catalog(), desc.xattr_obj_id, 0).unwrap().unwrap().crypto_id, desc.xattr_obj_id);
    }

    #[test]
    fn test_invalid_names() {
        let vol = volume(16);
        let err = xattr_set(&vol, INO, b"", Some(b"x"), XattrSetFlags::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = xattr_set(&vol, INO, b"a\0b", Some(b"x"), XattrSetFlags::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(!vol.read().in_transaction());
    }

    #[test]
    fn test_set_requires_transaction() {
        let vol = volume(16);
        let mut state = vol.lock_exclusive();
        let err = set(&mut *state, INO, b"a", Some(b"x"), XattrSetFlags::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
