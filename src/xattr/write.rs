//! xattr 数据流写入

use crate::{
    block::{Block, BlockDevice},
    dstream::DstreamInfo,
    error::Result,
    transaction::TxContext,
};

/// 为一个 xattr 值创建新的数据流
///
/// 分配新的流 id，逐块分配物理块并写入值，最后一个块的剩余部分填零。
/// 每个写过的块都加入当前事务，流的 extent 在返回前全部写成目录记录。
///
/// # 返回
///
/// 新流的句柄，`size` 等于值长度
///
/// # 错误
///
/// 任何一步失败都直接返回；已分配的块和 extent 由调用者中止事务来回收。
pub fn create_xattr_dstream<D: BlockDevice>(
    ctx: &mut TxContext<'_, D>,
    value: &[u8],
) -> Result<DstreamInfo> {
    let id = ctx.alloc_obj_id()?;
    let mut dstream = DstreamInfo::new(id, 0);

    let bs = ctx.sb().block_size() as usize;
    for (lblk, chunk) in value.chunks(bs).enumerate() {
        let bno = dstream.get_new_bno(ctx, lblk as u64)?;

        let mut block = Block::get_noread(ctx.bdev(), bno)?;
        block.with_data_mut(|data| {
            data[..chunk.len()].copy_from_slice(chunk);
            data[chunk.len()..].fill(0);
        })?;
        block.release()?;
        ctx.join(bno);

        dstream.size += chunk.len() as u64;
    }

    dstream.flush_extent_cache(ctx)?;
    log::debug!(
        "[XATTR] created stream {:#x}: {} bytes",
        dstream.id,
        dstream.size
    );
    Ok(dstream)
}
