//! 目录（catalog）索引
//!
//! 卷内所有对象记录的有序索引。这里是内存中的参考实现：
//! `BTreeMap` 以 [`CatalogKey`] 排序，值为磁盘格式的原始键和值字节。
//! 节点分裂、持久化等 B 树细节不在本 crate 的范围内。
//!
//! 目录可以整体克隆，事务以此做回滚检查点。

mod key;
mod query;

pub use key::CatalogKey;
pub use query::{Query, QueryFlags, RawRecord};

use crate::{
    error::{Error, ErrorKind, Result},
    utils::try_to_vec,
};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::ops::Bound;

/// 目录索引
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    records: BTreeMap<CatalogKey, (Vec<u8>, Vec<u8>)>,
}

impl Catalog {
    /// 创建空目录
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录总数
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 目录是否为空
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 某对象某类记录的条数
    pub fn count_of(&self, obj_id: u64, obj_type: u8) -> usize {
        let lower = CatalogKey {
            obj_id,
            obj_type,
            number: 0,
            name: Vec::new(),
        };
        self.records
            .range(&lower..)
            .take_while(|(k, _)| k.same_owner(&lower))
            .count()
    }

    /// 执行查询
    ///
    /// # 返回
    ///
    /// 命中返回 `true`，记录拷贝到查询的节点缓冲区；未命中返回 `false`。
    /// 游标模式下走完后置 `DONE`，之后的调用都返回 `false`。
    pub fn query(&self, q: &mut Query) -> Result<bool> {
        if q.flags.contains(QueryFlags::DONE) {
            return Ok(false);
        }

        let hit = if q.flags.contains(QueryFlags::MULTIPLE) {
            let lower = match &q.found {
                Some(prev) => Bound::Excluded(prev.clone()),
                None => Bound::Included(q.key.first_of()),
            };
            self.records
                .range((lower, Bound::Unbounded))
                .next()
                .filter(|(k, _)| k.same_owner(&q.key))
        } else if q.flags.contains(QueryFlags::ANY_NAME) {
            self.records
                .range(q.key.first_of()..)
                .next()
                .filter(|(k, _)| k.same_owner(&q.key))
        } else if q.flags.contains(QueryFlags::EXACT) {
            self.records.get_key_value(&q.key)
        } else {
            self.records
                .range(..=&q.key)
                .next_back()
                .filter(|(k, _)| k.same_owner(&q.key))
        };

        match hit {
            Some((k, (raw_key, raw_val))) => {
                q.key_buf = try_to_vec(raw_key)?;
                q.val_buf = try_to_vec(raw_val)?;
                q.found = Some(k.clone());
                log::trace!("[CATALOG] query hit {:?}", k);
                Ok(true)
            }
            None => {
                if q.flags.contains(QueryFlags::MULTIPLE) {
                    q.flags.insert(QueryFlags::DONE);
                }
                q.found = None;
                q.key_buf.clear();
                q.val_buf.clear();
                Ok(false)
            }
        }
    }

    /// 在查询定位的位置插入新记录
    ///
    /// 键已存在时返回 `AlreadyExists`
    pub fn insert(&mut self, q: Query, raw_key: &[u8], raw_val: &[u8]) -> Result<()> {
        drop(q);
        let key = CatalogKey::from_raw(raw_key)?;
        if self.records.contains_key(&key) {
            return Err(Error::new(ErrorKind::AlreadyExists, "catalog record exists"));
        }
        log::debug!("[CATALOG] insert {:?}", key);
        let entry = (try_to_vec(raw_key)?, try_to_vec(raw_val)?);
        self.records.insert(key, entry);
        Ok(())
    }

    /// 用新记录替换查询命中的记录
    pub fn replace(&mut self, q: Query, raw_key: &[u8], raw_val: &[u8]) -> Result<()> {
        let old = q
            .found
            .ok_or(Error::new(ErrorKind::InvalidState, "replace without a located record"))?;
        let key = CatalogKey::from_raw(raw_key)?;
        if key != old {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "replacement record has a different key",
            ));
        }
        if !self.records.contains_key(&old) {
            return Err(Error::new(ErrorKind::NotFound, "located record vanished"));
        }
        log::debug!("[CATALOG] replace {:?}", key);
        let entry = (try_to_vec(raw_key)?, try_to_vec(raw_val)?);
        self.records.insert(key, entry);
        Ok(())
    }

    /// 删除查询命中的记录
    pub fn remove(&mut self, q: Query) -> Result<()> {
        let old = q
            .found
            .ok_or(Error::new(ErrorKind::InvalidState, "remove without a located record"))?;
        match self.records.remove(&old) {
            Some(_) => {
                log::debug!("[CATALOG] remove {:?}", old);
                Ok(())
            }
            None => Err(Error::new(ErrorKind::NotFound, "located record vanished")),
        }
    }
}
