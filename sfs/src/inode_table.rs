//! # 索引节点表
//!
//! 定长的索引节点数组，整体缓存在内存，结构变化后整表写回。

use std::io::Cursor;
use std::sync::Arc;

use binrw::{BinRead, BinWrite};
use block_dev::BlockDevice;

use crate::block;
use crate::layout::{DiskInode, Inode, InodeId, Layout};
use crate::{Error, Result};

#[derive(Debug)]
pub struct InodeTable {
    inodes: Vec<Option<Inode>>,
}

impl InodeTable {
    /// 全部空闲的表
    pub fn new(count: usize) -> Self {
        Self {
            inodes: vec![None; count],
        }
    }

    pub fn load(layout: &Layout, block_device: &Arc<dyn BlockDevice>) -> Result<Self> {
        let bytes = block::read_region(block_device, &layout.inode_table);
        let mut cursor = Cursor::new(&bytes);
        let inodes = (0..layout.inode_count())
            .map(|_| DiskInode::read(&mut cursor)?.decode())
            .collect::<Result<_>>()?;

        Ok(Self { inodes })
    }

    pub fn sync(&self, layout: &Layout, block_device: &Arc<dyn BlockDevice>) -> Result<()> {
        let mut cursor = Cursor::new(Vec::with_capacity(self.inodes.len() * DiskInode::SIZE));
        for inode in &self.inodes {
            match inode {
                Some(inode) => DiskInode::from(inode).write(&mut cursor)?,
                None => DiskInode::FREE.write(&mut cursor)?,
            }
        }
        block::write_region(block_device, &layout.inode_table, cursor.get_ref());
        Ok(())
    }

    /// 第一个空闲的索引节点
    pub fn first_free(&self) -> Option<InodeId> {
        self.inodes
            .iter()
            .position(Option::is_none)
            .map(|index| InodeId::from(index as u32))
    }

    /// 在用的索引节点
    pub fn get(&self, id: InodeId) -> Result<&Inode> {
        self.inodes
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(Error::Corrupted("dangling inode id"))
    }

    pub fn get_mut(&mut self, id: InodeId) -> Result<&mut Inode> {
        self.inodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(Error::Corrupted("dangling inode id"))
    }

    pub fn insert(&mut self, id: InodeId, inode: Inode) {
        debug_assert!(self.inodes[id.index()].is_none());
        self.inodes[id.index()] = Some(inode);
    }

    /// 标记为空闲，返回原来的索引节点
    pub fn release(&mut self, id: InodeId) -> Option<Inode> {
        self.inodes.get_mut(id.index()).and_then(Option::take)
    }

    /// 在用索引节点及其编号
    pub fn iter(&self) -> impl Iterator<Item = (InodeId, &Inode)> {
        self.inodes
            .iter()
            .enumerate()
            .filter_map(|(index, inode)| Some((InodeId::from(index as u32), inode.as_ref()?)))
    }
}
