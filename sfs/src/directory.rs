//! # 根目录
//!
//! 唯一的命名空间：每个可能的索引节点对应一个槽位，
//! 除数组下标外没有任何顺序。枚举按下标顺序访问在用槽位。

use std::io::Cursor;
use std::sync::Arc;

use binrw::{BinRead, BinWrite};
use block_dev::BlockDevice;

use crate::block;
use crate::layout::{DirEntry, DiskDirEntry, FileName, Layout};
use crate::Result;

#[derive(Debug)]
pub struct RootDirectory {
    slots: Vec<Option<DirEntry>>,
}

impl RootDirectory {
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![None; count],
        }
    }

    pub fn load(layout: &Layout, block_device: &Arc<dyn BlockDevice>) -> Result<Self> {
        let bytes = block::read_region(block_device, &layout.root_dir);
        let mut cursor = Cursor::new(&bytes);
        let slots = (0..layout.inode_count())
            .map(|_| DiskDirEntry::read(&mut cursor)?.decode())
            .collect::<Result<_>>()?;

        Ok(Self { slots })
    }

    pub fn sync(&self, layout: &Layout, block_device: &Arc<dyn BlockDevice>) -> Result<()> {
        let mut cursor = Cursor::new(Vec::with_capacity(self.slots.len() * DiskDirEntry::SIZE));
        for slot in &self.slots {
            match slot {
                Some(entry) => DiskDirEntry::from(entry).write(&mut cursor)?,
                None => DiskDirEntry::FREE.write(&mut cursor)?,
            }
        }
        block::write_region(block_device, &layout.root_dir, cursor.get_ref());
        Ok(())
    }

    /// 按名字线性查找，返回槽位下标
    pub fn position(&self, name: &FileName) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|entry| entry.name == *name))
    }

    pub fn lookup(&self, name: &FileName) -> Option<&DirEntry> {
        self.position(name).and_then(|slot| self.slots[slot].as_ref())
    }

    pub fn first_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// 按下标顺序的第 `n` 个在用项
    pub fn nth_occupied(&self, n: usize) -> Option<&DirEntry> {
        self.iter().nth(n)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
        self.slots.iter().flatten()
    }

    pub fn insert(&mut self, slot: usize, entry: DirEntry) {
        debug_assert!(self.slots[slot].is_none());
        self.slots[slot] = Some(entry);
    }

    pub fn remove(&mut self, slot: usize) -> Option<DirEntry> {
        self.slots.get_mut(slot).and_then(Option::take)
    }
}
