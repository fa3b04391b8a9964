//! # 打开文件表
//!
//! 进程内、易失的描述符表，从不落盘；重新挂载后全部清空。

use derive_more::{Display, From, Into};

use crate::error::Resource;
use crate::layout::InodeId;
use crate::{Error, Result};

/// 文件描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
#[repr(transparent)]
pub struct Fd(usize);

/// 打开的文件：索引节点与读写指针
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFile {
    pub inode_id: InodeId,
    /// 文件内的字节偏移
    pub cursor: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// 从未打开过
    Unused,
    Open(OpenFile),
    /// 打开后已关闭，可再分配
    Closed,
}

#[derive(Debug)]
pub struct OpenFileTable {
    slots: Vec<Slot>,
}

impl OpenFileTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::Unused; capacity],
        }
    }

    /// 下一个可分配的描述符
    pub fn first_free(&self) -> Option<Fd> {
        self.slots
            .iter()
            .position(|slot| !matches!(slot, Slot::Open(_)))
            .map(Fd)
    }

    /// 为索引节点分配描述符，读写指针置零
    pub fn open(&mut self, inode_id: InodeId) -> Result<Fd> {
        let fd = self
            .first_free()
            .ok_or(Error::ResourceExhausted(Resource::Descriptor))?;
        self.slots[fd.0] = Slot::Open(OpenFile {
            inode_id,
            cursor: 0,
        });
        Ok(fd)
    }

    pub fn get(&self, fd: Fd) -> Result<&OpenFile> {
        match self.slots.get(fd.0) {
            Some(Slot::Open(file)) => Ok(file),
            _ => Err(Error::NotOpen),
        }
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut OpenFile> {
        match self.slots.get_mut(fd.0) {
            Some(Slot::Open(file)) => Ok(file),
            _ => Err(Error::NotOpen),
        }
    }

    pub fn close(&mut self, fd: Fd) -> Result<()> {
        match self.slots.get_mut(fd.0) {
            Some(slot @ Slot::Open(_)) => {
                *slot = Slot::Closed;
                Ok(())
            }
            Some(Slot::Closed) => Err(Error::AlreadyClosed),
            Some(Slot::Unused) | None => Err(Error::NotOpen),
        }
    }

    /// 关闭指向该索引节点的全部描述符，返回关闭的个数
    pub fn close_inode(&mut self, inode_id: InodeId) -> usize {
        let mut closed = 0;
        for slot in &mut self.slots {
            if matches!(slot, Slot::Open(file) if file.inode_id == inode_id) {
                *slot = Slot::Closed;
                closed += 1;
            }
        }
        closed
    }
}
