//! # 磁盘数据结构层
//!
//! sfs 的磁盘布局：
//! 超级块 | 索引节点表 | 根目录 | 数据块区域 | 空闲块位图
//!
//! 所有记录均为小端序，由 `binrw` 编解码；
//! 磁盘上用 `-1` 表示空闲或空指针，进入内存后一律变为 `None`。

mod geometry;
pub use geometry::{Layout, VolumeParams};

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{DiskInode, Inode, InodeId, Permission};

mod dir_entry;
pub use dir_entry::{DirEntry, DiskDirEntry, FileName};

use crate::block::BlockId;
use crate::{Error, Result};

/// 磁盘上的空指针
const NIL: i32 = -1;

fn decode_ptr(raw: i32) -> Result<Option<BlockId>> {
    match raw {
        NIL => Ok(None),
        raw if raw >= 0 => Ok(Some(BlockId::new(raw as u32))),
        _ => Err(Error::Corrupted("negative block pointer")),
    }
}

fn encode_ptr(ptr: Option<BlockId>) -> i32 {
    ptr.map_or(NIL, |id| u32::from(id) as i32)
}
