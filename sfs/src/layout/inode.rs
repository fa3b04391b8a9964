//! 索引节点与块映射
//!
//! 每个索引节点含 [`DIRECT_COUNT`] 个直接索引和一个一级间接索引：
//! 间接块整块连续存储**块编号**，每个编号都指向一个**数据块**。
//! 不存在二级索引，文件大小上限见 [`Layout::max_file_size`]。
//!
//! 数据块总是按顺序追加：先填满直接索引，再填间接块，
//! 所以文件的第 `i` 个数据块恰好位于第 `i` 个索引槽位。

use std::sync::Arc;

use binrw::binrw;
use block_dev::BlockDevice;
use derive_more::{Display, From, Into};
use enumflags2::{bitflags, BitFlags};

use crate::block::{Block, BlockId};
use crate::error::Resource;
use crate::layout::{decode_ptr, encode_ptr, Bitmap, Layout, NIL};
use crate::{Error, Result, DIRECT_COUNT};

/// 索引节点编号，即其在索引节点表中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
#[repr(transparent)]
pub struct InodeId(u32);

impl InodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// 磁盘上的索引节点记录，恒为 72 字节
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInode {
    mode: u32,
    link_count: u32,
    uid: u32,
    gid: u32,
    /// `-1` 表示索引节点空闲
    size: i32,
    direct: [i32; DIRECT_COUNT],
    indirect: i32,
}

/// 权限位，仅记录，不做检查
#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    OtherExec = 0o001,
    OtherWrite = 0o002,
    OtherRead = 0o004,
    GroupExec = 0o010,
    GroupWrite = 0o020,
    GroupRead = 0o040,
    OwnerExec = 0o100,
    OwnerWrite = 0o200,
    OwnerRead = 0o400,
}

/// 内存中的在用索引节点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub mode: BitFlags<Permission>,
    pub link_count: u32,
    pub uid: u32,
    pub gid: u32,
    /// 文件有效字节数，唯一的权威
    pub size: u32,
    direct: [Option<BlockId>; DIRECT_COUNT],
    indirect: Option<BlockId>,
}

/// 内存中的间接块
struct IndirectBlock {
    id: BlockId,
    entries: Vec<Option<BlockId>>,
}

impl DiskInode {
    pub const SIZE: usize = 72;

    pub const FREE: Self = Self {
        mode: 0,
        link_count: 0,
        uid: 0,
        gid: 0,
        size: NIL,
        direct: [NIL; DIRECT_COUNT],
        indirect: NIL,
    };

    /// 空闲的索引节点解出 `None`
    pub fn decode(&self) -> Result<Option<Inode>> {
        if self.size == NIL {
            return Ok(None);
        }
        if self.size < 0 {
            return Err(Error::Corrupted("negative file size"));
        }

        let mut direct = [None; DIRECT_COUNT];
        for (ptr, &raw) in direct.iter_mut().zip(&self.direct) {
            *ptr = decode_ptr(raw)?;
        }

        Ok(Some(Inode {
            mode: BitFlags::from_bits_truncate(self.mode),
            link_count: self.link_count,
            uid: self.uid,
            gid: self.gid,
            size: self.size as u32,
            direct,
            indirect: decode_ptr(self.indirect)?,
        }))
    }
}

impl From<&Inode> for DiskInode {
    fn from(inode: &Inode) -> Self {
        Self {
            mode: inode.mode.bits(),
            link_count: inode.link_count,
            uid: inode.uid,
            gid: inode.gid,
            size: inode.size as i32,
            direct: inode.direct.map(encode_ptr),
            indirect: encode_ptr(inode.indirect),
        }
    }
}

impl Default for Inode {
    fn default() -> Self {
        Self::new()
    }
}

impl Inode {
    /// 新建的空文件
    pub fn new() -> Self {
        Self {
            mode: BitFlags::all(),
            link_count: 1,
            uid: 0,
            gid: 0,
            size: 0,
            direct: [None; DIRECT_COUNT],
            indirect: None,
        }
    }

    #[inline]
    pub fn indirect(&self) -> Option<BlockId> {
        self.indirect
    }

    /// 已链接的数据块个数
    #[inline]
    pub fn data_blocks(&self, block_size: usize) -> usize {
        (self.size as usize).div_ceil(block_size)
    }

    /// 文件内字节偏移所在的块。
    /// 偏移不小于文件大小时失败，读路径不会让文件增长。
    pub fn block_id(
        &self,
        offset: usize,
        layout: &Layout,
        block_device: &Arc<dyn BlockDevice>,
    ) -> Result<BlockId> {
        if offset >= self.size as usize {
            return Err(Error::OutOfRange);
        }
        self.nth_block(offset / layout.block_size(), layout, block_device)
    }

    /// 文件的第 `index` 个数据块（逻辑索引），返回其块编号
    pub fn nth_block(
        &self,
        index: usize,
        layout: &Layout,
        block_device: &Arc<dyn BlockDevice>,
    ) -> Result<BlockId> {
        let ptr = if index < DIRECT_COUNT {
            self.direct[index]
        } else {
            // 剔去直接索引的部分
            let index = index - DIRECT_COUNT;
            if index >= layout.indirect_count() {
                return Err(Error::OutOfRange);
            }
            match self.indirect {
                Some(id) => IndirectBlock::load(id, block_device)?.entries[index],
                None => None,
            }
        };

        ptr.ok_or(Error::OutOfRange)
    }

    /// 为文件追加一个数据块，返回其块编号。
    ///
    /// 直接索引用完后才使用间接块，首次使用时分配并初始化间接块。
    /// 失败时不会留下已分配但未链接的块。
    pub fn append_block(
        &mut self,
        layout: &Layout,
        bitmap: &mut Bitmap,
        block_device: &Arc<dyn BlockDevice>,
    ) -> Result<BlockId> {
        const NO_SPACE: Error = Error::ResourceExhausted(Resource::Block);

        // 直接索引
        if let Some(slot) = self.direct.iter().position(Option::is_none) {
            let id = bitmap.alloc(block_device).ok_or(NO_SPACE)?;
            self.direct[slot] = Some(id);
            return Ok(id);
        }

        // 一级索引
        match self.indirect {
            Some(indirect_id) => {
                let mut indirect = IndirectBlock::load(indirect_id, block_device)?;
                let slot = indirect
                    .first_empty()
                    .ok_or(Error::ResourceExhausted(Resource::IndirectSlot))?;
                let id = bitmap.alloc(block_device).ok_or(NO_SPACE)?;
                indirect.entries[slot] = Some(id);
                indirect.store(block_device);
                Ok(id)
            }
            None => {
                let id = bitmap.alloc(block_device).ok_or(NO_SPACE)?;
                let Some(indirect_id) = bitmap.alloc(block_device) else {
                    bitmap.dealloc(block_device, id);
                    return Err(NO_SPACE);
                };
                log::debug!("indirect block {indirect_id} created");

                let mut indirect = IndirectBlock::empty(indirect_id, layout.indirect_count());
                indirect.entries[0] = Some(id);
                indirect.store(block_device);
                self.indirect = Some(indirect_id);
                Ok(id)
            }
        }
    }

    /// 文件占用的全部块：数据块以及间接块本身
    pub fn linked_blocks(&self, block_device: &Arc<dyn BlockDevice>) -> Result<Vec<BlockId>> {
        let mut blocks: Vec<BlockId> = self.direct.iter().flatten().copied().collect();

        if let Some(indirect_id) = self.indirect {
            let indirect = IndirectBlock::load(indirect_id, block_device)?;
            blocks.extend(indirect.entries.iter().flatten());
            blocks.push(indirect_id);
        }

        Ok(blocks)
    }
}

impl IndirectBlock {
    fn empty(id: BlockId, count: usize) -> Self {
        Self {
            id,
            entries: vec![None; count],
        }
    }

    fn load(id: BlockId, block_device: &Arc<dyn BlockDevice>) -> Result<Self> {
        let block = Block::load(id, block_device);
        let entries = block
            .as_slice()
            .chunks_exact(4)
            .map(|raw| decode_ptr(i32::from_le_bytes(raw.try_into().unwrap())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { id, entries })
    }

    fn store(&self, block_device: &Arc<dyn BlockDevice>) {
        let mut block = Block::zeroed(self.id, block_device);
        for (i, &entry) in self.entries.iter().enumerate() {
            block.write_at(i * 4, &encode_ptr(entry).to_le_bytes());
        }
        block.sync();
    }

    #[inline]
    fn first_empty(&self) -> Option<usize> {
        self.entries.iter().position(Option::is_none)
    }
}
