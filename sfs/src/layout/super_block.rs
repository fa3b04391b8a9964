use std::io::Cursor;
use std::sync::Arc;

use binrw::{binrw, BinRead, BinWrite};
use block_dev::BlockDevice;

use crate::block::{Block, BlockId};
use crate::layout::{Layout, VolumeParams};
use crate::{Error, Result, MAGIC};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 记录卷参数，重新挂载时据此推出其它区域
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    pub block_size: u32,
    /// 文件系统占据块数
    pub total_blocks: u32,
    pub inode_table_len: u32,
    pub inode_count: u32,
    /// 根目录的起始块
    pub root_dir_start: u32,
}

impl SuperBlock {
    pub const SIZE: usize = 24;

    pub fn new(layout: &Layout) -> Self {
        let params = layout.params();
        Self {
            magic: MAGIC,
            block_size: params.block_size,
            total_blocks: params.total_blocks,
            inode_table_len: BlockId::span(&layout.inode_table),
            inode_count: params.inode_count,
            root_dir_start: layout.root_dir.start.into(),
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    #[inline]
    pub fn params(&self) -> VolumeParams {
        VolumeParams {
            total_blocks: self.total_blocks,
            block_size: self.block_size,
            inode_count: self.inode_count,
        }
    }

    /// 超级块记录的区域与重新推算的布局是否一致
    pub fn agrees_with(&self, layout: &Layout) -> bool {
        *self == Self::new(layout)
    }

    pub fn load(block_device: &Arc<dyn BlockDevice>) -> Result<Self> {
        let block = Block::load(BlockId::new(0), block_device);
        let super_block = Self::read(&mut Cursor::new(block.as_slice()))?;
        if !super_block.is_valid() {
            return Err(Error::Corrupted("bad magic number"));
        }
        Ok(super_block)
    }

    pub fn store(&self, block_device: &Arc<dyn BlockDevice>) -> Result<()> {
        let mut block = Block::zeroed(BlockId::new(0), block_device);
        self.write(&mut Cursor::new(block.as_mut_slice()))?;
        block.sync();
        Ok(())
    }
}
