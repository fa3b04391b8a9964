use core::ops::Range;

use crate::block::BlockId;
use crate::layout::{DiskDirEntry, DiskInode};
use crate::{Error, Result, DIRECT_COUNT};

/// 卷参数，格式化时确定，之后不可更改
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeParams {
    /// 卷的总块数 N
    pub total_blocks: u32,
    /// 块大小 B，单位字节
    pub block_size: u32,
    /// 索引节点数 M，同时也是根目录槽位数与打开文件表容量
    pub inode_count: u32,
}

impl Default for VolumeParams {
    fn default() -> Self {
        Self {
            total_blocks: 1024,
            block_size: 1024,
            inode_count: 200,
        }
    }
}

/// 由 [`VolumeParams`] 推出的各区域边界，纯计算，无状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    params: VolumeParams,
    pub inode_table: Range<BlockId>,
    pub root_dir: Range<BlockId>,
    pub data: Range<BlockId>,
    pub bitmap: Range<BlockId>,
}

impl Layout {
    pub fn new(params: VolumeParams) -> Result<Self> {
        let VolumeParams {
            total_blocks,
            block_size,
            inode_count,
        } = params;

        if block_size < 64 || block_size > 65536 || block_size % 8 != 0 {
            return Err(Error::InvalidParams(
                "block size must be a multiple of 8 in [64, 65536]",
            ));
        }
        if inode_count == 0 {
            return Err(Error::InvalidParams("at least one inode is required"));
        }

        let inode_table_len = blocks_for(inode_count as u64 * DiskInode::SIZE as u64, block_size)?;
        let root_dir_len = blocks_for(inode_count as u64 * DiskDirEntry::SIZE as u64, block_size)?;
        let bitmap_len = blocks_for((total_blocks as u64).div_ceil(8), block_size)?;

        let inode_table_end = BlockId::new(1)
            .checked_add(inode_table_len)
            .ok_or(TOO_LARGE)?;
        let root_dir_end = inode_table_end.checked_add(root_dir_len).ok_or(TOO_LARGE)?;
        let inode_table = BlockId::new(1)..inode_table_end;
        let root_dir = inode_table_end..root_dir_end;
        let data_start = u64::from(u32::from(root_dir_end));
        if data_start + bitmap_len as u64 >= total_blocks as u64 {
            return Err(Error::InvalidParams("volume has no room for data blocks"));
        }
        let bitmap = BlockId::new(total_blocks - bitmap_len)..BlockId::new(total_blocks);
        let data = root_dir.end..bitmap.start;

        Ok(Self {
            params,
            inode_table,
            root_dir,
            data,
            bitmap,
        })
    }

    #[inline]
    pub fn params(&self) -> VolumeParams {
        self.params
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.params.block_size as usize
    }

    #[inline]
    pub fn inode_count(&self) -> usize {
        self.params.inode_count as usize
    }

    #[inline]
    pub fn total_blocks(&self) -> u32 {
        self.params.total_blocks
    }

    /// 元数据块与位图块永远被占用
    #[inline]
    pub fn is_reserved(&self, id: BlockId) -> bool {
        !self.data.contains(&id)
    }

    /// 间接块能容纳的块编号个数
    #[inline]
    pub fn indirect_count(&self) -> usize {
        self.block_size() / core::mem::size_of::<i32>()
    }

    /// 单级间接索引下文件的最大字节数
    pub fn max_file_size(&self) -> u64 {
        ((DIRECT_COUNT + self.indirect_count()) * self.block_size()) as u64
    }
}

const TOO_LARGE: Error = Error::InvalidParams("metadata region too large");

/// 容纳 `bytes` 字节需要多少块
fn blocks_for(bytes: u64, block_size: u32) -> Result<u32> {
    u32::try_from(bytes.div_ceil(block_size as u64)).map_err(|_| TOO_LARGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_boundaries() {
        let layout = Layout::new(VolumeParams::default()).unwrap();

        // 200 * 72 = 14400 字节，15 块
        assert_eq!(layout.inode_table, BlockId::new(1)..BlockId::new(16));
        // 200 * 24 = 4800 字节，5 块
        assert_eq!(layout.root_dir, BlockId::new(16)..BlockId::new(21));
        // 1024 / 8 = 128 字节，1 块
        assert_eq!(layout.bitmap, BlockId::new(1023)..BlockId::new(1024));
        assert_eq!(layout.data, BlockId::new(21)..BlockId::new(1023));

        assert_eq!(layout.indirect_count(), 256);
        assert_eq!(layout.max_file_size(), (12 + 256) * 1024);
    }

    #[test]
    fn reserved_blocks() {
        let layout = Layout::new(VolumeParams::default()).unwrap();
        assert!(layout.is_reserved(BlockId::new(0)));
        assert!(layout.is_reserved(BlockId::new(20)));
        assert!(!layout.is_reserved(BlockId::new(21)));
        assert!(!layout.is_reserved(BlockId::new(1022)));
        assert!(layout.is_reserved(BlockId::new(1023)));
    }

    #[test]
    fn layout_is_reproducible() {
        let params = VolumeParams {
            total_blocks: 4000,
            block_size: 512,
            inode_count: 33,
        };
        let a = Layout::new(params).unwrap();
        let b = Layout::new(params).unwrap();
        assert_eq!(a, b);
        // 4000 / 8 = 500 字节，仍是 1 块
        assert_eq!(BlockId::span(&a.bitmap), 1);
        // 33 * 72 = 2376 字节，5 块
        assert_eq!(BlockId::span(&a.inode_table), 5);
        // 33 * 24 = 792 字节，2 块
        assert_eq!(BlockId::span(&a.root_dir), 2);
    }

    #[test]
    fn rejects_bad_params() {
        let base = VolumeParams::default();
        assert!(matches!(
            Layout::new(VolumeParams { block_size: 100, ..base }),
            Err(Error::InvalidParams(_))
        ));
        assert!(matches!(
            Layout::new(VolumeParams { inode_count: 0, ..base }),
            Err(Error::InvalidParams(_))
        ));
        assert!(matches!(
            Layout::new(VolumeParams { total_blocks: 21, ..base }),
            Err(Error::InvalidParams(_))
        ));
    }

    #[test]
    fn rejects_metadata_beyond_block_ids() {
        // 索引节点表本身就超出 u32 块编号
        let huge = VolumeParams {
            total_blocks: u32::MAX,
            block_size: 64,
            inode_count: 3_817_748_708,
        };
        assert_eq!(
            Layout::new(huge),
            Err(Error::InvalidParams("metadata region too large"))
        );

        // 两张表各自放得下，合起来越过 u32::MAX
        let summed = VolumeParams {
            total_blocks: u32::MAX,
            block_size: 64,
            inode_count: u32::MAX / 8 * 7,
        };
        assert_eq!(
            Layout::new(summed),
            Err(Error::InvalidParams("metadata region too large"))
        );
    }
}
