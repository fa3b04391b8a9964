//! # 块缓冲层
//!
//! 对块设备的读写都经过 [`Block`]：读出整块、修改其中一段、再整块写回。
//! 缓冲区恰好一块大小，所有子区间拷贝都做越界检查，
//! 因此一次写入不会破坏同一块内写入范围以外的字节。
//!
//! 与内核中的块缓存不同，这里不做调度：元数据已由各张表缓存在内存，
//! 数据块则总是直写。

use std::ops::Range;
use std::sync::Arc;

use block_dev::BlockDevice;
use derive_more::{Display, From, Into};

/// 卷内的块编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
#[repr(transparent)]
pub struct BlockId(u32);

impl From<BlockId> for usize {
    fn from(id: BlockId) -> Self {
        id.0 as usize
    }
}

impl BlockId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// 向后偏移 `count` 块，越过 `u32` 时返回空
    #[inline]
    pub fn checked_add(self, count: u32) -> Option<Self> {
        self.0.checked_add(count).map(Self)
    }

    /// 区域包含的块数
    #[inline]
    pub fn span(range: &Range<BlockId>) -> u32 {
        range.end.0 - range.start.0
    }
}

/// 内存中的一块
pub struct Block {
    id: BlockId,
    data: Box<[u8]>,
    block_device: Arc<dyn BlockDevice>,
    /// 是否为脏块
    modified: bool,
}

impl Block {
    /// 从设备读出一块
    pub fn load(id: BlockId, block_device: &Arc<dyn BlockDevice>) -> Self {
        let mut data = vec![0; block_device.block_size()].into_boxed_slice();
        block_device.read_block(id.into(), &mut data);

        Self {
            id,
            data,
            block_device: block_device.clone(),
            modified: false,
        }
    }

    /// 全零的新块，不读设备；写回时覆盖整块
    pub fn zeroed(id: BlockId, block_device: &Arc<dyn BlockDevice>) -> Self {
        Self {
            id,
            data: vec![0; block_device.block_size()].into_boxed_slice(),
            block_device: block_device.clone(),
            modified: true,
        }
    }

    #[inline]
    pub fn id(&self) -> BlockId {
        self.id
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.modified = true;
        &mut self.data
    }

    /// 从块内 `offset` 处拷出 `dest.len()` 字节
    pub fn read_at(&self, offset: usize, dest: &mut [u8]) {
        assert!(offset + dest.len() <= self.data.len());
        dest.copy_from_slice(&self.data[offset..offset + dest.len()]);
    }

    /// 把 `src` 拷入块内 `offset` 处
    pub fn write_at(&mut self, offset: usize, src: &[u8]) {
        assert!(offset + src.len() <= self.data.len());
        self.modified = true;
        self.data[offset..offset + src.len()].copy_from_slice(src);
    }

    pub fn sync(&mut self) {
        if self.modified {
            self.modified = false;
            self.block_device.write_block(self.id.into(), &self.data);
        }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        self.sync();
    }
}

/// 读出一段连续区域
pub fn read_region(block_device: &Arc<dyn BlockDevice>, region: &Range<BlockId>) -> Vec<u8> {
    let mut buf = vec![0; BlockId::span(region) as usize * block_device.block_size()];
    block_device.read_blocks(region.start.into(), &mut buf);
    buf
}

/// 写入一段连续区域，`bytes` 不足的部分补零
pub fn write_region(block_device: &Arc<dyn BlockDevice>, region: &Range<BlockId>, bytes: &[u8]) {
    let mut buf = vec![0; BlockId::span(region) as usize * block_device.block_size()];
    assert!(bytes.len() <= buf.len(), "region overflow");
    buf[..bytes.len()].copy_from_slice(bytes);
    block_device.write_blocks(region.start.into(), &buf);
}
