use core::ops::Range;
use std::sync::Arc;

use block_dev::BlockDevice;

use crate::block::{self, BlockId};
use crate::layout::Layout;

/// 空闲块位图，整卷每块一位：`1` 空闲，`0` 占用。
///
/// 位图整体缓存在内存中，每次改动后立即把整个位图区域写回磁盘。
#[derive(Debug)]
pub struct Bitmap {
    /// 位图在磁盘上占据的块
    region: Range<BlockId>,
    /// 可分配的数据块区域，其余块永远视作占用
    data: Range<BlockId>,
    total_blocks: u32,
    groups: Vec<u64>,
}

impl Bitmap {
    /// 格式化时的位图：只有数据块区域空闲
    pub fn new(layout: &Layout) -> Self {
        let mut bitmap = Self::blank(layout);
        for id in u32::from(layout.data.start)..u32::from(layout.data.end) {
            let (group, bit) = locate(BlockId::new(id));
            bitmap.groups[group] |= 1 << bit;
        }
        bitmap
    }

    /// 从磁盘读出位图
    pub fn load(layout: &Layout, block_device: &Arc<dyn BlockDevice>) -> Self {
        let mut bitmap = Self::blank(layout);
        let bytes = block::read_region(block_device, &layout.bitmap);
        for (group, chunk) in bitmap.groups.iter_mut().zip(bytes.chunks_exact(8)) {
            *group = u64::from_le_bytes(chunk.try_into().unwrap());
        }
        bitmap
    }

    pub fn sync(&self, block_device: &Arc<dyn BlockDevice>) {
        let bytes: Vec<u8> = self
            .groups
            .iter()
            .flat_map(|group| group.to_le_bytes())
            .collect();
        block::write_region(block_device, &self.region, &bytes);
    }

    #[inline]
    pub fn is_free(&self, id: BlockId) -> bool {
        let (group, bit) = locate(id);
        self.groups.get(group).is_some_and(|bits| bits & (1 << bit) != 0)
    }

    /// 分配编号最小的空闲块并写回位图。
    /// 位图耗尽时返回空。
    pub fn alloc(&mut self, block_device: &Arc<dyn BlockDevice>) -> Option<BlockId> {
        let id = self.groups.iter().enumerate().find_map(|(group, &bits)| {
            let mut bits = bits;
            while bits != 0 {
                let id = BlockId::new((group * 64) as u32 + bits.trailing_zeros());
                // 位图若被外部改坏，元数据块也绝不分配出去
                if self.data.contains(&id) {
                    return Some(id);
                }
                bits &= bits - 1;
            }
            None
        })?;

        let (group, bit) = locate(id);
        self.groups[group] &= !(1 << bit);
        self.sync(block_device);
        log::debug!("alloc block {id}");

        Some(id)
    }

    /// 释放一块并写回位图。
    /// 释放元数据块或已空闲的块什么也不做。
    pub fn dealloc(&mut self, block_device: &Arc<dyn BlockDevice>, id: BlockId) {
        if !self.data.contains(&id) {
            log::warn!("refuse to free reserved block {id}");
            return;
        }
        if self.is_free(id) {
            log::warn!("block {id} is already free");
            return;
        }

        let (group, bit) = locate(id);
        self.groups[group] |= 1 << bit;
        self.sync(block_device);
        log::debug!("free block {id}");
    }

    /// 空闲块数
    pub fn free_count(&self) -> usize {
        (0..self.total_blocks)
            .filter(|&id| self.is_free(BlockId::new(id)))
            .count()
    }
}

impl Bitmap {
    fn blank(layout: &Layout) -> Self {
        let bytes = BlockId::span(&layout.bitmap) as usize * layout.block_size();
        Self {
            region: layout.bitmap.clone(),
            data: layout.data.clone(),
            total_blocks: layout.total_blocks(),
            groups: vec![0; bytes / 8],
        }
    }
}

/// 块编号所在的位组与组内位置
#[inline]
fn locate(id: BlockId) -> (usize, u32) {
    let id = u32::from(id);
    ((id / 64) as usize, id % 64)
}

#[cfg(test)]
mod tests {
    use block_dev::RamDisk;

    use super::*;
    use crate::layout::VolumeParams;

    fn setup() -> (Layout, Arc<dyn BlockDevice>) {
        let layout = Layout::new(VolumeParams::default()).unwrap();
        let dev: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(1024, 1024));
        (layout, dev)
    }

    #[test]
    fn fresh_bitmap_reserves_metadata() {
        let (layout, _) = setup();
        let bitmap = Bitmap::new(&layout);

        assert_eq!(bitmap.free_count(), 1023 - 21);
        assert!(!bitmap.is_free(BlockId::new(0)));
        assert!(!bitmap.is_free(BlockId::new(20)));
        assert!(bitmap.is_free(BlockId::new(21)));
        assert!(!bitmap.is_free(BlockId::new(1023)));
    }

    #[test]
    fn alloc_first_free_then_reuse() {
        let (layout, dev) = setup();
        let mut bitmap = Bitmap::new(&layout);

        let a = bitmap.alloc(&dev).unwrap();
        let b = bitmap.alloc(&dev).unwrap();
        assert_eq!(a, BlockId::new(21));
        assert_eq!(b, BlockId::new(22));

        bitmap.dealloc(&dev, a);
        assert_eq!(bitmap.alloc(&dev), Some(a));
    }

    #[test]
    fn exhaustion() {
        let (layout, dev) = setup();
        let mut bitmap = Bitmap::new(&layout);

        let data_blocks = BlockId::span(&layout.data) as usize;
        for _ in 0..data_blocks {
            assert!(bitmap.alloc(&dev).is_some());
        }
        assert_eq!(bitmap.free_count(), 0);
        assert_eq!(bitmap.alloc(&dev), None);
    }

    #[test]
    fn dealloc_is_idempotent_and_spares_metadata() {
        let (layout, dev) = setup();
        let mut bitmap = Bitmap::new(&layout);
        let before = bitmap.free_count();

        let id = bitmap.alloc(&dev).unwrap();
        bitmap.dealloc(&dev, id);
        bitmap.dealloc(&dev, id);
        assert_eq!(bitmap.free_count(), before);

        bitmap.dealloc(&dev, BlockId::new(3));
        bitmap.dealloc(&dev, BlockId::new(1023));
        assert!(!bitmap.is_free(BlockId::new(3)));
        assert_eq!(bitmap.free_count(), before);
    }

    #[test]
    fn write_through() {
        let (layout, dev) = setup();
        let mut bitmap = Bitmap::new(&layout);
        bitmap.sync(&dev);
        bitmap.alloc(&dev).unwrap();

        let reloaded = Bitmap::load(&layout, &dev);
        assert!(!reloaded.is_free(BlockId::new(21)));
        assert!(reloaded.is_free(BlockId::new(22)));
        assert_eq!(reloaded.free_count(), bitmap.free_count());
    }

    #[test]
    fn on_disk_bit_order() {
        let (layout, dev) = setup();
        let bitmap = Bitmap::new(&layout);
        bitmap.sync(&dev);

        let bytes = block::read_region(&dev, &layout.bitmap);
        // 块 0..=20 占用，块 21..=23 空闲：字节 2 为 0b1110_0000
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[1], 0);
        assert_eq!(bytes[2], 0b1110_0000);
        assert_eq!(bytes[3], 0xFF);
        // 块 1016..=1022 空闲，1023 为位图自身
        assert_eq!(bytes[127], 0b0111_1111);
        assert_eq!(bytes[128], 0);
    }
}
