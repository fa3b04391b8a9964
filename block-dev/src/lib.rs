//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、光盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 块大小与块数在设备创建时确定，之后不可更改。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;
use core::any::Any;

use spin::Mutex;

/// 块设备驱动特质
///
/// 所有读写都以整块为单位：`buf` 的长度必须是 [`BlockDevice::block_size`] 的整数倍。
pub trait BlockDevice: Send + Sync + Any {
    /// 每块的字节数
    fn block_size(&self) -> usize;

    /// 设备的总块数
    fn block_count(&self) -> usize;

    fn read_block(&self, block_id: usize, buf: &mut [u8]);

    fn write_block(&self, block_id: usize, buf: &[u8]);

    /// 从 `start` 起连续读出 `buf.len() / block_size` 块
    fn read_blocks(&self, start: usize, buf: &mut [u8]) {
        let block_size = self.block_size();
        assert_eq!(buf.len() % block_size, 0, "not a whole number of blocks");
        for (i, block) in buf.chunks_exact_mut(block_size).enumerate() {
            self.read_block(start + i, block);
        }
    }

    /// 从 `start` 起连续写入 `buf.len() / block_size` 块
    fn write_blocks(&self, start: usize, buf: &[u8]) {
        let block_size = self.block_size();
        assert_eq!(buf.len() % block_size, 0, "not a whole number of blocks");
        for (i, block) in buf.chunks_exact(block_size).enumerate() {
            self.write_block(start + i, block);
        }
    }
}

/// 内存中的块设备，创建时全部清零
#[derive(Debug)]
pub struct RamDisk {
    block_size: usize,
    data: Mutex<Vec<u8>>,
}

impl RamDisk {
    pub fn new(block_size: usize, block_count: usize) -> Self {
        Self {
            block_size,
            data: Mutex::new(vec![0; block_size * block_count]),
        }
    }

    /// 整个设备的内容
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    fn range(&self, block_id: usize, len: usize) -> core::ops::Range<usize> {
        assert_eq!(len, self.block_size, "not a complete block!");
        assert!(block_id < self.block_count(), "block {block_id} out of device");
        let start = block_id * self.block_size;
        start..start + self.block_size
    }
}

impl BlockDevice for RamDisk {
    #[inline]
    fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    fn block_count(&self) -> usize {
        self.data.lock().len() / self.block_size
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let range = self.range(block_id, buf.len());
        buf.copy_from_slice(&self.data.lock()[range]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let range = self.range(block_id, buf.len());
        self.data.lock()[range].copy_from_slice(buf);
    }
}
