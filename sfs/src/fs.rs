//! # 卷管理层
//!
//! 构建出磁盘的布局并使用：格式化出新卷，或挂载已有的卷。
//! 索引节点表、根目录、位图都整体缓存在 [`SimpleFileSystem`] 中，
//! 任何结构性修改都会立即写回各自的固定区域。

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::directory::RootDirectory;
use crate::fdt::OpenFileTable;
use crate::inode_table::InodeTable;
use crate::layout::{Bitmap, Layout, SuperBlock, VolumeParams};
use crate::{Error, Result};

/// 多线程使用时，由一把锁串行化整个文件系统
pub type SharedFileSystem = Arc<Mutex<SimpleFileSystem>>;

pub struct SimpleFileSystem {
    pub(crate) block_device: Arc<dyn BlockDevice>,
    pub(crate) layout: Layout,
    pub(crate) inodes: InodeTable,
    pub(crate) root: RootDirectory,
    pub(crate) bitmap: Bitmap,
    pub(crate) open_files: OpenFileTable,
    /// [`SimpleFileSystem::next_name`] 的共享游标
    pub(crate) name_cursor: usize,
}

impl SimpleFileSystem {
    /// `fresh` 为真时在设备上格式化新卷，否则挂载已有的卷，
    /// 此时超级块记录的参数必须与 `params` 一致。
    pub fn mksfs(
        block_device: Arc<dyn BlockDevice>,
        params: VolumeParams,
        fresh: bool,
    ) -> Result<Self> {
        if fresh {
            return Self::format(block_device, params);
        }

        let fs = Self::attach(block_device)?;
        if fs.params() != params {
            return Err(Error::InvalidParams(
                "volume parameters differ from the superblock",
            ));
        }
        Ok(fs)
    }

    /// 格式化：写超级块，全部索引节点与目录槽位置为空闲，
    /// 位图中只有数据块区域空闲。
    pub fn format(block_device: Arc<dyn BlockDevice>, params: VolumeParams) -> Result<Self> {
        let layout = Layout::new(params)?;
        check_device(&layout, &block_device)?;

        SuperBlock::new(&layout).store(&block_device)?;

        let inodes = InodeTable::new(layout.inode_count());
        inodes.sync(&layout, &block_device)?;

        let root = RootDirectory::new(layout.inode_count());
        root.sync(&layout, &block_device)?;

        let bitmap = Bitmap::new(&layout);
        bitmap.sync(&block_device);

        log::info!(
            "format: {} blocks of {} bytes, {} inodes",
            params.total_blocks,
            params.block_size,
            params.inode_count
        );
        log_layout(&layout);

        Ok(Self::assemble(block_device, layout, inodes, root, bitmap))
    }

    /// 挂载已有的卷：超级块是卷参数的权威，
    /// 各区域由参数重新推算，并与超级块的记录相互印证。
    pub fn attach(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        let super_block = SuperBlock::load(&block_device)?;
        let layout = Layout::new(super_block.params())?;
        if !super_block.agrees_with(&layout) {
            return Err(Error::Corrupted("superblock disagrees with computed layout"));
        }
        check_device(&layout, &block_device)?;

        let inodes = InodeTable::load(&layout, &block_device)?;
        let root = RootDirectory::load(&layout, &block_device)?;
        let bitmap = Bitmap::load(&layout, &block_device);

        for entry in root.iter() {
            if inodes.get(entry.inode_id).is_err() {
                log::error!("{:?} points to free inode {}", entry.name, entry.inode_id);
                return Err(Error::Corrupted("directory entry points to a free inode"));
            }
        }
        for (id, _) in inodes.iter() {
            if !root.iter().any(|entry| entry.inode_id == id) {
                log::warn!("inode {id} is in use but has no directory entry");
            }
        }
        check_block_owners(&layout, &inodes, &bitmap, &block_device)?;

        log::info!(
            "attach: {} files, {} free blocks",
            root.occupied_count(),
            bitmap.free_count()
        );
        log_layout(&layout);

        Ok(Self::assemble(block_device, layout, inodes, root, bitmap))
    }

    pub fn into_shared(self) -> SharedFileSystem {
        Arc::new(Mutex::new(self))
    }

    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    #[inline]
    pub fn params(&self) -> VolumeParams {
        self.layout.params()
    }

    /// 位图中空闲块的个数
    #[inline]
    pub fn free_blocks(&self) -> usize {
        self.bitmap.free_count()
    }

    #[inline]
    pub fn file_count(&self) -> usize {
        self.root.occupied_count()
    }
}

impl SimpleFileSystem {
    fn assemble(
        block_device: Arc<dyn BlockDevice>,
        layout: Layout,
        inodes: InodeTable,
        root: RootDirectory,
        bitmap: Bitmap,
    ) -> Self {
        Self {
            block_device,
            open_files: OpenFileTable::new(layout.inode_count()),
            layout,
            inodes,
            root,
            bitmap,
            name_cursor: 0,
        }
    }

    /// 索引节点表写回磁盘
    pub(crate) fn sync_inodes(&self) -> Result<()> {
        self.inodes.sync(&self.layout, &self.block_device)
    }

    /// 根目录写回磁盘
    pub(crate) fn sync_root(&self) -> Result<()> {
        self.root.sync(&self.layout, &self.block_device)
    }
}

impl fmt::Debug for SimpleFileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleFileSystem")
            .field("layout", &self.layout)
            .field("files", &self.root.occupied_count())
            .field("free_blocks", &self.bitmap.free_count())
            .finish_non_exhaustive()
    }
}

fn check_device(layout: &Layout, block_device: &Arc<dyn BlockDevice>) -> Result<()> {
    if block_device.block_size() != layout.block_size() {
        return Err(Error::InvalidParams("device block size differs from volume"));
    }
    if block_device.block_count() < layout.total_blocks() as usize {
        return Err(Error::InvalidParams("device is smaller than volume"));
    }
    Ok(())
}

/// 在用索引节点链接的每一块都必须位于数据块区域、在位图中被占用，
/// 并且只属于一个索引节点；链接的数据块数与文件大小相符。
fn check_block_owners(
    layout: &Layout,
    inodes: &InodeTable,
    bitmap: &Bitmap,
    block_device: &Arc<dyn BlockDevice>,
) -> Result<()> {
    let mut owners = HashMap::new();

    for (id, inode) in inodes.iter() {
        if inode.size as u64 > layout.max_file_size() {
            log::error!("inode {id} claims {} bytes", inode.size);
            return Err(Error::Corrupted("file size exceeds the mapping capacity"));
        }
        // 间接块要先于其内容检查，越界的块不能读
        if let Some(indirect) = inode.indirect() {
            if !layout.data.contains(&indirect) {
                log::error!("inode {id} has indirect block {indirect} outside the data region");
                return Err(Error::Corrupted("block pointer outside the data region"));
            }
        }

        let blocks = inode.linked_blocks(block_device)?;
        for &block in &blocks {
            if !layout.data.contains(&block) {
                log::error!("inode {id} points to block {block} outside the data region");
                return Err(Error::Corrupted("block pointer outside the data region"));
            }
            if bitmap.is_free(block) {
                log::error!("block {block} of inode {id} is marked free");
                return Err(Error::Corrupted("linked block is marked free"));
            }
            if let Some(other) = owners.insert(block, id) {
                log::error!("block {block} is shared by inodes {other} and {id}");
                return Err(Error::Corrupted("block linked by two inodes"));
            }
        }

        let data_blocks = blocks.len() - inode.indirect().map_or(0, |_| 1);
        if data_blocks != inode.data_blocks(layout.block_size()) {
            log::error!(
                "inode {id} links {data_blocks} data blocks for {} bytes",
                inode.size
            );
            return Err(Error::Corrupted("linked blocks disagree with file size"));
        }
    }

    Ok(())
}

fn log_layout(layout: &Layout) {
    log::info!(
        "layout: inodes {:?}, root {:?}, data {:?}, bitmap {:?}",
        layout.inode_table,
        layout.root_dir,
        layout.data,
        layout.bitmap
    );
}
