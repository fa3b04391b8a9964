//! # 文件层
//!
//! 在卷之上实现按名打开、按描述符读写定位、删除与枚举。
//! 每个描述符只有 `Closed -> Open -> Closed` 两种状态，
//! 读、写、定位只在 `Open` 状态下成功。

use enumflags2::BitFlags;

use crate::block::Block;
use crate::error::Resource;
use crate::fdt::{Fd, OpenFile};
use crate::layout::{DirEntry, FileName, Inode, InodeId, Permission};
use crate::{Error, Result, SimpleFileSystem};

/// 文件的元信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub inode: InodeId,
    pub size: u32,
    /// 占用块数，含间接块
    pub blocks: usize,
    pub mode: BitFlags<Permission>,
    pub links: u32,
}

impl SimpleFileSystem {
    /// 打开文件，不存在则创建；新描述符的读写指针为 0。
    ///
    /// 同名文件已被打开时仍分配新的描述符。
    pub fn open(&mut self, name: &str) -> Result<Fd> {
        let name = FileName::new(name)?;

        if let Some(entry) = self.root.lookup(&name) {
            let inode_id = entry.inode_id;
            let fd = self.open_files.open(inode_id)?;
            log::debug!("open {name} (inode {inode_id}) as fd {fd}");
            return Ok(fd);
        }

        // 先确认三张表都有空位，再做修改
        let slot = self
            .root
            .first_free_slot()
            .ok_or(Error::ResourceExhausted(Resource::DirectorySlot))?;
        let inode_id = self
            .inodes
            .first_free()
            .ok_or(Error::ResourceExhausted(Resource::Inode))?;
        if self.open_files.first_free().is_none() {
            return Err(Error::ResourceExhausted(Resource::Descriptor));
        }

        self.inodes.insert(inode_id, Inode::new());
        self.root.insert(slot, DirEntry { inode_id, name });
        let fd = self.open_files.open(inode_id)?;
        self.sync_inodes()?;
        self.sync_root()?;

        log::debug!("create {name} (inode {inode_id}) as fd {fd}");
        Ok(fd)
    }

    /// 关闭描述符，不会额外刷盘
    pub fn close(&mut self, fd: Fd) -> Result<()> {
        self.open_files.close(fd)
    }

    /// 从读写指针处写入，返回写入的字节数。
    ///
    /// 写到文件末尾的块边界时追加新块，否则先读出目标块，改动后整块写回。
    /// 文件大小只增不减；空间耗尽时保留已写入的部分，
    /// 一个字节都没写成才返回错误。
    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize> {
        let OpenFile { inode_id, cursor } = *self.open_files.get(fd)?;
        let block_size = self.layout.block_size();
        let inode = self.inodes.get_mut(inode_id)?;

        let mut start = cursor as usize;
        let mut written_size = 0;
        let mut outcome = Ok(());
        while written_size < buf.len() {
            // 块内偏移
            let offset = start % block_size;
            let block_write_size = (block_size - offset).min(buf.len() - written_size);
            let src = &buf[written_size..written_size + block_write_size];
            let block_index = start / block_size;

            let block = if block_index >= inode.data_blocks(block_size) {
                // 读写指针不会超过文件大小，这里一定位于末尾的块边界
                debug_assert_eq!(start, inode.size as usize);
                inode
                    .append_block(&self.layout, &mut self.bitmap, &self.block_device)
                    .map(|id| Block::zeroed(id, &self.block_device))
            } else if block_write_size == block_size {
                // 整块覆盖，不必读出
                inode
                    .nth_block(block_index, &self.layout, &self.block_device)
                    .map(|id| Block::zeroed(id, &self.block_device))
            } else {
                inode
                    .nth_block(block_index, &self.layout, &self.block_device)
                    .map(|id| Block::load(id, &self.block_device))
            };
            let mut block = match block {
                Ok(block) => block,
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            };

            block.write_at(offset, src);
            block.sync();
            log::trace!("write {block_write_size} bytes to block {}", block.id());

            written_size += block_write_size;
            start += block_write_size;
            inode.size = inode.size.max(start as u32);
        }

        self.open_files.get_mut(fd)?.cursor = start as u32;
        self.sync_inodes()?;

        match outcome {
            Err(err) if written_size == 0 => Err(err),
            Err(err) => {
                log::warn!("partial write on fd {fd}: {written_size} of {} bytes, {err}", buf.len());
                Ok(written_size)
            }
            Ok(()) => Ok(written_size),
        }
    }

    /// 从读写指针处读出至多 `buf.len()` 字节，返回读出的字节数。
    /// 位于文件末尾或之后时读出 0 字节。
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let OpenFile { inode_id, cursor } = *self.open_files.get(fd)?;
        let block_size = self.layout.block_size();
        let inode = self.inodes.get(inode_id)?;

        let mut start = cursor as usize;
        let end = (start + buf.len()).min(inode.size as usize);
        if start >= end {
            return Ok(0);
        }

        // 已读取多少字节
        let mut read_size = 0;
        while start < end {
            let offset = start % block_size;
            let block_read_size = (block_size - offset).min(end - start);
            let id = inode.block_id(start, &self.layout, &self.block_device)?;

            Block::load(id, &self.block_device)
                .read_at(offset, &mut buf[read_size..read_size + block_read_size]);
            log::trace!("read {block_read_size} bytes from block {id}");

            read_size += block_read_size;
            start += block_read_size;
        }

        self.open_files.get_mut(fd)?.cursor = start as u32;
        Ok(read_size)
    }

    /// 移动读写指针，`offset` 必须小于文件大小
    pub fn seek(&mut self, fd: Fd, offset: u32) -> Result<()> {
        let inode_id = self.open_files.get(fd)?.inode_id;
        if offset >= self.inodes.get(inode_id)?.size {
            return Err(Error::OutOfRange);
        }
        self.open_files.get_mut(fd)?.cursor = offset;
        Ok(())
    }

    /// 删除文件：关闭相关描述符，归还全部块，释放索引节点与目录槽位
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let name = FileName::new(name)?;
        let slot = self.root.position(&name).ok_or(Error::NotFound)?;
        let inode_id = self.root.lookup(&name).ok_or(Error::NotFound)?.inode_id;

        // 修改之前先取得块列表，失败时卷保持原样
        let blocks = self.inodes.get(inode_id)?.linked_blocks(&self.block_device)?;

        self.root.remove(slot);
        let closed = self.open_files.close_inode(inode_id);
        self.inodes.release(inode_id);
        for &block in &blocks {
            self.bitmap.dealloc(&self.block_device, block);
        }
        self.sync_root()?;
        self.sync_inodes()?;

        log::debug!(
            "remove {name} (inode {inode_id}): {} blocks freed, {closed} descriptors closed",
            blocks.len()
        );
        Ok(())
    }

    /// 文件大小，单位字节
    pub fn file_size(&self, name: &str) -> Result<u32> {
        self.stat(name).map(|stat| stat.size)
    }

    pub fn stat(&self, name: &str) -> Result<FileStat> {
        let name = FileName::new(name)?;
        let inode_id = self.root.lookup(&name).ok_or(Error::NotFound)?.inode_id;
        let inode = self.inodes.get(inode_id)?;
        let indirect = inode.indirect().map_or(0, |_| 1);

        Ok(FileStat {
            inode: inode_id,
            size: inode.size,
            blocks: inode.data_blocks(self.layout.block_size()) + indirect,
            mode: inode.mode,
            links: inode.link_count,
        })
    }

    /// 依次返回根目录中的文件名，末尾之后回到第一个；目录为空时返回空。
    ///
    /// 游标由整个文件系统共享，交错调用的多个使用者会看到同一个位置；
    /// 需要独立遍历时用 [`SimpleFileSystem::names`]。
    pub fn next_name(&mut self) -> Option<String> {
        let count = self.root.occupied_count();
        if count == 0 {
            self.name_cursor = 0;
            return None;
        }
        if self.name_cursor >= count {
            self.name_cursor = 0;
        }

        let name = self.root.nth_occupied(self.name_cursor)?.name.to_string();
        self.name_cursor += 1;
        Some(name)
    }

    /// 按槽位顺序遍历全部文件名
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.root.iter().map(|entry| entry.name.as_str())
    }
}
