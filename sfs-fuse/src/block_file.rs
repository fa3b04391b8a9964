use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use block_dev::BlockDevice;
use send_wrapper::SendWrapper;

/// 以宿主机上的文件作为块设备，文件长度即设备容量
#[derive(Debug)]
pub struct BlockFile {
    inner: SendWrapper<RefCell<File>>,
    block_size: usize,
    block_count: usize,
}

impl BlockFile {
    pub fn new(fd: File, block_size: usize, block_count: usize) -> Self {
        Self {
            inner: SendWrapper::new(RefCell::new(fd)),
            block_size,
            block_count,
        }
    }

    /// 创建全零的镜像文件，已存在则截断
    pub fn create(path: impl AsRef<Path>, block_size: usize, block_count: usize) -> io::Result<Self> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        fd.set_len((block_size * block_count) as u64)?;

        Ok(Self::new(fd, block_size, block_count))
    }

    /// 打开已有的镜像文件，块数由文件长度推出
    pub fn open(path: impl AsRef<Path>, block_size: usize) -> io::Result<Self> {
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        let len = fd.metadata()?.len() as usize;
        if len % block_size != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("image length {len} is not a multiple of {block_size}"),
            ));
        }

        Ok(Self::new(fd, block_size, len / block_size))
    }
}

impl BlockDevice for BlockFile {
    #[inline]
    fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    fn block_count(&self) -> usize {
        self.block_count
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        assert_eq!(buf.len(), self.block_size, "not a complete block!");
        let mut file = self.inner.borrow_mut();
        file.seek(SeekFrom::Start((block_id * self.block_size) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete block!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        assert_eq!(buf.len(), self.block_size, "not a complete block!");
        let mut file = self.inner.borrow_mut();
        file.seek(SeekFrom::Start((block_id * self.block_size) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete block!");
    }
}
