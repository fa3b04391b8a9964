use core::str;

use binrw::binrw;

use crate::layout::{InodeId, NIL};
use crate::{Error, Result, NAME_BASE_MAX, NAME_EXT_MAX, NAME_LEN};

/// 磁盘上的目录项，恒为 24 字节
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskDirEntry {
    /// `-1` 表示槽位空闲
    inode_id: i32,
    name: [u8; NAME_LEN],
}

/// 定长文件名：最多 16 字节主名加 3 字节扩展名。
///
/// 不足部分以 `\0` 填充；用满 20 字节时没有结尾的 `\0`。
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileName([u8; NAME_LEN]);

/// 根目录中的在用项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode_id: InodeId,
    pub name: FileName,
}

impl DiskDirEntry {
    pub const SIZE: usize = 24;

    pub const FREE: Self = Self {
        inode_id: NIL,
        name: [0; NAME_LEN],
    };

    /// 空闲槽位解出 `None`
    pub fn decode(&self) -> Result<Option<DirEntry>> {
        match self.inode_id {
            NIL => Ok(None),
            id if id >= 0 => {
                let name = FileName(self.name);
                str::from_utf8(name.as_bytes())
                    .map_err(|_| Error::Corrupted("file name is not UTF-8"))?;
                Ok(Some(DirEntry {
                    inode_id: InodeId::from(id as u32),
                    name,
                }))
            }
            _ => Err(Error::Corrupted("negative inode id")),
        }
    }
}

impl From<&DirEntry> for DiskDirEntry {
    fn from(entry: &DirEntry) -> Self {
        Self {
            inode_id: u32::from(entry.inode_id) as i32,
            name: entry.name.0,
        }
    }
}

impl FileName {
    /// 校验并定长存放文件名。
    /// 不允许空名、路径分隔符与 `\0`。
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() || name.contains(['/', '\0']) {
            return Err(Error::InvalidName);
        }

        let (base, ext) = match name.rsplit_once('.') {
            Some((base, ext)) => (base, ext),
            None => (name, ""),
        };
        if base.is_empty() || base.len() > NAME_BASE_MAX || ext.len() > NAME_EXT_MAX {
            return Err(Error::InvalidName);
        }

        let mut buf = [0; NAME_LEN];
        buf[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self(buf))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|&c| c == 0).unwrap_or(NAME_LEN);
        &self.0[..len]
    }

    pub fn as_str(&self) -> &str {
        // 构造时与解码时都已校验
        str::from_utf8(self.as_bytes()).unwrap_or_default()
    }
}

impl core::fmt::Debug for FileName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl core::fmt::Display for FileName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
