//! # sfs
//!
//! 建立在定长块设备之上的单卷简单文件系统：
//! 超级块、索引节点表、扁平的根目录、空闲块位图，
//! 以及经直接索引与一级间接索引寻址的数据块。

/* sfs 的整体架构，自上而下 */

// 文件层：打开、读写、定位、删除文件
mod file;
pub use file::FileStat;

// 卷管理层：格式化、挂载，持有全部内存缓存
mod fs;
pub use fs::{SharedFileSystem, SimpleFileSystem};

// 易失的打开文件表
mod fdt;
pub use fdt::Fd;

// 根目录与索引节点表的内存缓存
mod directory;
mod inode_table;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
pub mod layout;

// 块缓冲层：整块读出，改动后整块写回
mod block;
pub use block::BlockId;

mod error;
pub use error::{Error, Resource, Result};

pub use layout::{Layout, VolumeParams};

pub const MAGIC: u32 = 260917301;
/// 直接索引个数
pub const DIRECT_COUNT: usize = 12;
/// 磁盘上文件名字段的宽度
pub const NAME_LEN: usize = NAME_BASE_MAX + 1 + NAME_EXT_MAX;
pub const NAME_BASE_MAX: usize = 16;
pub const NAME_EXT_MAX: usize = 3;
