use derive_more::Display;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Error {
    /// 描述符未打开或越界
    #[display(fmt = "file descriptor is not open")]
    NotOpen,
    /// 对同一描述符重复关闭
    #[display(fmt = "file descriptor is already closed")]
    AlreadyClosed,
    #[display(fmt = "no such file")]
    NotFound,
    #[display(fmt = "no free {}", _0)]
    ResourceExhausted(Resource),
    /// 偏移超出文件大小
    #[display(fmt = "offset out of range")]
    OutOfRange,
    /// 文件名不满足 16 + 3 的限制
    #[display(fmt = "invalid file name")]
    InvalidName,
    #[display(fmt = "invalid volume parameters: {}", _0)]
    InvalidParams(&'static str),
    /// 磁盘上的元数据无法解释
    #[display(fmt = "corrupted volume: {}", _0)]
    Corrupted(&'static str),
}

/// 耗尽的资源
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    #[display(fmt = "inode")]
    Inode,
    #[display(fmt = "directory slot")]
    DirectorySlot,
    #[display(fmt = "file descriptor")]
    Descriptor,
    #[display(fmt = "block")]
    Block,
    #[display(fmt = "indirect pointer slot")]
    IndirectSlot,
}

impl std::error::Error for Error {}

impl From<binrw::Error> for Error {
    fn from(err: binrw::Error) -> Self {
        log::error!("metadata codec: {err}");
        Self::Corrupted("undecodable metadata")
    }
}
