mod block_file;

pub use block_file::BlockFile;
