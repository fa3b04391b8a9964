mod cli;

use std::fs;
use std::io;
use std::sync::Arc;

use block_dev::BlockDevice;
use clap::Parser;
use sfs::{SimpleFileSystem, VolumeParams};
use sfs_fuse::BlockFile;
use typed_bytesize::ByteSizeIec;

use self::cli::{Cli, Command};

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    log::info!("image={:?}", cli.image);

    if let Command::Format { blocks, inodes } = cli.command {
        let params = VolumeParams {
            total_blocks: blocks,
            block_size: cli.block_size,
            inode_count: inodes,
        };
        let block_dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::create(
            &cli.image,
            params.block_size as usize,
            params.total_blocks as usize,
        )?);
        let fs = SimpleFileSystem::mksfs(block_dev, params, true).map_err(fs_error)?;
        println!(
            "formatted {:?}: {} free blocks",
            cli.image,
            fs.free_blocks()
        );
        return Ok(());
    }

    let block_dev: Arc<dyn BlockDevice> =
        Arc::new(BlockFile::open(&cli.image, cli.block_size as usize)?);
    let mut fs = SimpleFileSystem::attach(block_dev).map_err(fs_error)?;

    match cli.command {
        Command::Format { .. } => unreachable!("handled above"),
        Command::Put { host, name } => {
            let name = match name {
                Some(name) => name,
                None => host
                    .file_name()
                    .and_then(|fname| fname.to_str())
                    .map(str::to_owned)
                    .ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidInput, "host path has no file name")
                    })?,
            };
            let data = fs::read(&host)?;

            // 文件大小只增不减，覆盖前先删除旧文件
            if fs.file_size(&name).is_ok() {
                fs.remove(&name).map_err(fs_error)?;
            }
            let fd = fs.open(&name).map_err(fs_error)?;
            let written = if data.is_empty() {
                0
            } else {
                fs.write(fd, &data).map_err(fs_error)?
            };
            fs.close(fd).map_err(fs_error)?;

            if written < data.len() {
                return Err(io::Error::other(format!(
                    "volume full: {written} of {} bytes written",
                    data.len()
                )));
            }
            println!("{host:?} -> {name} ({})", ByteSizeIec(written as u64));
        }
        Command::Get { name, host } => {
            let size = fs.file_size(&name).map_err(fs_error)?;
            let fd = fs.open(&name).map_err(fs_error)?;
            let mut data = vec![0; size as usize];
            let read = fs.read(fd, &mut data).map_err(fs_error)?;
            fs.close(fd).map_err(fs_error)?;

            data.truncate(read);
            fs::write(&host, &data)?;
            println!("{name} -> {host:?} ({})", ByteSizeIec(read as u64));
        }
        Command::Ls => {
            for name in fs.names() {
                let size = fs.file_size(name).map_err(fs_error)?;
                println!("{:>10}  {name}", ByteSizeIec(size as u64).to_string());
            }
            println!(
                "{} files, {} free blocks",
                fs.file_count(),
                fs.free_blocks()
            );
        }
        Command::Rm { name } => {
            fs.remove(&name).map_err(fs_error)?;
        }
        Command::Stat { name } => {
            let stat = fs.stat(&name).map_err(fs_error)?;
            println!("name:   {name}");
            println!("inode:  {}", stat.inode);
            println!("size:   {} ({})", stat.size, ByteSizeIec(stat.size as u64));
            println!("blocks: {}", stat.blocks);
            println!("mode:   {:o}", stat.mode.bits());
            println!("links:  {}", stat.links);
        }
    }

    Ok(())
}

fn fs_error(err: sfs::Error) -> io::Error {
    let kind = match err {
        sfs::Error::NotFound => io::ErrorKind::NotFound,
        sfs::Error::InvalidName | sfs::Error::InvalidParams(_) => io::ErrorKind::InvalidInput,
        sfs::Error::Corrupted(_) => io::ErrorKind::InvalidData,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}
