use std::collections::HashSet;
use std::sync::Arc;

use block_dev::{BlockDevice, RamDisk};
use sfs::{Error, Resource, SimpleFileSystem, VolumeParams};

const BLOCK: usize = 1024;

fn ram_disk() -> Arc<dyn BlockDevice> {
    Arc::new(RamDisk::new(BLOCK, 1024))
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn read_all(fs: &mut SimpleFileSystem, name: &str) -> Vec<u8> {
    let size = fs.file_size(name).unwrap() as usize;
    let fd = fs.open(name).unwrap();
    let mut buf = vec![0; size];
    assert_eq!(fs.read(fd, &mut buf), Ok(size));
    fs.close(fd).unwrap();
    buf
}

#[test]
fn contents_survive_attach() {
    let dev = ram_disk();
    let files = [
        ("small.txt", pattern(100, 1)),
        ("twelve.bin", pattern(12 * BLOCK, 2)),
        ("large.dat", pattern(40 * BLOCK + 17, 3)),
    ];

    {
        let mut fs = SimpleFileSystem::mksfs(dev.clone(), VolumeParams::default(), true).unwrap();
        for (name, data) in &files {
            let fd = fs.open(name).unwrap();
            assert_eq!(fs.write(fd, data), Ok(data.len()));
            fs.close(fd).unwrap();
        }
    }

    let mut fs = SimpleFileSystem::mksfs(dev, VolumeParams::default(), false).unwrap();
    assert_eq!(fs.file_count(), files.len());
    for (name, data) in &files {
        assert_eq!(fs.file_size(name), Ok(data.len() as u32));
        assert_eq!(&read_all(&mut fs, name), data);
    }
}

#[test]
fn blocks_are_never_shared() {
    let mut fs = SimpleFileSystem::format(ram_disk(), VolumeParams::default()).unwrap();
    let before = fs.free_blocks();

    let sizes = [3 * BLOCK, 13 * BLOCK, 1, 20 * BLOCK + 5];
    for (i, &size) in sizes.iter().enumerate() {
        let fd = fs.open(&format!("f{i}")).unwrap();
        fs.write(fd, &pattern(size, i as u8)).unwrap();
    }

    // 各文件的块互不重叠
    let mut seen = HashSet::new();
    let mut used = 0;
    for i in 0..sizes.len() {
        let stat = fs.stat(&format!("f{i}")).unwrap();
        used += stat.blocks;
        seen.insert(stat.inode);
    }
    assert_eq!(seen.len(), sizes.len());
    assert_eq!(fs.free_blocks(), before - used);

    // 每个文件的内容都没有被别的文件覆盖
    for (i, &size) in sizes.iter().enumerate() {
        assert_eq!(read_all(&mut fs, &format!("f{i}")), pattern(size, i as u8));
    }
}

#[test]
fn size_only_grows() {
    let mut fs = SimpleFileSystem::format(ram_disk(), VolumeParams::default()).unwrap();
    let fd = fs.open("grow").unwrap();

    let mut last = 0;
    for (offset, len) in [(0, 500), (100, 50), (400, 300), (0, 10), (699, 2000)] {
        if offset > 0 {
            fs.seek(fd, offset).unwrap();
        } else {
            fs.close(fd).unwrap();
            let reopened = fs.open("grow").unwrap();
            assert_eq!(reopened, fd);
        }
        fs.write(fd, &pattern(len, 0)).unwrap();

        let size = fs.file_size("grow").unwrap();
        assert!(size >= last);
        assert_eq!(size, last.max(offset + len as u32));
        last = size;
    }
}

#[test]
fn reading_never_changes_size() {
    let mut fs = SimpleFileSystem::format(ram_disk(), VolumeParams::default()).unwrap();
    let data = pattern(2000, 7);
    let fd = fs.open("r").unwrap();
    fs.write(fd, &data).unwrap();
    fs.close(fd).unwrap();

    // 从头读：两次读取首尾相接
    let fd = fs.open("r").unwrap();
    let mut buf = [0; 100];
    assert_eq!(fs.read(fd, &mut buf), Ok(100));
    assert_eq!(&buf[..], &data[..100]);
    assert_eq!(fs.read(fd, &mut buf), Ok(100));
    assert_eq!(&buf[..], &data[100..200]);
    assert_eq!(fs.file_size("r"), Ok(2000));

    // 从中间读过末尾：只读到剩下的字节
    fs.seek(fd, 1500).unwrap();
    let mut buf = vec![0; 1000];
    assert_eq!(fs.read(fd, &mut buf), Ok(500));
    assert_eq!(&buf[..500], &data[1500..]);
    assert_eq!(fs.file_size("r"), Ok(2000));

    // 位于末尾后继续读
    assert_eq!(fs.read(fd, &mut buf), Ok(0));
    assert_eq!(fs.file_size("r"), Ok(2000));

    // 读完后指针停在末尾，写入从这里追加
    assert_eq!(fs.write(fd, b"!"), Ok(1));
    assert_eq!(fs.file_size("r"), Ok(2001));
    fs.seek(fd, 1999).unwrap();
    let mut tail = [0; 2];
    assert_eq!(fs.read(fd, &mut tail), Ok(2));
    assert_eq!(tail, [data[1999], b'!']);
}

#[test]
fn seek_stays_below_size() {
    let mut fs = SimpleFileSystem::format(ram_disk(), VolumeParams::default()).unwrap();
    let fd = fs.open("s").unwrap();
    fs.write(fd, &pattern(2 * BLOCK, 9)).unwrap();

    assert_eq!(fs.seek(fd, 2 * BLOCK as u32), Err(Error::OutOfRange));
    fs.seek(fd, 2 * BLOCK as u32 - 1).unwrap();

    let mut buf = [0; 8];
    assert_eq!(fs.read(fd, &mut buf), Ok(1));
    assert_eq!(buf[0], pattern(2 * BLOCK, 9)[2 * BLOCK - 1]);
    assert_eq!(fs.read(fd, &mut buf), Ok(0));
}

#[test]
fn indirect_block_appears_after_twelve_blocks() {
    let mut fs = SimpleFileSystem::format(ram_disk(), VolumeParams::default()).unwrap();
    let free = fs.free_blocks();
    let fd = fs.open("edge").unwrap();

    fs.write(fd, &pattern(12 * BLOCK, 5)).unwrap();
    assert_eq!(fs.stat("edge").unwrap().blocks, 12);
    assert_eq!(fs.free_blocks(), free - 12);

    // 第 13 块：一个数据块加一个间接块
    fs.write(fd, &[0xEE]).unwrap();
    assert_eq!(fs.stat("edge").unwrap().blocks, 14);
    assert_eq!(fs.free_blocks(), free - 14);

    fs.seek(fd, 12 * BLOCK as u32).unwrap();
    let mut buf = [0; 1];
    fs.read(fd, &mut buf).unwrap();
    assert_eq!(buf, [0xEE]);
}

#[test]
fn remove_returns_every_block() {
    let mut fs = SimpleFileSystem::format(ram_disk(), VolumeParams::default()).unwrap();
    let free = fs.free_blocks();

    for (name, size) in [("direct", 5 * BLOCK), ("indirect", 30 * BLOCK)] {
        let fd = fs.open(name).unwrap();
        fs.write(fd, &pattern(size, 0)).unwrap();
        fs.remove(name).unwrap();
        assert_eq!(fs.free_blocks(), free);
    }

    assert_eq!(fs.file_count(), 0);
    assert_eq!(fs.next_name(), None);
}

#[test]
fn removed_space_is_reused() {
    let mut fs = SimpleFileSystem::format(ram_disk(), VolumeParams::default()).unwrap();
    let fd = fs.open("a").unwrap();
    fs.write(fd, &pattern(3 * BLOCK, 1)).unwrap();
    let inode = fs.stat("a").unwrap().inode;
    fs.remove("a").unwrap();

    let fd = fs.open("b").unwrap();
    fs.write(fd, &pattern(BLOCK, 2)).unwrap();
    assert_eq!(fs.stat("b").unwrap().inode, inode);
    assert_eq!(read_all(&mut fs, "b"), pattern(BLOCK, 2));
}

#[test]
fn enumeration_cycles_through_every_name() {
    let mut fs = SimpleFileSystem::format(ram_disk(), VolumeParams::default()).unwrap();
    let names = ["one", "two.txt", "three.rs"];
    for name in names {
        fs.open(name).unwrap();
    }

    let first: Vec<_> = (0..names.len()).map(|_| fs.next_name().unwrap()).collect();
    assert_eq!(first, names);
    let second: Vec<_> = (0..names.len()).map(|_| fs.next_name().unwrap()).collect();
    assert_eq!(second, names);

    assert_eq!(fs.names().collect::<Vec<_>>(), names);
}

#[test]
fn write_stops_when_volume_is_full() {
    // 40 个数据块，其中一块要留给间接块
    let params = VolumeParams {
        total_blocks: 44,
        block_size: BLOCK as u32,
        inode_count: 8,
    };
    let dev: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(BLOCK, 44));
    let mut fs = SimpleFileSystem::format(dev, params).unwrap();
    let data_blocks = fs.free_blocks();

    let fd = fs.open("big").unwrap();
    let written = fs.write(fd, &pattern(100 * BLOCK, 4)).unwrap();
    assert_eq!(written, (data_blocks - 1) * BLOCK);
    assert_eq!(fs.file_size("big"), Ok(written as u32));
    assert_eq!(fs.free_blocks(), 0);

    assert_eq!(
        fs.write(fd, b"more"),
        Err(Error::ResourceExhausted(Resource::Block))
    );
    assert_eq!(fs.file_size("big"), Ok(written as u32));
}

#[test]
fn file_size_is_capped() {
    let mut fs = SimpleFileSystem::format(ram_disk(), VolumeParams::default()).unwrap();
    let max = fs.layout().max_file_size() as usize;

    let fd = fs.open("huge").unwrap();
    assert_eq!(fs.write(fd, &pattern(max + BLOCK, 6)), Ok(max));
    assert_eq!(
        fs.write(fd, b"x"),
        Err(Error::ResourceExhausted(Resource::IndirectSlot))
    );
    assert_eq!(fs.file_size("huge"), Ok(max as u32));
}

#[test]
fn descriptors_follow_their_lifecycle() {
    let mut fs = SimpleFileSystem::format(ram_disk(), VolumeParams::default()).unwrap();
    let fd = fs.open("a").unwrap();
    fs.close(fd).unwrap();
    assert_eq!(fs.close(fd), Err(Error::AlreadyClosed));

    let fd = fs.open("a").unwrap();
    fs.write(fd, b"abc").unwrap();
    assert_eq!(fs.file_size("a"), Ok(3));
}
