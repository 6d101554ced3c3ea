use memmap2::MmapMut;
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

/// A read-write mapping of a file, shared with every other mapping of the
/// same file.
///
/// Writes through one mapping become visible through all others without any
/// synchronization; the mapping offers no ordering guarantees between
/// processes or threads.
#[derive(Debug)]
pub struct MmapFileMut {
    _file: File,
    mmap: MmapMut,
}

impl MmapFileMut {
    /// Create a new file of `size_bytes` and map it read-write.
    ///
    /// Fails with `AlreadyExists` if the file is present, so two creators
    /// never silently share one region.
    pub fn create_rw<P: AsRef<Path>>(path: P, size_bytes: u64) -> io::Result<Self> {
        if size_bytes == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "mapping size must be non-zero",
            ));
        }
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;
        file.set_len(size_bytes)?;

        // SAFETY: the file was just created by us with the requested length.
        // Other mappings of it are expected to race; callers only copy bytes.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { _file: file, mmap })
    }

    /// Open an existing file and map it to read and write
    pub fn open_rw<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        // SAFETY: see `create_rw`; the region is plain bytes.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self { _file: file, mmap })
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_visible_through_other_mappings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg");
        let mut a = MmapFileMut::create_rw(&path, 16).unwrap();
        let b = MmapFileMut::open_rw(&path).unwrap();

        a.as_mut_slice()[..5].copy_from_slice(b"hello");
        assert_eq!(&b.as_slice()[..5], b"hello");
        assert_eq!(b.len(), 16);
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg");
        let _a = MmapFileMut::create_rw(&path, 8).unwrap();
        let err = MmapFileMut::create_rw(&path, 8).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn create_refuses_zero_size() {
        let dir = tempfile::tempdir().unwrap();
        let err = MmapFileMut::create_rw(dir.path().join("seg"), 0).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
