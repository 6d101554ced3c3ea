//! Named shared-memory segments.
//!
//! A segment is a fixed-size byte region backed by a memory-mapped file in
//! the store's directory; its name is the file name. Any holder of the name
//! can [`attach`](SegmentStore::attach) to the same bytes.
//!
//! There is no locking: concurrent writers race and the last one wins, and a
//! reader may observe a write half done. That is the behaviour being modelled.

use crate::error::ChannelError;
use conduit_mmap::MmapFileMut;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory in which segments are created and looked up by name.
#[derive(Clone, Debug)]
pub struct SegmentStore {
    dir: PathBuf,
}

/// A segment together with the mapping its creator holds.
pub struct SharedSegment {
    name: String,
    handle: SegmentHandle,
}

/// One attachment to a segment. Dropping it detaches.
#[derive(Debug)]
pub struct SegmentHandle {
    name: String,
    map: MmapFileMut,
}

impl SegmentStore {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates a segment of `size` bytes under a fresh `ipcshm_xxxxxxxx` name.
    pub fn create(&self, size: usize) -> Result<SharedSegment, ChannelError> {
        loop {
            let name = format!("ipcshm_{:08x}", rand::random::<u32>());
            match self.create_named(&name, size) {
                Err(ChannelError::SegmentExists(_)) => continue,
                other => return other,
            }
        }
    }

    /// Creates a segment with a caller-chosen name.
    pub fn create_named(&self, name: &str, size: usize) -> Result<SharedSegment, ChannelError> {
        if size == 0 {
            return Err(ChannelError::InvalidSegmentSize(size));
        }
        let path = self.path_of(name)?;
        let map = MmapFileMut::create_rw(&path, size as u64).map_err(|source| {
            if source.kind() == io::ErrorKind::AlreadyExists {
                ChannelError::SegmentExists(name.to_string())
            } else {
                ChannelError::SegmentAttach {
                    name: name.to_string(),
                    source,
                }
            }
        })?;
        debug!(segment = name, size, "segment created");
        Ok(SharedSegment {
            name: name.to_string(),
            handle: SegmentHandle {
                name: name.to_string(),
                map,
            },
        })
    }

    /// Maps an existing segment by name.
    pub fn attach(&self, name: &str) -> Result<SegmentHandle, ChannelError> {
        let path = self.path_of(name)?;
        let map = MmapFileMut::open_rw(&path).map_err(|source| ChannelError::SegmentAttach {
            name: name.to_string(),
            source,
        })?;
        Ok(SegmentHandle {
            name: name.to_string(),
            map,
        })
    }

    /// Removes the segment's name so it can be created again.
    ///
    /// Existing attachments keep their mapping until dropped. Unlinking an
    /// unknown name is not an error.
    pub fn unlink(&self, name: &str) -> Result<(), ChannelError> {
        let path = self.path_of(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(segment = name, "segment unlinked");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ChannelError::SegmentAttach {
                name: name.to_string(),
                source,
            }),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_of(name).map(|p| p.exists()).unwrap_or(false)
    }

    fn path_of(&self, name: &str) -> Result<PathBuf, ChannelError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0']);
        if !valid {
            return Err(ChannelError::InvalidSegmentName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }
}

impl SharedSegment {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.handle.size()
    }

    pub fn handle(&mut self) -> &mut SegmentHandle {
        &mut self.handle
    }

    pub fn into_handle(self) -> SegmentHandle {
        self.handle
    }
}

impl SegmentHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.map.len()
    }

    /// Writes `payload` from offset 0, truncated to the segment size, and
    /// zero-pads the rest of the segment. Returns the bytes of payload written.
    pub fn write(&mut self, payload: &[u8]) -> usize {
        let buf = self.map.as_mut_slice();
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        buf[n..].fill(0);
        n
    }

    /// Copy of the whole segment as currently visible.
    pub fn read(&self) -> Vec<u8> {
        self.map.as_slice().to_vec()
    }

    /// Current contents with trailing zero padding removed.
    pub fn read_trimmed(&self) -> Vec<u8> {
        let mut bytes = self.read();
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        bytes.truncate(end);
        bytes
    }
}
