//! Random-access file handles
//!
//! The store only ever talks to its files through absolute offsets, so the
//! seam is a positioned read/write trait rather than `Read + Seek`. All
//! methods take `&self`; positioned I/O never moves a shared cursor.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// File operations needed by the store components
pub trait StorageFile: Send + Sync + Sized {
    /// Current length in bytes
    fn len(&self) -> io::Result<u64>;

    /// Read up to `buf.len()` bytes at `offset`, returning the count read
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Write all of `buf` at `offset`, extending the file if needed
    fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()>;

    /// Truncate or extend to exactly `len` bytes
    fn set_len(&self, len: u64) -> io::Result<()>;

    /// Flush to stable storage; `metadata` also flushes file metadata
    fn sync(&self, metadata: bool) -> io::Result<()>;

    /// Create an empty sibling file for temporary data
    fn scratch(&self) -> io::Result<Self>;

    /// Close and delete a file created by `scratch`
    fn discard(self) -> io::Result<()>;

    /// Path used in error messages and logs
    fn path(&self) -> &Path;

    /// Fill `buf` completely from `offset` or fail with `UnexpectedEof`
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "unexpected end of {} at offset {}",
                            self.path().display(),
                            offset
                        ),
                    ))
                }
                Ok(n) => {
                    let rest = buf;
                    buf = &mut rest[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// `len() == 0`
    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }
}

// =============================================================================
// DiskFile
// =============================================================================

/// A regular file opened read-write
#[derive(Debug)]
pub struct DiskFile {
    path: PathBuf,
    file: File,
}

impl DiskFile {
    /// Open `path` read-write, creating it if missing
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Open `path` read-write, discarding any existing content
    pub fn create_empty(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }
}

impl StorageFile for DiskFile {
    fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(&self.file, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(&self.file, buf, offset)
    }

    #[cfg(unix)]
    fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::write_all_at(&self.file, buf, offset)
    }

    #[cfg(windows)]
    fn write_all_at(&self, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match std::os::windows::fs::FileExt::seek_write(&self.file, buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    ))
                }
                Ok(n) => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn sync(&self, metadata: bool) -> io::Result<()> {
        if metadata {
            self.file.sync_all()
        } else {
            self.file.sync_data()
        }
    }

    fn scratch(&self) -> io::Result<Self> {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let scratch_path = self.path.with_file_name(format!("rehash_{}", name));
        Self::create_empty(&scratch_path)
    }

    fn discard(self) -> io::Result<()> {
        let DiskFile { path, file } = self;
        drop(file);
        fs::remove_file(path)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

// =============================================================================
// MemFile (tests only)
// =============================================================================

/// Growable in-memory file used by unit tests
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemFile {
    data: parking_lot::RwLock<Vec<u8>>,
    path: PathBuf,
}

#[cfg(test)]
impl MemFile {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            data: parking_lot::RwLock::new(Vec::new()),
            path: PathBuf::from(name),
        }
    }
}

#[cfg(test)]
impl StorageFile for MemFile {
    fn len(&self) -> io::Result<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let data = self.data.read();
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        let mut data = self.data.write();
        let end = offset as usize + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset as usize..end].copy_from_slice(buf);
        Ok(())
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        self.data.write().resize(len as usize, 0);
        Ok(())
    }

    fn sync(&self, _metadata: bool) -> io::Result<()> {
        Ok(())
    }

    fn scratch(&self) -> io::Result<Self> {
        Ok(Self::new("scratch"))
    }

    fn discard(self) -> io::Result<()> {
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
