//! Flat backing file for evicted slots.
//!
//! The backing file is the durable tier of a store. It has no header and no
//! padding: sample `n` of a store with element width `W` lives at byte
//! offset `n * W`, whether or not its slot is still resident.
//!
//! # File Format
//!
//! ```text
//! [0..W)            sample 0
//! [W..2W)           sample 1
//! ...
//! [n*W..(n+1)*W)    sample n
//! ```
//!
//! Only slots that have been evicted are ever written, so the file is
//! sparse-by-prefix: it grows one whole slot at a time, in slot order.
//!
//! # Concurrency
//!
//! All I/O is positioned (`pread`/`pwrite` semantics), so eviction threads
//! and readers share one handle without a shared seek cursor. Writes and
//! reads never overlap: eviction only writes slots the writer has moved
//! past, and readers only read slots whose eviction has completed.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{BackingFileError, Result};
use crate::sample::{self, Sample};

/// Positioned-I/O handle on a store's backing file.
#[derive(Debug)]
pub struct BackingFile {
    /// The open file, created read/write.
    file: File,
    /// Path to the file (for error reporting and removal).
    path: PathBuf,
    /// Makes every write fail, for exercising eviction failures.
    #[cfg(test)]
    fail_writes: AtomicBool,
}

impl BackingFile {
    /// Creates the backing file at `path`, truncating any previous contents.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Returns [`BackingFileError::Create`] if the directory or the file
    /// cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| BackingFileError::Create {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| BackingFileError::Create {
                path: path.clone(),
                source: e,
            })?;

        Ok(Self {
            file,
            path,
            #[cfg(test)]
            fail_writes: AtomicBool::new(false),
        })
    }

    /// Writes `values` so that `values[0]` lands at sample `first`.
    ///
    /// # Errors
    ///
    /// Returns [`BackingFileError::WriteFailed`] if the write fails.
    pub fn write_samples<T: Sample>(&self, first: u64, values: &[T]) -> Result<()> {
        let offset = first * T::WIDTH as u64;
        let bytes = sample::encode_slice(values);
        self.write_at(&bytes, offset).map_err(|e| {
            BackingFileError::WriteFailed {
                path: self.path.clone(),
                offset,
                source: e,
            }
            .into()
        })
    }

    fn write_at(&self, bytes: &[u8], offset: u64) -> io::Result<()> {
        #[cfg(test)]
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(io::Error::other("injected write failure"));
        }
        positioned::write_all_at(&self.file, bytes, offset)
    }

    /// Makes subsequent writes fail (or succeed again).
    #[cfg(test)]
    pub(crate) fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::Relaxed);
    }

    /// Fills `out` with the samples starting at `first`.
    ///
    /// # Errors
    ///
    /// Returns [`BackingFileError::ReadFailed`] if the read fails or the file
    /// ends before `out` is filled.
    pub fn read_samples<T: Sample>(&self, first: u64, out: &mut [T]) -> Result<()> {
        let offset = first * T::WIDTH as u64;
        let mut bytes = vec![0u8; out.len() * T::WIDTH];
        positioned::read_exact_at(&self.file, &mut bytes, offset).map_err(|e| {
            BackingFileError::ReadFailed {
                path: self.path.clone(),
                offset,
                source: e,
            }
        })?;
        sample::decode_into(&bytes, out);
        Ok(())
    }

    /// Reads the single sample `n`.
    ///
    /// # Errors
    ///
    /// Returns [`BackingFileError::ReadFailed`] if the read fails.
    pub fn read_sample<T: Sample>(&self, n: u64) -> Result<T> {
        let mut out = [T::default()];
        self.read_samples(n, &mut out)?;
        Ok(out[0])
    }

    /// Forces written data to stable storage.
    ///
    /// # Errors
    ///
    /// Returns [`BackingFileError::SyncFailed`] if the sync operation fails.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data().map_err(|e| {
            BackingFileError::SyncFailed {
                path: self.path.clone(),
                source: e,
            }
            .into()
        })
    }

    /// Truncates the file to zero length.
    ///
    /// # Errors
    ///
    /// Returns [`BackingFileError::TruncateFailed`] if truncation fails.
    pub fn truncate(&self) -> Result<()> {
        self.file.set_len(0).map_err(|e| {
            BackingFileError::TruncateFailed {
                path: self.path.clone(),
                source: e,
            }
            .into()
        })
    }

    /// Deletes the file from disk.
    ///
    /// Handles that are still open keep working on platforms that allow
    /// unlinking open files, but the store refuses further reads once
    /// disposed.
    ///
    /// # Errors
    ///
    /// Returns [`BackingFileError::RemoveFailed`] if the file cannot be removed.
    pub fn remove(&self) -> Result<()> {
        fs::remove_file(&self.path).map_err(|e| {
            BackingFileError::RemoveFailed {
                path: self.path.clone(),
                source: e,
            }
            .into()
        })
    }

    /// Current file length in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BackingFileError::ReadFailed`] if metadata cannot be read.
    pub fn len_bytes(&self) -> Result<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| {
                BackingFileError::ReadFailed {
                    path: self.path.clone(),
                    offset: 0,
                    source: e,
                }
                .into()
            })
    }

    /// Returns the path to this backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
mod positioned {
    use std::fs::File;
    use std::io;
    use std::os::unix::fs::FileExt;

    pub(super) fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
        file.write_all_at(buf, offset)
    }

    pub(super) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
        file.read_exact_at(buf, offset)
    }
}

#[cfg(windows)]
mod positioned {
    use std::fs::File;
    use std::io;
    use std::os::windows::fs::FileExt;

    pub(super) fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match file.seek_write(buf, offset)? {
                0 => return Err(io::ErrorKind::WriteZero.into()),
                n => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }

    pub(super) fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match file.seek_read(buf, offset)? {
                0 => return Err(io::ErrorKind::UnexpectedEof.into()),
                n => {
                    buf = &mut std::mem::take(&mut buf)[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }
}
