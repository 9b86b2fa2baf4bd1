//! Minimal storage abstraction the core is written against. Backends only
//! need to provide streaming reads, single-level directory listings, and
//! recursive writes/removes using `/` separated paths.

use std::borrow::Cow;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ocfl::error::{OcflError, Result};

pub mod local;
pub mod walk;

pub use self::local::LocalFs;

/// Cloneable cancellation token. Long running operations check the token at
/// their loop and pool boundaries and stop promptly once it trips.
#[derive(Debug, Clone, Default)]
pub struct Cancel {
    flag: Arc<AtomicBool>,
}

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Returns `OcflError::Cancelled` if the token has tripped
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(OcflError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Read-only storage operations. `/` _must_ be used as the file path separator.
pub trait Fs: Send + Sync {
    /// Opens the file at the specified path for reading. Returns
    /// `OcflError::NotFound` if there is nothing at the path.
    fn open_file(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// Lists the immediate children of the specified directory. Returns
    /// `OcflError::NotFound` if the directory does not exist.
    fn read_dir(&self, path: &str) -> Result<Vec<Listing<'static>>>;

    /// The physical path of a file, when the backend is directly backed by the
    /// local filesystem. Enables copy fast-paths.
    fn local_path(&self, _path: &str) -> Option<PathBuf> {
        None
    }
}

/// Write operations layered over [`Fs`]
pub trait WriteFs: Fs {
    /// Streams the reader to the specified path, creating intermediate
    /// directories as needed, and returns the number of bytes written.
    fn write(&self, path: &str, reader: &mut (dyn Read + Send)) -> Result<u64>;

    /// Removes the file at the specified path. Does nothing if it does not exist.
    fn remove(&self, path: &str) -> Result<()>;

    /// Recursively removes the directory at the specified path. Does nothing
    /// if it does not exist.
    fn remove_all(&self, path: &str) -> Result<()>;

    /// Copies a file from another backend into this one. The default streams
    /// through memory; implementations are encouraged to use server-side
    /// copies where the backend offers them.
    fn copy(&self, dst: &str, src_fs: &dyn Fs, src_path: &str) -> Result<u64> {
        let mut reader = src_fs.open_file(src_path)?;
        self.write(dst, &mut reader)
    }
}

/// Represents a filesystem entity
#[derive(Debug, Hash, Eq, PartialEq, Clone)]
pub enum Listing<'a> {
    /// A regular file
    File(Cow<'a, str>),
    /// A directory
    Directory(Cow<'a, str>),
    /// Anything that is not a regular file or directory, eg a symbolic link
    Other(Cow<'a, str>),
}

impl<'a> Listing<'a> {
    pub fn file(path: &str) -> Listing {
        Listing::File(Cow::Borrowed(path))
    }

    pub fn dir(path: &str) -> Listing {
        Listing::Directory(Cow::Borrowed(path))
    }

    pub fn file_owned(path: String) -> Listing<'a> {
        Listing::File(Cow::Owned(path))
    }

    pub fn dir_owned(path: String) -> Listing<'a> {
        Listing::Directory(Cow::Owned(path))
    }

    pub fn path(&self) -> &str {
        match self {
            Listing::File(path) => path,
            Listing::Directory(path) => path,
            Listing::Other(path) => path,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Listing::File(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Listing::Directory(_))
    }
}

#[cfg(test)]
mod tests {
    use super::Cancel;

    #[test]
    fn cancel_token_trips_once() {
        let cancel = Cancel::new();
        let clone = cancel.clone();

        assert!(cancel.check().is_ok());
        assert!(!clone.is_cancelled());

        clone.cancel();

        assert!(cancel.is_cancelled());
        assert!(cancel.check().is_err());
    }
}
