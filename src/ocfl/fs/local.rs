//! Local filesystem storage backend.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::fs::{Fs, Listing, WriteFs};

/// Storage backend rooted at a directory on the local filesystem. All paths
/// are `/` separated and relative the root.
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// Creates a backend rooted at the specified directory, creating the
    /// directory if it does not exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            fs::create_dir_all(&root)?;
        } else if !root.is_dir() {
            return Err(OcflError::IllegalState(format!(
                "Storage root {} is not a directory",
                root.to_string_lossy()
            )));
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn join(&self, path: &str) -> PathBuf {
        let mut joined = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            joined.push(part);
        }
        joined
    }
}

impl Fs for LocalFs {
    fn open_file(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        match File::open(self.join(path)) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(OcflError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read_dir(&self, path: &str) -> Result<Vec<Listing<'static>>> {
        let dir = self.join(path);

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(OcflError::NotFound(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut listings = Vec::new();

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            // The entry's own type; symlinks are not followed
            let file_type = entry.file_type()?;

            let listing = if file_type.is_file() {
                Listing::file_owned(name)
            } else if file_type.is_dir() {
                Listing::dir_owned(name)
            } else {
                Listing::Other(name.into())
            };

            listings.push(listing);
        }

        listings.sort_by(|a, b| a.path().cmp(b.path()));

        Ok(listings)
    }

    fn local_path(&self, path: &str) -> Option<PathBuf> {
        Some(self.join(path))
    }
}

impl WriteFs for LocalFs {
    fn write(&self, path: &str, reader: &mut (dyn Read + Send)) -> Result<u64> {
        let target = self.join(path);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = File::create(&target)?;
        let written = io::copy(reader, &mut file)?;

        Ok(written)
    }

    fn remove(&self, path: &str) -> Result<()> {
        if let Err(e) = fs::remove_file(self.join(path)) {
            if e.kind() != ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn remove_all(&self, path: &str) -> Result<()> {
        let target = self.join(path);

        let result = match target.symlink_metadata() {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&target),
            Ok(_) => fs::remove_file(&target),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            if e.kind() != ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn copy(&self, dst: &str, src_fs: &dyn Fs, src_path: &str) -> Result<u64> {
        if let Some(src) = src_fs.local_path(src_path) {
            let target = self.join(dst);

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            match fs::copy(&src, &target) {
                Ok(written) => Ok(written),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    Err(OcflError::NotFound(src_path.to_string()))
                }
                Err(e) => Err(e.into()),
            }
        } else {
            let mut reader = src_fs.open_file(src_path)?;
            self.write(dst, &mut reader)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use tempfile::TempDir;

    use super::LocalFs;
    use crate::ocfl::fs::{Fs, Listing, WriteFs};

    #[test]
    fn write_read_round_trip() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new(temp.path()).unwrap();

        fs.write("a/b/file.txt", &mut "hello".as_bytes()).unwrap();

        let mut contents = String::new();
        fs.open_file("a/b/file.txt")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();

        assert_eq!("hello", contents);
    }

    #[test]
    fn open_missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new(temp.path()).unwrap();

        let err = match fs.open_file("nope.txt") {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(err.is_not_found());
    }

    #[test]
    fn removes_are_idempotent() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new(temp.path()).unwrap();

        fs.write("dir/file.txt", &mut "x".as_bytes()).unwrap();

        fs.remove("dir/file.txt").unwrap();
        fs.remove("dir/file.txt").unwrap();
        fs.remove_all("dir").unwrap();
        fs.remove_all("dir").unwrap();
    }

    #[test]
    fn list_directory_entries() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new(temp.path()).unwrap();

        fs.write("root/file.txt", &mut "x".as_bytes()).unwrap();
        fs.write("root/sub/other.txt", &mut "y".as_bytes()).unwrap();

        let listings = fs.read_dir("root").unwrap();

        assert_eq!(
            vec![Listing::file("file.txt"), Listing::dir("sub")],
            listings
        );

        assert!(fs.read_dir("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn copy_between_backends() {
        let src_temp = TempDir::new().unwrap();
        let dst_temp = TempDir::new().unwrap();
        let src = LocalFs::new(src_temp.path()).unwrap();
        let dst = LocalFs::new(dst_temp.path()).unwrap();

        src.write("data.bin", &mut "payload".as_bytes()).unwrap();

        let written = dst.copy("copied/data.bin", &src, "data.bin").unwrap();
        assert_eq!(7, written);

        let mut contents = String::new();
        dst.open_file("copied/data.bin")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!("payload", contents);
    }
}
