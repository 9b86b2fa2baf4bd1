//! Directory walking and concurrent file digesting over an [`Fs`] backend.

use std::io;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver};
use log::warn;

use crate::ocfl::digest::{DigestAlgorithm, DigestSet, MultiDigestWriter};
use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::fs::{Cancel, Fs, Listing};
use crate::ocfl::paths;

/// The default worker pool width
pub fn default_width() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Recursively lists every regular file under `dir`, returning paths relative
/// `dir`. Symbolic links and other irregular entries are rejected.
pub fn walk_files<F: Fs + ?Sized>(fs: &F, dir: &str, cancel: &Cancel) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut dirs = vec![String::new()];

    while let Some(relative) = dirs.pop() {
        cancel.check()?;

        for listing in fs.read_dir(&paths::join(dir, &relative))? {
            let child = paths::join(&relative, listing.path());

            match listing {
                Listing::File(_) => files.push(child),
                Listing::Directory(_) => dirs.push(child),
                Listing::Other(_) => {
                    return Err(OcflError::IllegalState(format!(
                        "{} is not a regular file or directory",
                        paths::join(dir, &child)
                    )));
                }
            }
        }
    }

    files.sort();

    Ok(files)
}

/// The digests of one file, or the error encountered computing them
pub struct FileDigests {
    pub path: String,
    pub result: Result<DigestSet>,
}

/// Lazy sequence of digest results produced by a bounded worker pool.
///
/// Results arrive in no particular order. The sequence is single-use: it holds
/// worker threads with open backend handles, and dropping it tears them down.
pub struct DigestPipeline {
    rx: Receiver<FileDigests>,
    pool_cancel: Cancel,
    handles: Vec<JoinHandle<()>>,
}

/// Digests every file in `files` with all of `algorithms` in a single pass
/// per file, using `width` worker threads. A failure digesting one file is
/// reported for that file alone; the pipeline keeps going.
pub fn digest_files<F: Fs + ?Sized + 'static>(
    fs: Arc<F>,
    files: Vec<String>,
    algorithms: Vec<DigestAlgorithm>,
    width: usize,
    cancel: &Cancel,
) -> DigestPipeline {
    let width = width.max(1);
    let (job_tx, job_rx) = unbounded::<String>();
    let (result_tx, result_rx) = unbounded();

    for path in files {
        // The receivers outlive this loop, send cannot fail
        let _ = job_tx.send(path);
    }
    drop(job_tx);

    let pool_cancel = Cancel::new();
    let mut handles = Vec::with_capacity(width);

    for _ in 0..width {
        let fs = fs.clone();
        let algorithms = algorithms.clone();
        let jobs = job_rx.clone();
        let results = result_tx.clone();
        let caller_cancel = cancel.clone();
        let pool_cancel = pool_cancel.clone();

        handles.push(thread::spawn(move || {
            while let Ok(path) = jobs.recv() {
                if caller_cancel.is_cancelled() || pool_cancel.is_cancelled() {
                    break;
                }

                let result = digest_one(fs.as_ref(), &path, &algorithms);

                if let Err(e) = &result {
                    warn!("Failed to digest {}: {}", path, e);
                }

                if results.send(FileDigests { path, result }).is_err() {
                    break;
                }
            }
        }));
    }

    DigestPipeline {
        rx: result_rx,
        pool_cancel,
        handles,
    }
}

fn digest_one<F: Fs + ?Sized>(fs: &F, path: &str, algorithms: &[DigestAlgorithm]) -> Result<DigestSet> {
    let mut reader = fs.open_file(path)?;
    let mut writer = MultiDigestWriter::new(algorithms, io::sink());

    io::copy(&mut reader, &mut writer)?;

    Ok(writer.finalize_hex())
}

impl Iterator for DigestPipeline {
    type Item = FileDigests;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

impl Drop for DigestPipeline {
    fn drop(&mut self) {
        self.pool_cancel.cancel();

        while self.rx.try_recv().is_ok() {}

        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::{digest_files, walk_files};
    use crate::ocfl::digest::DigestAlgorithm;
    use crate::ocfl::fs::{Cancel, LocalFs, WriteFs};

    #[test]
    fn walk_lists_files_recursively() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new(temp.path()).unwrap();

        fs.write("root/a.txt", &mut "1".as_bytes()).unwrap();
        fs.write("root/sub/b.txt", &mut "2".as_bytes()).unwrap();
        fs.write("root/sub/deep/c.txt", &mut "3".as_bytes())
            .unwrap();

        let files = walk_files(&fs, "root", &Cancel::new()).unwrap();

        assert_eq!(vec!["a.txt", "sub/b.txt", "sub/deep/c.txt"], files);
    }

    #[test]
    fn digest_pipeline_digests_all_files() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new(temp.path()).unwrap();

        fs.write("files/one.txt", &mut "testing\n".as_bytes())
            .unwrap();
        fs.write("files/two.txt", &mut "testing\n".as_bytes())
            .unwrap();
        fs.write("files/three.txt", &mut "other".as_bytes())
            .unwrap();

        let fs: Arc<LocalFs> = Arc::new(fs);

        let pipeline = digest_files(
            fs,
            vec![
                "files/one.txt".to_string(),
                "files/two.txt".to_string(),
                "files/three.txt".to_string(),
            ],
            vec![DigestAlgorithm::Sha512, DigestAlgorithm::Size],
            2,
            &Cancel::new(),
        );

        let mut results = HashMap::new();
        for item in pipeline {
            results.insert(item.path.clone(), item.result.unwrap());
        }

        assert_eq!(3, results.len());
        assert_eq!(
            results["files/one.txt"].get(DigestAlgorithm::Sha512),
            results["files/two.txt"].get(DigestAlgorithm::Sha512)
        );
        assert_eq!(
            "5",
            results["files/three.txt"]
                .get(DigestAlgorithm::Size)
                .unwrap()
                .to_string()
        );
    }

    #[test]
    fn digest_pipeline_reports_per_file_errors() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new(temp.path()).unwrap();

        fs.write("files/good.txt", &mut "ok".as_bytes()).unwrap();

        let fs: Arc<LocalFs> = Arc::new(fs);

        let pipeline = digest_files(
            fs,
            vec!["files/good.txt".to_string(), "files/gone.txt".to_string()],
            vec![DigestAlgorithm::Sha256],
            2,
            &Cancel::new(),
        );

        let results: Vec<_> = pipeline.collect();

        assert_eq!(2, results.len());
        assert_eq!(1, results.iter().filter(|r| r.result.is_ok()).count());
        assert_eq!(1, results.iter().filter(|r| r.result.is_err()).count());
    }

    #[test]
    fn cancelled_pipeline_drains_promptly() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new(temp.path()).unwrap();

        let mut files = Vec::new();
        for i in 0..100 {
            let path = format!("files/{}.txt", i);
            fs.write(&path, &mut "data".as_bytes()).unwrap();
            files.push(path);
        }

        let cancel = Cancel::new();
        cancel.cancel();

        let pipeline = digest_files(
            Arc::new(fs),
            files,
            vec![DigestAlgorithm::Sha512],
            4,
            &cancel,
        );

        // Workers bail before processing once the token is tripped
        let results: Vec<_> = pipeline.collect();
        assert!(results.is_empty());
    }
}
