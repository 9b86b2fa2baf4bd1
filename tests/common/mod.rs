#![allow(dead_code)]

use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, Local};
use ocfl_core::ocfl::{
    Cancel, CommitMeta, DigestAlgorithm, Fs, LocalFs, LogicalPath, Stage, WriteFs,
};
use tempfile::TempDir;

pub const HELLO_CSV: &str = "a,b\n1,2\n";
pub const HI_TXT: &str = "hi\n";

pub const HELLO_CSV_SHA512: &str =
    "94da1f1c8e1f26851d2fcb9772acafabb62f0b74eba26179a11c8a68c9c54b9379029aaf51ba3cdde4fe280b8a3825289ba4e8b93a23a4d201e6d910aa76f7e1";
pub const HI_TXT_SHA512: &str =
    "d78abb0542736865f94704521609c230dac03a2f369d043ac212d6933b91410e06399e37f9c5cc88436a31737330c1c8eccb2c2f9f374d62f716432a32d50fac";

pub fn new_fs() -> (TempDir, Arc<LocalFs>) {
    let _ = env_logger::builder().is_test(true).try_init();

    let temp = TempDir::new().unwrap();
    let fs = Arc::new(LocalFs::new(temp.path()).unwrap());
    (temp, fs)
}

/// Writes the files into `dir` and stages that directory
pub fn stage_files(fs: &Arc<LocalFs>, dir: &str, files: &[(&str, &str)]) -> Stage {
    stage_files_with_fixity(fs, dir, files, &[])
}

pub fn stage_files_with_fixity(
    fs: &Arc<LocalFs>,
    dir: &str,
    files: &[(&str, &str)],
    fixity_algorithms: &[DigestAlgorithm],
) -> Stage {
    for (path, content) in files {
        fs.write(&format!("{}/{}", dir, path), &mut content.as_bytes())
            .unwrap();
    }

    Stage::of_dir(
        fs.clone(),
        dir,
        DigestAlgorithm::Sha512,
        fixity_algorithms,
        2,
        &Cancel::new(),
    )
    .unwrap()
}

pub fn commit_meta(message: &str, created: &str) -> CommitMeta {
    CommitMeta::new()
        .with_user(
            Some("Stinky & Dirty".to_string()),
            Some("mailto:sd@example.org".to_string()),
        )
        .unwrap()
        .with_message(Some(message.to_string()))
        .with_created(Some(parse_time(created)))
}

pub fn parse_time(value: &str) -> DateTime<Local> {
    DateTime::parse_from_rfc3339(value)
        .unwrap()
        .with_timezone(&Local)
}

pub fn read_string(fs: &LocalFs, path: &str) -> String {
    let mut contents = String::new();
    fs.open_file(path)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    contents
}

pub fn read_bytes(fs: &LocalFs, path: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    fs.open_file(path)
        .unwrap()
        .read_to_end(&mut bytes)
        .unwrap();
    bytes
}

pub fn exists(fs: &LocalFs, path: &str) -> bool {
    fs.open_file(path).is_ok()
}

pub fn logical(path: &str) -> LogicalPath {
    path.try_into().unwrap()
}
