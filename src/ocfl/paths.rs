//! Helpers for constructing `/` separated paths within an object root.

use crate::ocfl::consts::*;
use crate::ocfl::digest::DigestAlgorithm;
use crate::ocfl::spec::SpecVersion;
use crate::ocfl::types::VersionNum;

/// Joins two string path parts, inserting a `/` if needed
pub fn join(part1: &str, part2: &str) -> String {
    let mut joined = match part1.ends_with('/') {
        true => part1[..part1.len() - 1].to_string(),
        false => part1.to_string(),
    };

    if !part2.is_empty() {
        if (!joined.is_empty() || part1 == "/") && !part2.starts_with('/') {
            joined.push('/');
        }
        joined.push_str(part2);
    }

    joined
}

/// Returns the path to `inventory.json` within the specified directory
pub fn inventory_path(dir: &str) -> String {
    join(dir, INVENTORY_FILE)
}

/// Returns the name of an inventory sidecar for the specified algorithm
pub fn sidecar_name(algorithm: DigestAlgorithm) -> String {
    format!("{}{}", INVENTORY_SIDECAR_PREFIX, algorithm)
}

/// Returns the path to `inventory.json.ALGO` within the specified directory
pub fn sidecar_path(dir: &str, algorithm: DigestAlgorithm) -> String {
    join(dir, &sidecar_name(algorithm))
}

/// Returns the path to an object's NAMASTE file
pub fn object_namaste_path(object_root: &str, version: SpecVersion) -> String {
    join(object_root, version.object_namaste().filename)
}

/// Returns the path to the version directory within the object root
pub fn version_path(object_root: &str, version_num: VersionNum) -> String {
    join(object_root, &version_num.to_string())
}

/// Returns the path to a version's content directory
pub fn content_dir_path(object_root: &str, version_num: VersionNum, content_dir: &str) -> String {
    join(&version_path(object_root, version_num), content_dir)
}

#[cfg(test)]
mod tests {
    use super::join;

    #[test]
    fn join_inserts_separator_as_needed() {
        assert_eq!("a/b", join("a", "b"));
        assert_eq!("a/b", join("a/", "b"));
        assert_eq!("a/b", join("a", "/b"));
        assert_eq!("b", join("", "b"));
        assert_eq!("a", join("a", ""));
        assert_eq!("/b", join("/", "b"));
    }
}
