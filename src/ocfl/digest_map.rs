//! The digest map underpinning manifests and version states: a content
//! digest on one side, the set of paths carrying those bytes on the other.
//!
//! Insertion maintains the map's path-tree invariant — a path may not repeat
//! and may not nest at a `/` boundary inside another — so a fully constructed
//! map can never hold conflicting paths. Digest lookups are case insensitive,
//! and both digests and path sets iterate in sorted order, which keeps
//! serialized inventories deterministic.

use std::collections::{btree_map, BTreeMap, BTreeSet, HashMap};
use std::error;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::{DeserializeOwned, Error as SerdeError, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ocfl::digest::HexDigest;
use crate::ocfl::error::OcflError;

/// An insertion was rejected: the path was already present, or one of
/// `inserted` and `existing` nests inside the other. The two are equal when
/// the path was simply mapped twice.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PathConflict {
    pub inserted: String,
    pub existing: String,
}

#[derive(Debug, Clone)]
struct MapEntry<P> {
    path: Arc<P>,
    digest: Arc<HexDigest>,
}

/// A map from content digest to the unique, non-conflicting paths that hold
/// those bytes. A digest may have many paths; a path has exactly one digest.
#[derive(Debug, Clone)]
pub struct DigestMap<P>
where
    P: Ord + AsRef<str> + DeserializeOwned + Serialize,
{
    digest_to_paths: BTreeMap<Arc<HexDigest>, BTreeSet<Arc<P>>>,
    /// Keyed by the rendered path so ancestry checks can probe by string
    paths: HashMap<String, MapEntry<P>>,
    /// Every interior directory the paths imply, mapped to one path beneath it
    dirs: HashMap<String, String>,
}

/// The `/`-bounded prefixes of a path, shortest first
fn ancestors(path: &str) -> impl Iterator<Item = &str> + '_ {
    path.match_indices('/').map(move |(at, _)| &path[..at])
}

impl<P> DigestMap<P>
where
    P: Ord + AsRef<str> + DeserializeOwned + Serialize,
{
    pub fn new() -> Self {
        Self {
            digest_to_paths: BTreeMap::new(),
            paths: HashMap::new(),
            dirs: HashMap::new(),
        }
    }

    /// Maps a path to its digest. Fails without modifying the map if the path
    /// is already mapped, or if it conflicts with an existing path.
    pub fn insert(&mut self, digest: HexDigest, path: P) -> Result<(), PathConflict> {
        self.insert_rc(Arc::new(digest), Arc::new(path))
    }

    /// Same as `insert`, but it accepts refcounted values
    pub fn insert_rc(
        &mut self,
        digest: Arc<HexDigest>,
        path: Arc<P>,
    ) -> Result<(), PathConflict> {
        let key = (*path).as_ref().to_string();

        if self.paths.contains_key(&key) {
            return Err(PathConflict {
                inserted: key.clone(),
                existing: key,
            });
        }

        if let Some(nested) = self.dirs.get(&key) {
            return Err(PathConflict {
                inserted: key,
                existing: nested.clone(),
            });
        }

        for ancestor in ancestors(&key) {
            if self.paths.contains_key(ancestor) {
                return Err(PathConflict {
                    inserted: key.clone(),
                    existing: ancestor.to_string(),
                });
            }
        }

        for ancestor in ancestors(&key) {
            self.dirs
                .entry(ancestor.to_string())
                .or_insert_with(|| key.clone());
        }

        self.digest_to_paths
            .entry(digest.clone())
            .or_insert_with(BTreeSet::new)
            .insert(path.clone());
        self.paths.insert(key, MapEntry { path, digest });

        Ok(())
    }

    /// The digest a path is mapped to
    pub fn digest_for(&self, path: &P) -> Option<&Arc<HexDigest>> {
        self.paths.get(path.as_ref()).map(|entry| &entry.digest)
    }

    /// The paths mapped to a digest, sorted. Never empty when present.
    pub fn paths_for(&self, digest: &HexDigest) -> Option<&BTreeSet<Arc<P>>> {
        self.digest_to_paths.get(digest)
    }

    pub fn contains_digest(&self, digest: &HexDigest) -> bool {
        self.digest_to_paths.contains_key(digest)
    }

    pub fn contains_path(&self, path: &P) -> bool {
        self.paths.contains_key(path.as_ref())
    }

    /// The number of mapped paths
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Iterates over every path-digest pair, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<P>, &Arc<HexDigest>)> {
        self.paths.values().map(|entry| (&entry.path, &entry.digest))
    }

    /// Iterates over digest-paths pairs in digest order
    pub fn iter_digests(&self) -> btree_map::Iter<Arc<HexDigest>, BTreeSet<Arc<P>>> {
        self.digest_to_paths.iter()
    }
}

impl<P> Default for DigestMap<P>
where
    P: Ord + AsRef<str> + DeserializeOwned + Serialize,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PartialEq for DigestMap<P>
where
    P: Ord + AsRef<str> + DeserializeOwned + Serialize,
{
    fn eq(&self, other: &Self) -> bool {
        self.digest_to_paths == other.digest_to_paths
    }
}

impl<P> Eq for DigestMap<P> where P: Ord + AsRef<str> + DeserializeOwned + Serialize {}

impl Display for PathConflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.inserted == self.existing {
            write!(f, "path {} is mapped more than once", self.inserted)
        } else {
            write!(
                f,
                "path {} conflicts with path {}",
                self.inserted, self.existing
            )
        }
    }
}

impl error::Error for PathConflict {}

impl From<PathConflict> for OcflError {
    fn from(conflict: PathConflict) -> Self {
        OcflError::IllegalState(conflict.to_string())
    }
}

struct DigestMapVisitor<P>
where
    P: Ord + AsRef<str> + DeserializeOwned + Serialize,
{
    brand: PhantomData<P>,
}

impl<'a, P> Visitor<'a> for DigestMapVisitor<P>
where
    P: Ord + AsRef<str> + DeserializeOwned + Serialize,
{
    type Value = DigestMap<P>;

    fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter.write_str("a map of digests to paths")
    }

    fn visit_map<M: MapAccess<'a>>(self, mut access: M) -> Result<Self::Value, M::Error> {
        let mut map = DigestMap::new();

        while let Some((digest, paths)) = access.next_entry::<HexDigest, Vec<P>>()? {
            let digest = Arc::new(digest);
            for path in paths {
                map.insert_rc(digest.clone(), Arc::new(path))
                    .map_err(|conflict| M::Error::custom(conflict.to_string()))?;
            }
        }

        Ok(map)
    }
}

impl<'a, P> Deserialize<'a> for DigestMap<P>
where
    P: Ord + AsRef<str> + DeserializeOwned + Serialize,
{
    fn deserialize<D: Deserializer<'a>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(DigestMapVisitor {
            brand: Default::default(),
        })
    }
}

impl<P> Serialize for DigestMap<P>
where
    P: Ord + AsRef<str> + DeserializeOwned + Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.digest_to_paths.iter())
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryInto;

    use super::DigestMap;
    use crate::ocfl::types::LogicalPath;

    fn path(p: &str) -> LogicalPath {
        p.try_into().unwrap()
    }

    #[test]
    fn insert_and_retrieve() {
        let mut map = DigestMap::new();
        map.insert("abcd".into(), path("foo/bar")).unwrap();
        map.insert("efgh".into(), path("foo/baz")).unwrap();
        map.insert("abcd".into(), path("another")).unwrap();

        assert_eq!(3, map.len());
        assert_eq!("abcd", map.digest_for(&path("another")).unwrap().as_ref().as_ref());
        assert_eq!("efgh", map.digest_for(&path("foo/baz")).unwrap().as_ref().as_ref());
        assert_eq!(None, map.digest_for(&path("bogus")));

        let paths: Vec<&str> = map
            .paths_for(&"abcd".into())
            .unwrap()
            .iter()
            .map(|p| p.as_str())
            .collect();
        assert_eq!(vec!["another", "foo/bar"], paths);

        assert!(map.contains_digest(&"efgh".into()));
        assert!(map.contains_path(&path("foo/bar")));
        assert!(!map.contains_path(&path("bogus")));
    }

    #[test]
    fn digest_lookups_are_case_insensitive() {
        let mut map = DigestMap::new();
        map.insert("ABCD".into(), path("foo/bar")).unwrap();

        assert!(map.contains_digest(&"abcd".into()));
        assert!(map.contains_digest(&"ABCD".into()));
        assert!(map.paths_for(&"abcd".into()).is_some());
    }

    #[test]
    fn reject_duplicate_paths() {
        let mut map = DigestMap::new();
        map.insert("abcd".into(), path("foo/bar")).unwrap();

        let conflict = map.insert("efgh".into(), path("foo/bar")).unwrap_err();

        assert_eq!("foo/bar", conflict.inserted);
        assert_eq!("foo/bar", conflict.existing);
        // The failed insert did not disturb the original mapping
        assert_eq!("abcd", map.digest_for(&path("foo/bar")).unwrap().as_ref().as_ref());
    }

    #[test]
    fn reject_path_nested_under_a_file() {
        let mut map = DigestMap::new();
        map.insert("abcd".into(), path("a/file")).unwrap();

        let conflict = map
            .insert("efgh".into(), path("a/file/name.txt"))
            .unwrap_err();

        assert_eq!("a/file/name.txt", conflict.inserted);
        assert_eq!("a/file", conflict.existing);
    }

    #[test]
    fn reject_path_that_is_an_existing_directory() {
        let mut map = DigestMap::new();
        map.insert("abcd".into(), path("a/b/file.txt")).unwrap();

        let conflict = map.insert("efgh".into(), path("a/b")).unwrap_err();

        assert_eq!("a/b", conflict.inserted);
        assert_eq!("a/b/file.txt", conflict.existing);

        // Sibling names that merely share a prefix are fine
        map.insert("efgh".into(), path("a/bc")).unwrap();
    }

    #[test]
    fn serialization_is_sorted_and_round_trips() {
        let mut map = DigestMap::new();
        map.insert("bbbb".into(), path("z.txt")).unwrap();
        map.insert("aaaa".into(), path("b.txt")).unwrap();
        map.insert("aaaa".into(), path("a.txt")).unwrap();

        let json = serde_json::to_string(&map).unwrap();

        assert_eq!(r#"{"aaaa":["a.txt","b.txt"],"bbbb":["z.txt"]}"#, json);

        let value: DigestMap<LogicalPath> = serde_json::from_str(&json).unwrap();
        assert_eq!(map, value);
    }

    #[test]
    fn deserialization_rejects_conflicts() {
        let json = r#"{"aaaa":["a/file"],"bbbb":["a/file/nested.txt"]}"#;

        let result: Result<DigestMap<LogicalPath>, _> = serde_json::from_str(json);

        assert!(result.is_err());
    }

    #[test]
    fn serialize_empty() {
        let map: DigestMap<LogicalPath> = DigestMap::new();
        assert_eq!("{}", serde_json::to_string(&map).unwrap());
    }
}
