use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, Local};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::ocfl::commit::FixitySource;
use crate::ocfl::consts::{DEFAULT_CONTENT_DIR, INVENTORY_FILE};
use crate::ocfl::digest::{DigestAlgorithm, HexDigest};
use crate::ocfl::digest_map::DigestMap;
use crate::ocfl::error::{not_found, OcflError, Result};
use crate::ocfl::fs::Fs;
use crate::ocfl::paths;
use crate::ocfl::spec::SpecVersion;
use crate::ocfl::types::{CommitMeta, ContentPath, Diff, LogicalPath, User, VersionNum, VersionRef};
use crate::ocfl::validate;

static SIDECAR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^([a-fA-F0-9]+)[\t ]+inventory\.json\n?$"#).unwrap());

/// Transforms the relative path a new content file is stored at within a
/// version's content directory. The identity mapping is used when unset.
pub type ContentPathFn = dyn Fn(&LogicalPath) -> Result<LogicalPath> + Send + Sync;

/// OCFL inventory serialization object
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub id: String,
    #[serde(rename = "type")]
    pub type_declaration: String,
    pub digest_algorithm: DigestAlgorithm,
    pub head: VersionNum,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_directory: Option<String>,
    manifest: DigestMap<ContentPath>,
    pub versions: BTreeMap<VersionNum, Version>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixity: Option<BTreeMap<String, BTreeMap<String, Vec<String>>>>,
}

/// OCFL version serialization object
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Version {
    pub created: DateTime<Local>,
    state: DigestMap<LogicalPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

/// An inventory plus the digest of the exact bytes it was read from or
/// written as. The sidecar pins this digest.
#[derive(Debug, Clone)]
pub struct StoredInventory {
    pub inventory: Inventory,
    pub digest: HexDigest,
    pub bytes: Vec<u8>,
}

impl StoredInventory {
    /// Parses inventory bytes and records their digest under the declared algorithm
    pub fn parse(bytes: Vec<u8>) -> Result<StoredInventory> {
        let inventory = crate::ocfl::serde::parse_inventory(&bytes)?;
        let digest = inventory
            .digest_algorithm
            .hash_hex(&mut bytes.as_slice())?;

        Ok(StoredInventory {
            inventory,
            digest,
            bytes,
        })
    }
}

/// Builds the inventory for the next version of an object
pub struct InventoryBuilder<'a> {
    prev: Option<&'a Inventory>,
    id: Option<String>,
    spec: Option<SpecVersion>,
    padding: u32,
    content_directory: Option<String>,
    digest_algorithm: Option<DigestAlgorithm>,
    state: Option<DigestMap<LogicalPath>>,
    meta: CommitMeta,
    content_path_fn: Option<Box<ContentPathFn>>,
    fixity_source: Option<&'a dyn FixitySource>,
}

impl Inventory {
    /// Returns a builder for an object's first version
    pub fn builder() -> InventoryBuilder<'static> {
        InventoryBuilder::new(None)
    }

    /// Returns a builder for the version following `prev`'s head
    pub fn next_version(prev: &Inventory) -> InventoryBuilder {
        InventoryBuilder::new(Some(prev))
    }

    /// Constructs an inventory, returning an error describing the first
    /// violated invariant if the fields are not structurally valid.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        type_declaration: String,
        digest_algorithm: DigestAlgorithm,
        head: VersionNum,
        content_directory: Option<String>,
        manifest: DigestMap<ContentPath>,
        versions: BTreeMap<VersionNum, Version>,
        fixity: Option<BTreeMap<String, BTreeMap<String, Vec<String>>>>,
    ) -> Result<Self> {
        let inventory = Self::from_parts(
            id,
            type_declaration,
            digest_algorithm,
            head,
            content_directory,
            manifest,
            versions,
            fixity,
        );

        let mut result = validate::ValidationResult::new();
        validate::validate_inventory_structure(&inventory, &[], &mut result);

        if result.has_errors() {
            let first = &result.errors[0];
            return Err(OcflError::CorruptObject {
                object_id: inventory.id,
                message: format!("[{}] {}", first.code, first.text),
            });
        }

        Ok(inventory)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: String,
        type_declaration: String,
        digest_algorithm: DigestAlgorithm,
        head: VersionNum,
        content_directory: Option<String>,
        manifest: DigestMap<ContentPath>,
        versions: BTreeMap<VersionNum, Version>,
        fixity: Option<BTreeMap<String, BTreeMap<String, Vec<String>>>>,
    ) -> Self {
        Self {
            id,
            type_declaration,
            digest_algorithm,
            head,
            content_directory,
            manifest,
            versions,
            fixity,
        }
    }

    /// The spec version the inventory's `type` declares, if recognised
    pub fn spec_version(&self) -> Option<SpecVersion> {
        SpecVersion::from_inventory_type(&self.type_declaration)
    }

    /// Returns true if the HEAD version is equal to 1
    pub fn is_new(&self) -> bool {
        self.head.number == 1
    }

    /// Returns a reference to the HEAD version
    pub fn head_version(&self) -> &Version {
        // The head version must exist or construction would have failed
        self.versions.get(&self.head).unwrap()
    }

    /// Returns a reference to the specified version or an error if it does not exist.
    pub fn get_version(&self, version_num: VersionNum) -> Result<&Version> {
        match self.versions.get(&version_num) {
            Some(v) => Ok(v),
            None => Err(not_found(&self.id, Some(version_num))),
        }
    }

    /// Returns a reference to the inventory's manifest
    pub fn manifest(&self) -> &DigestMap<ContentPath> {
        &self.manifest
    }

    /// Returns true if the path exists in the manifest
    pub fn contains_content_path(&self, content_path: &ContentPath) -> bool {
        self.manifest.contains_path(content_path)
    }

    /// Returns the first content path associated with the specified digest,
    /// or an error if it does not exist.
    ///
    /// If `logical_path` is specified and multiple content paths for the
    /// digest are found, then the path that maps directly to the logical path
    /// is selected, or the first otherwise.
    pub fn content_path_for_digest(
        &self,
        digest: &HexDigest,
        logical_path: Option<&LogicalPath>,
    ) -> Result<&Arc<ContentPath>> {
        match self.manifest.paths_for(digest) {
            Some(paths) => {
                if let Some(logical_path) = logical_path {
                    let suffix = format!(
                        "/{}/{}",
                        self.defaulted_content_dir(),
                        logical_path.as_str()
                    );
                    if let Some(path) = paths.iter().find(|path| path.as_str().ends_with(&suffix))
                    {
                        return Ok(path);
                    }
                }

                // A digest entry always carries at least one path
                Ok(paths.iter().next().unwrap())
            }
            None => Err(OcflError::CorruptObject {
                object_id: self.id.clone(),
                message: format!("Digest {} not found in manifest", digest),
            }),
        }
    }

    /// Returns the content path for the logical path, or a `NotFound` error if
    /// the path is not found in the specified version.
    pub fn content_path_for_logical_path(
        &self,
        logical_path: &LogicalPath,
        version_num: VersionRef,
    ) -> Result<&Arc<ContentPath>> {
        let version_num = version_num.resolve(self.head);
        let version = self.get_version(version_num)?;

        let digest = match version.lookup_digest(logical_path) {
            Some(digest) => digest.clone(),
            None => {
                return Err(OcflError::NotFound(format!(
                    "Path {} not found in object {} version {}",
                    logical_path, self.id, version_num
                )))
            }
        };

        self.content_path_for_digest(&digest, Some(logical_path))
    }

    /// Returns the diff of two versions. An error is returned if either of the
    /// specified versions does not exist. If `left` is None, then the diff is
    /// against the version immediately before `right`.
    pub fn diff_versions(&self, left: Option<VersionNum>, right: VersionNum) -> Result<Vec<Diff>> {
        if let Some(left) = left {
            if left == right {
                return Ok(Vec::new());
            }
        }

        let left = match left {
            Some(left) => Some(self.get_version(left)?),
            None => {
                if right.number > 1 {
                    Some(self.get_version(right.previous()?)?)
                } else {
                    None
                }
            }
        };

        Ok(self.get_version(right)?.diff(left))
    }

    pub fn defaulted_content_dir(&self) -> &str {
        match &self.content_directory {
            Some(dir) => dir.as_str(),
            None => DEFAULT_CONTENT_DIR,
        }
    }

    /// Serializes the inventory and returns the bytes along with their digest
    /// under the inventory's own algorithm.
    pub fn to_stored(&self) -> Result<StoredInventory> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');

        let digest = self.digest_algorithm.hash_hex(&mut bytes.as_slice())?;

        Ok(StoredInventory {
            inventory: self.clone(),
            digest,
            bytes,
        })
    }
}

impl Version {
    pub fn new(
        created: DateTime<Local>,
        state: DigestMap<LogicalPath>,
        message: Option<String>,
        user: Option<User>,
    ) -> Self {
        Self {
            created,
            state,
            message,
            user,
        }
    }

    /// Returns a reference to the version's state
    pub fn state(&self) -> &DigestMap<LogicalPath> {
        &self.state
    }

    /// Returns non-consuming iterator over the version's state
    pub fn state_iter(&self) -> impl Iterator<Item = (&Arc<LogicalPath>, &Arc<HexDigest>)> {
        self.state.iter()
    }

    /// Returns a reference to the digest associated to a logical path, or None
    /// if the logical path does not exist in the version's state.
    pub fn lookup_digest(&self, logical_path: &LogicalPath) -> Option<&Arc<HexDigest>> {
        self.state.digest_for(logical_path)
    }

    /// Returns true if the specified path exists as a logical file
    pub fn is_file(&self, path: &LogicalPath) -> bool {
        self.state.contains_path(path)
    }

    /// Computes a diff between the versions. This version is the right-hand
    /// version. If the other version is None, then all of this version's
    /// paths are returned as adds.
    pub fn diff(&self, other: Option<&Version>) -> Vec<Diff> {
        let mut diffs = Vec::new();
        let mut deletes: HashMap<Arc<HexDigest>, Vec<Arc<LogicalPath>>> = HashMap::new();

        if let Some(left) = other {
            let mut seen = HashSet::with_capacity(left.state.len());

            for (path, left_digest) in left.state_iter() {
                match self.lookup_digest(path) {
                    None => {
                        deletes
                            .entry(left_digest.clone())
                            .or_insert_with(Vec::new)
                            .push(path.clone());
                    }
                    Some(right_digest) => {
                        seen.insert(path.clone());
                        if left_digest != right_digest {
                            diffs.push(Diff::Modified(path.clone()))
                        }
                    }
                }
            }

            let mut renames: HashMap<Arc<HexDigest>, Diff> = HashMap::new();

            for (path, digest) in self.state_iter() {
                if seen.contains(path) {
                    continue;
                }

                if let Some(original) = deletes.remove(digest) {
                    let renamed = vec![path.clone()];
                    renames.insert(digest.clone(), Diff::Renamed { original, renamed });
                } else if let Some(Diff::Renamed {
                    original: _,
                    renamed,
                }) = renames.get_mut(digest)
                {
                    renamed.push(path.clone());
                } else {
                    diffs.push(Diff::Added(path.clone()));
                }
            }

            for (_digest, deletes) in deletes {
                for delete in deletes {
                    diffs.push(Diff::Deleted(delete));
                }
            }

            for (_digest, mut rename) in renames {
                if let Diff::Renamed { original, renamed } = &mut rename {
                    original.sort_unstable();
                    renamed.sort_unstable();
                }
                diffs.push(rename);
            }
        } else {
            for (path, _digest) in self.state_iter() {
                diffs.push(Diff::Added(path.clone()));
            }
        }

        diffs
    }
}

impl<'a> InventoryBuilder<'a> {
    fn new(prev: Option<&'a Inventory>) -> Self {
        Self {
            prev,
            id: None,
            spec: None,
            padding: 0,
            content_directory: None,
            digest_algorithm: None,
            state: None,
            meta: CommitMeta::new(),
            content_path_fn: None,
            fixity_source: None,
        }
    }

    /// Sets the object id. Required for the first version; must match the
    /// previous inventory otherwise.
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Sets the spec version of the new inventory. Defaults to the previous
    /// inventory's spec, or 1.1.
    pub fn with_spec(mut self, spec: SpecVersion) -> Self {
        self.spec = Some(spec);
        self
    }

    /// Sets the version-number padding width. Ignored when a previous
    /// inventory exists.
    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    /// Sets the content directory name. Ignored when a previous inventory
    /// exists.
    pub fn with_content_directory(mut self, content_directory: &str) -> Self {
        self.content_directory = Some(content_directory.to_string());
        self
    }

    /// Sets the state of the version to add and the digest algorithm its
    /// digests use. Required.
    pub fn with_version(
        mut self,
        state: DigestMap<LogicalPath>,
        digest_algorithm: DigestAlgorithm,
    ) -> Self {
        self.state = Some(state);
        self.digest_algorithm = Some(digest_algorithm);
        self
    }

    /// Sets the message, user, and timestamp of the version to add
    pub fn with_meta(mut self, meta: CommitMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Sets the transform applied to the content-directory-relative path of
    /// each newly added content file. The transform must preserve path
    /// legality and uniqueness; the builder re-checks the manifest after
    /// applying it.
    pub fn with_content_path_fn(mut self, content_path_fn: Box<ContentPathFn>) -> Self {
        self.content_path_fn = Some(content_path_fn);
        self
    }

    /// Sets the source of additional fixity digests for newly added content
    pub fn with_fixity_source(mut self, fixity_source: &'a dyn FixitySource) -> Self {
        self.fixity_source = Some(fixity_source);
        self
    }

    /// Builds the new inventory and validates all of its invariants
    pub fn finalize(self) -> Result<Inventory> {
        let state = self.state.ok_or_else(|| {
            OcflError::IllegalArgument("A new version state is required".to_string())
        })?;
        // Set together with the state in with_version
        let digest_algorithm = self.digest_algorithm.unwrap();

        let id = match (self.prev, self.id) {
            (Some(prev), Some(id)) if prev.id != id => {
                return Err(OcflError::IllegalArgument(format!(
                    "Object id {} does not match the existing object id {}",
                    id, prev.id
                )));
            }
            (Some(prev), _) => prev.id.clone(),
            (None, Some(id)) if !id.is_empty() => id,
            (None, _) => {
                return Err(OcflError::IllegalArgument(
                    "An object id is required for the first version".to_string(),
                ));
            }
        };

        if let Some(prev) = self.prev {
            if prev.digest_algorithm != digest_algorithm {
                return Err(OcflError::IllegalArgument(format!(
                    "The digest algorithm cannot change from {} to {}",
                    prev.digest_algorithm, digest_algorithm
                )));
            }
        }

        let spec = match self.spec {
            Some(spec) => spec,
            None => match self.prev.and_then(Inventory::spec_version) {
                Some(spec) => spec,
                None => SpecVersion::Ocfl1_1,
            },
        };

        let head = match self.prev {
            Some(prev) => prev.head.next()?,
            None => {
                if self.padding == 1 {
                    return Err(OcflError::IllegalArgument(
                        "Version padding width must be 0 or at least 2".to_string(),
                    ));
                }
                VersionNum::with_width(1, self.padding)
            }
        };

        // E019/E020: the content directory is pinned by the first version
        let content_directory = match self.prev {
            Some(prev) => {
                if self.content_directory.is_some() {
                    warn!(
                        "Ignoring the requested content directory; object {} already uses {}",
                        id,
                        prev.defaulted_content_dir()
                    );
                }
                prev.content_directory.clone()
            }
            None => {
                if let Some(dir) = &self.content_directory {
                    crate::ocfl::validate::validate_content_dir(dir)?;
                }
                self.content_directory
            }
        };
        let content_dir_name = content_directory.as_deref().unwrap_or(DEFAULT_CONTENT_DIR);

        let mut manifest = self
            .prev
            .map(|prev| prev.manifest.clone())
            .unwrap_or_default();

        // Digests not yet content-addressed get a path in the new version.
        // The map rejects any duplicate or conflicting path the transform
        // produces.
        let mut added: Vec<(Arc<HexDigest>, Arc<ContentPath>)> = Vec::new();

        let new_digests: Vec<(&Arc<HexDigest>, &BTreeSet<Arc<LogicalPath>>)> = state
            .iter_digests()
            .filter(|(digest, _)| !manifest.contains_digest(digest))
            .collect();

        for (digest, logical_paths) in new_digests {
            let logical_path: &LogicalPath = logical_paths.iter().next().unwrap();

            let inner_path = match &self.content_path_fn {
                Some(transform) => transform(logical_path)?,
                None => logical_path.clone(),
            };

            let content_path: Arc<ContentPath> =
                Arc::new(ContentPath::build(head, content_dir_name, inner_path.as_str())?);

            manifest.insert_rc(digest.clone(), content_path.clone())?;
            added.push((digest.clone(), content_path));
        }

        let mut fixity = self.prev.and_then(|prev| prev.fixity.clone());

        if let Some(source) = self.fixity_source {
            for (digest, content_path) in &added {
                for (algorithm, value) in source.fixity(digest) {
                    fixity
                        .get_or_insert_with(BTreeMap::new)
                        .entry(algorithm.to_string())
                        .or_insert_with(BTreeMap::new)
                        .entry(value.to_string())
                        .or_insert_with(Vec::new)
                        .push(content_path.as_str().to_string());
                }
            }
        }

        let mut versions = self
            .prev
            .map(|prev| prev.versions.clone())
            .unwrap_or_default();

        let user = match self.meta.user_name.clone() {
            Some(name) => Some(User::new(name, self.meta.user_address.clone())),
            None => None,
        };

        versions.insert(
            head,
            Version::new(
                self.meta.created.unwrap_or_else(Local::now),
                state,
                self.meta.message.clone(),
                user,
            ),
        );

        Inventory::new(
            id,
            spec.inventory_type().to_string(),
            digest_algorithm,
            head,
            content_directory,
            manifest,
            versions,
            fixity,
        )
    }
}

/// Reads `dir/inventory.json`, digests the exact bytes with the algorithm the
/// inventory declares, and verifies the digest against the sidecar.
pub fn read_inventory<F: Fs + ?Sized>(fs: &F, dir: &str) -> Result<StoredInventory> {
    let mut bytes = Vec::new();
    fs.open_file(&paths::inventory_path(dir))?
        .read_to_end(&mut bytes)?;

    let inventory = crate::ocfl::serde::parse_inventory(&bytes)?;

    let digest = inventory
        .digest_algorithm
        .hash_hex(&mut bytes.as_slice())?;

    let sidecar_path = paths::sidecar_path(dir, inventory.digest_algorithm);
    let mut sidecar = String::new();
    fs.open_file(&sidecar_path)?.read_to_string(&mut sidecar)?;

    let expected = parse_sidecar(&sidecar)?;

    if expected != digest {
        return Err(OcflError::CorruptObject {
            object_id: inventory.id.clone(),
            message: format!(
                "Inventory at {} does not match its sidecar digest. Expected: {}; Actual: {}",
                paths::inventory_path(dir),
                expected,
                digest
            ),
        });
    }

    Ok(StoredInventory {
        inventory,
        digest,
        bytes,
    })
}

/// Parses sidecar contents of the form `<digest> inventory.json`
pub fn parse_sidecar(contents: &str) -> Result<HexDigest> {
    match SIDECAR_REGEX.captures(contents) {
        Some(captures) => Ok(HexDigest::from(&captures[1])),
        None => Err(OcflError::InvalidValue(format!(
            "Inventory sidecar is invalid: {}",
            contents.trim_end()
        ))),
    }
}

/// Renders the sidecar line for an inventory digest
pub fn sidecar_line(digest: &HexDigest) -> String {
    format!("{}  {}\n", digest, INVENTORY_FILE)
}

#[cfg(test)]
mod tests {
    use std::convert::TryInto;

    use chrono::Local;

    use super::Inventory;
    use crate::ocfl::digest_map::DigestMap;
    use crate::ocfl::digest::DigestAlgorithm;
    use crate::ocfl::spec::SpecVersion;
    use crate::ocfl::types::{CommitMeta, LogicalPath};

    const DIGEST_A: &str = "7d865e959b2466918c9863afca942d0fb89d7c9ac0c99bafc3749504ded97730\
                            b4b47c9954e5bf6547eb2d49e16ef7776b3f779999e36dc1dd66c6148d6b31a7";
    const DIGEST_B: &str = "150a14ed5bea6cc731cf86c41566ac427a8db48ef1b9fd626664b3bfbb99071f\
                            a4c922f33dde38719b8c8354e2b7ab9d77e0e67fc12843920a712e73d558e197";

    fn state_one() -> DigestMap<LogicalPath> {
        let mut state = DigestMap::new();
        state
            .insert(DIGEST_A.into(), "hello.csv".try_into().unwrap())
            .unwrap();
        state
            .insert(DIGEST_B.into(), "folder/file.txt".try_into().unwrap())
            .unwrap();
        state
    }

    #[test]
    fn build_first_version() {
        let inventory = Inventory::builder()
            .with_id("urn:example:1")
            .with_version(state_one(), DigestAlgorithm::Sha512)
            .with_meta(
                CommitMeta::new()
                    .with_message(Some("first".to_string()))
                    .with_user(Some("Me".to_string()), None)
                    .unwrap(),
            )
            .finalize()
            .unwrap();

        assert_eq!("urn:example:1", inventory.id);
        assert_eq!(1, inventory.head.number);
        assert_eq!(SpecVersion::Ocfl1_1, inventory.spec_version().unwrap());
        assert_eq!(2, inventory.manifest().len());
        assert!(inventory
            .contains_content_path(&"v1/content/hello.csv".try_into().unwrap()));
        assert!(inventory
            .contains_content_path(&"v1/content/folder/file.txt".try_into().unwrap()));
    }

    #[test]
    fn second_version_reuses_manifest_entries() {
        let v1 = Inventory::builder()
            .with_id("urn:example:1")
            .with_version(state_one(), DigestAlgorithm::Sha512)
            .finalize()
            .unwrap();

        let mut state = DigestMap::new();
        state
            .insert(DIGEST_A.into(), "hello.csv".try_into().unwrap())
            .unwrap();
        state
            .insert(DIGEST_B.into(), "folder/renamed.txt".try_into().unwrap())
            .unwrap();

        let v2 = Inventory::next_version(&v1)
            .with_version(state, DigestAlgorithm::Sha512)
            .finalize()
            .unwrap();

        assert_eq!(2, v2.head.number);
        // No new bytes, no new content paths
        assert_eq!(2, v2.manifest().len());
        assert!(!v2.contains_content_path(&"v2/content/folder/renamed.txt".try_into().unwrap()));
    }

    #[test]
    fn first_version_requires_id() {
        let err = Inventory::builder()
            .with_version(state_one(), DigestAlgorithm::Sha512)
            .finalize()
            .unwrap_err();

        assert!(err.to_string().contains("id is required"));
    }

    #[test]
    fn padding_is_carried_from_first_version() {
        let v1 = Inventory::builder()
            .with_id("urn:example:1")
            .with_padding(4)
            .with_version(state_one(), DigestAlgorithm::Sha512)
            .finalize()
            .unwrap();

        assert_eq!("v0001", v1.head.to_string());

        let v2 = Inventory::next_version(&v1)
            .with_padding(0)
            .with_version(state_one(), DigestAlgorithm::Sha512)
            .finalize()
            .unwrap();

        assert_eq!("v0002", v2.head.to_string());
        assert!(v2
            .contains_content_path(&"v0001/content/hello.csv".try_into().unwrap()));
    }

    #[test]
    fn content_path_fn_transforms_new_entries() {
        let inventory = Inventory::builder()
            .with_id("urn:example:1")
            .with_version(state_one(), DigestAlgorithm::Sha512)
            .with_content_path_fn(Box::new(|logical| {
                logical.as_str().to_uppercase().try_into()
            }))
            .finalize()
            .unwrap();

        assert!(inventory
            .contains_content_path(&"v1/content/HELLO.CSV".try_into().unwrap()));
        assert!(inventory
            .contains_content_path(&"v1/content/FOLDER/FILE.TXT".try_into().unwrap()));
    }

    #[test]
    fn conflicting_transform_is_rejected() {
        let err = Inventory::builder()
            .with_id("urn:example:1")
            .with_version(state_one(), DigestAlgorithm::Sha512)
            .with_content_path_fn(Box::new(|logical| {
                // Maps one file to `data` and the other beneath it
                if logical.as_str() == "hello.csv" {
                    "data".try_into()
                } else {
                    "data/file.txt".try_into()
                }
            }))
            .finalize()
            .unwrap_err();

        assert!(err.to_string().contains("conflicts"));
    }

    #[test]
    fn sidecar_round_trip() {
        let digest = super::HexDigest::from("abc123");
        let line = super::sidecar_line(&digest);
        assert_eq!("abc123  inventory.json\n", line);
        assert_eq!(digest, super::parse_sidecar(&line).unwrap());

        assert!(super::parse_sidecar("abc123").is_err());
        assert!(super::parse_sidecar("xyz  inventory.json\n").is_err());
        assert!(super::parse_sidecar("abc123  other.json\n").is_err());
        // Trailing newline is optional on read
        assert!(super::parse_sidecar("abc123\tinventory.json").is_ok());
    }

    #[test]
    fn stored_inventory_digest_matches_bytes() {
        let inventory = Inventory::builder()
            .with_id("urn:example:1")
            .with_version(state_one(), DigestAlgorithm::Sha512)
            .finalize()
            .unwrap();

        let stored = inventory.to_stored().unwrap();

        let recomputed = DigestAlgorithm::Sha512
            .hash_hex(&mut stored.bytes.as_slice())
            .unwrap();
        assert_eq!(recomputed, stored.digest);

        let round_tripped = crate::ocfl::serde::parse_inventory(&stored.bytes).unwrap();
        assert_eq!(inventory, round_tripped);
    }

    #[test]
    fn transform_must_not_collide_paths() {
        let err = Inventory::builder()
            .with_id("urn:example:1")
            .with_version(state_one(), DigestAlgorithm::Sha512)
            .with_content_path_fn(Box::new(|_| "same.bin".try_into()))
            .finalize()
            .unwrap_err();

        // Two digests mapped to one content path leaves a dangling manifest entry
        assert!(matches!(
            err,
            crate::ocfl::error::OcflError::CorruptObject { .. }
                | crate::ocfl::error::OcflError::IllegalState(_)
        ));
    }
}
