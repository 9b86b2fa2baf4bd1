//! The object facade: opens an OCFL object, exposes its versions and files,
//! and creates update plans for new versions.

use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;

use log::info;

use crate::ocfl::commit::{build_update_plan, Stage, UpdateOptions, UpdatePlan};
use crate::ocfl::consts::{EXTENSIONS_DIR, INVENTORY_FILE, INVENTORY_SIDECAR_PREFIX, MAX_INVALID_ENTRIES};
use crate::ocfl::digest::{DigestAlgorithm, HexDigest};
use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::fs::{Listing, WriteFs};
use crate::ocfl::inventory::{read_inventory, Inventory, StoredInventory, Version};
use crate::ocfl::paths;
use crate::ocfl::spec::SpecVersion;
use crate::ocfl::types::{CommitMeta, ContentPath, Diff, LogicalPath, VersionNum, VersionRef};

/// What one pass over an object root's directory entries found
#[derive(Debug, Default)]
pub struct ObjectRootState {
    /// The spec version declared by the NAMASTE file, when exactly one exists
    pub spec: Option<SpecVersion>,
    pub has_inventory: bool,
    /// The algorithm named by the inventory sidecar, when exactly one exists
    pub sidecar_algorithm: Option<DigestAlgorithm>,
    pub has_extensions: bool,
    pub has_logs: bool,
    /// Version directories, sorted ascending
    pub version_dirs: Vec<VersionNum>,
    /// Unexpected entries, capped at [`MAX_INVALID_ENTRIES`] names
    pub invalid: Vec<String>,
    /// The full count of unexpected entries, including those past the cap
    pub invalid_count: usize,
}

impl ObjectRootState {
    /// True if the directory declares itself an OCFL object
    pub fn is_object(&self) -> bool {
        self.spec.is_some()
    }

    /// True if the root contains no unexpected entries
    pub fn is_valid(&self) -> bool {
        self.invalid_count == 0
    }

    fn record_invalid(&mut self, name: &str) {
        self.invalid_count += 1;
        if self.invalid.len() < MAX_INVALID_ENTRIES {
            self.invalid.push(name.to_string());
        }
    }
}

/// Derives the [`ObjectRootState`] from a directory's entries in one pass
pub fn scan_object_root(entries: &[Listing]) -> ObjectRootState {
    let mut state = ObjectRootState::default();

    for entry in entries {
        let name = entry.path();

        match entry {
            Listing::File(_) => {
                if let Some(spec) = SpecVersion::from_object_namaste(name) {
                    if state.spec.is_some() {
                        state.record_invalid(name);
                    } else {
                        state.spec = Some(spec);
                    }
                } else if name == INVENTORY_FILE {
                    state.has_inventory = true;
                } else if let Some(algorithm) = name.strip_prefix(INVENTORY_SIDECAR_PREFIX) {
                    match DigestAlgorithm::from_str(algorithm) {
                        Ok(algorithm) if state.sidecar_algorithm.is_none() => {
                            state.sidecar_algorithm = Some(algorithm);
                        }
                        _ => state.record_invalid(name),
                    }
                } else {
                    state.record_invalid(name);
                }
            }
            Listing::Directory(_) => {
                if name == EXTENSIONS_DIR {
                    state.has_extensions = true;
                } else if name == crate::ocfl::consts::LOGS_DIR {
                    state.has_logs = true;
                } else if let Ok(num) = VersionNum::try_from(name) {
                    state.version_dirs.push(num);
                } else {
                    state.record_invalid(name);
                }
            }
            // A declaration or sidecar that is a symlink is not accepted
            Listing::Other(_) => state.record_invalid(name),
        }
    }

    state.version_dirs.sort();

    state
}

/// Details about one file in a version
#[derive(Debug, Clone)]
pub struct FileDetails {
    pub logical_path: Arc<LogicalPath>,
    pub digest: Arc<HexDigest>,
    pub content_path: Arc<ContentPath>,
}

/// An opened OCFL object: a backend handle, the parsed and sidecar-verified
/// root inventory, and the scanned root state.
pub struct Object {
    fs: Arc<dyn WriteFs>,
    root: String,
    stored: StoredInventory,
    root_state: ObjectRootState,
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("root", &self.root)
            .field("stored", &self.stored)
            .field("root_state", &self.root_state)
            .finish()
    }
}

impl Object {
    /// Opens the object at `root`, verifying the root inventory against its
    /// sidecar and cross-checking every prior version directory that carries
    /// its own inventory.
    pub fn open(fs: Arc<dyn WriteFs>, root: &str) -> Result<Object> {
        let entries = fs.read_dir(root)?;
        let root_state = scan_object_root(&entries);

        if !root_state.is_object() {
            return Err(OcflError::NotFound(format!(
                "No OCFL object declaration found at {}",
                root
            )));
        }

        let stored = read_inventory(fs.as_ref(), root)?;

        for version_dir in &root_state.version_dirs {
            if *version_dir == stored.inventory.head {
                continue;
            }

            let version_path = paths::version_path(root, *version_dir);

            match fs.open_file(&paths::inventory_path(&version_path)) {
                Ok(_) => (),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }

            let prior = read_inventory(fs.as_ref(), &version_path)?;
            cross_check_prior(&stored.inventory, &prior.inventory, *version_dir)?;
        }

        Ok(Object {
            fs,
            root: root.to_string(),
            stored,
            root_state,
        })
    }

    /// The object's id
    pub fn id(&self) -> &str {
        &self.stored.inventory.id
    }

    /// The object's head version number
    pub fn head(&self) -> VersionNum {
        self.stored.inventory.head
    }

    /// The spec version the root inventory declares
    pub fn spec(&self) -> Option<SpecVersion> {
        self.stored.inventory.spec_version()
    }

    /// The parsed root inventory
    pub fn inventory(&self) -> &Inventory {
        &self.stored.inventory
    }

    /// The scanned state of the object root directory
    pub fn root_state(&self) -> &ObjectRootState {
        &self.root_state
    }

    /// The object root path within the backend
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Returns the specified version; `0` and `VersionRef::Head` refer to the
    /// head version.
    pub fn version(&self, version: impl Into<VersionRef>) -> Result<&Version> {
        let num = version.into().resolve(self.head());
        self.stored.inventory.get_version(num)
    }

    /// Opens a logical file within the specified version for reading
    pub fn open_file(
        &self,
        logical_path: &LogicalPath,
        version: impl Into<VersionRef>,
    ) -> Result<Box<dyn Read + Send>> {
        let content_path = self
            .stored
            .inventory
            .content_path_for_logical_path(logical_path, version.into())?;

        self.fs
            .open_file(&paths::join(&self.root, content_path.as_str()))
    }

    /// Lists every logical file in the specified version, sorted by path
    pub fn files(&self, version: impl Into<VersionRef>) -> Result<Vec<FileDetails>> {
        let version = self.version(version)?;
        let mut files = Vec::with_capacity(version.state().len());

        for (logical_path, digest) in version.state_iter() {
            let content_path = self
                .stored
                .inventory
                .content_path_for_digest(digest, Some(logical_path))?;

            files.push(FileDetails {
                logical_path: logical_path.clone(),
                digest: digest.clone(),
                content_path: content_path.clone(),
            });
        }

        files.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));

        Ok(files)
    }

    /// Returns the changes `right` makes relative `left`. When `left` is
    /// None, the version before `right` is used.
    pub fn diff(&self, left: Option<VersionNum>, right: VersionNum) -> Result<Vec<Diff>> {
        self.stored.inventory.diff_versions(left, right)
    }

    /// Builds the plan that commits the staged content as this object's next
    /// version. Nothing is written until the plan is applied.
    pub fn new_update(
        &self,
        stage: &Stage,
        meta: CommitMeta,
        options: UpdateOptions,
    ) -> Result<UpdatePlan> {
        let mut builder = Inventory::next_version(&self.stored.inventory)
            .with_version(stage.state.clone(), stage.digest_algorithm)
            .with_meta(meta);

        if let Some(spec) = options.spec {
            builder = builder.with_spec(spec);
        }
        if let Some(content_path_fn) = options.content_path_fn {
            builder = builder.with_content_path_fn(content_path_fn);
        }
        if let Some(fixity) = &stage.fixity {
            builder = builder.with_fixity_source(fixity.as_ref());
        }

        let new_inventory = builder.finalize()?;

        info!(
            "Planning update of object {} to {}",
            self.id(),
            new_inventory.head
        );

        build_update_plan(
            self.fs.clone(),
            &self.root,
            Some(self.stored.clone()),
            new_inventory,
            stage.content.clone(),
            options.width,
        )
    }

    /// Builds the plan that creates a new object at `root` with the staged
    /// content as its first version. Nothing is written until the plan is
    /// applied.
    pub fn create(
        fs: Arc<dyn WriteFs>,
        root: &str,
        object_id: &str,
        stage: &Stage,
        meta: CommitMeta,
        options: UpdateOptions,
    ) -> Result<UpdatePlan> {
        crate::ocfl::validate::validate_object_id(object_id)?;

        match fs.read_dir(root) {
            Ok(entries) if !entries.is_empty() => {
                return Err(OcflError::IllegalState(format!(
                    "Cannot create object {} because {} is not empty",
                    object_id, root
                )));
            }
            Ok(_) => (),
            Err(e) if e.is_not_found() => (),
            Err(e) => return Err(e),
        }

        let mut builder = Inventory::builder()
            .with_id(object_id)
            .with_version(stage.state.clone(), stage.digest_algorithm)
            .with_meta(meta)
            .with_padding(options.padding);

        if let Some(spec) = options.spec {
            builder = builder.with_spec(spec);
        }
        if let Some(content_directory) = &options.content_directory {
            builder = builder.with_content_directory(content_directory);
        }
        if let Some(content_path_fn) = options.content_path_fn {
            builder = builder.with_content_path_fn(content_path_fn);
        }
        if let Some(fixity) = &stage.fixity {
            builder = builder.with_fixity_source(fixity.as_ref());
        }

        let new_inventory = builder.finalize()?;

        info!("Planning creation of object {} at {}", object_id, root);

        build_update_plan(
            fs,
            root,
            None,
            new_inventory,
            stage.content.clone(),
            options.width,
        )
    }
}

/// A prior version directory's inventory must agree with the root inventory:
/// its head cannot exceed the root's, and every version it declares must have
/// an identical state in the root inventory.
fn cross_check_prior(
    root: &Inventory,
    prior: &Inventory,
    version_dir: VersionNum,
) -> Result<()> {
    if prior.id != root.id {
        return Err(OcflError::CorruptObject {
            object_id: root.id.clone(),
            message: format!(
                "The inventory in {} declares id {}, which does not match the root inventory",
                version_dir, prior.id
            ),
        });
    }

    if prior.head > root.head {
        return Err(OcflError::CorruptObject {
            object_id: root.id.clone(),
            message: format!(
                "The inventory in {} declares head {}, which is beyond the root head {}",
                version_dir, prior.head, root.head
            ),
        });
    }

    for (num, prior_version) in &prior.versions {
        let root_version = root.versions.get(num).ok_or_else(|| OcflError::CorruptObject {
            object_id: root.id.clone(),
            message: format!(
                "The inventory in {} declares version {}, which the root inventory does not",
                version_dir, num
            ),
        })?;

        if root_version.state() != prior_version.state() {
            return Err(OcflError::CorruptObject {
                object_id: root.id.clone(),
                message: format!(
                    "The state of version {} in the {} inventory does not match the root inventory",
                    num, version_dir
                ),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::scan_object_root;
    use crate::ocfl::digest::DigestAlgorithm;
    use crate::ocfl::fs::Listing;
    use crate::ocfl::spec::SpecVersion;

    #[test]
    fn scan_complete_root() {
        let entries = vec![
            Listing::file("0=ocfl_object_1.1"),
            Listing::file("inventory.json"),
            Listing::file("inventory.json.sha512"),
            Listing::dir("v1"),
            Listing::dir("v2"),
            Listing::dir("extensions"),
            Listing::dir("logs"),
        ];

        let state = scan_object_root(&entries);

        assert_eq!(Some(SpecVersion::Ocfl1_1), state.spec);
        assert!(state.has_inventory);
        assert_eq!(Some(DigestAlgorithm::Sha512), state.sidecar_algorithm);
        assert!(state.has_extensions);
        assert!(state.has_logs);
        assert_eq!(2, state.version_dirs.len());
        assert!(state.is_valid());
        assert!(state.is_object());
    }

    #[test]
    fn scan_records_unexpected_entries() {
        let entries = vec![
            Listing::file("0=ocfl_object_1.0"),
            Listing::file("inventory.json"),
            Listing::file("inventory.json.sha512"),
            Listing::file("inventory.json.sha256"),
            Listing::file("stray.txt"),
            Listing::dir("not-a-version"),
        ];

        let state = scan_object_root(&entries);

        assert_eq!(Some(SpecVersion::Ocfl1_0), state.spec);
        // First sidecar wins, the second is recorded as invalid
        assert_eq!(Some(DigestAlgorithm::Sha512), state.sidecar_algorithm);
        assert_eq!(3, state.invalid_count);
        assert!(!state.is_valid());
    }

    #[test]
    fn symlinked_declaration_is_invalid() {
        let entries = vec![Listing::Other("0=ocfl_object_1.1".into())];

        let state = scan_object_root(&entries);

        assert!(!state.is_object());
        assert_eq!(1, state.invalid_count);
    }

    #[test]
    fn duplicate_declaration_is_invalid() {
        let entries = vec![
            Listing::file("0=ocfl_object_1.0"),
            Listing::file("0=ocfl_object_1.1"),
        ];

        let state = scan_object_root(&entries);

        assert_eq!(Some(SpecVersion::Ocfl1_0), state.spec);
        assert_eq!(1, state.invalid_count);
    }

    #[test]
    fn invalid_entries_are_capped() {
        let mut entries = vec![Listing::file("0=ocfl_object_1.1")];
        let names: Vec<String> = (0..20).map(|i| format!("stray-{}.txt", i)).collect();
        for name in &names {
            entries.push(Listing::file(name));
        }

        let state = scan_object_root(&entries);

        assert_eq!(20, state.invalid_count);
        assert_eq!(8, state.invalid.len());
        assert!(!state.is_valid());
    }
}
