//! Read-only validation of a complete object root against the published
//! catalogue: structure, declaration, inventories, sidecars, and content.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;

use log::info;

use crate::ocfl::codes::{ErrorCode, WarnCode};
use crate::ocfl::consts::INVENTORY_FILE;
use crate::ocfl::digest::{DigestAlgorithm, HexDigest};
use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::fs::walk::{default_width, digest_files};
use crate::ocfl::fs::{Cancel, Fs, Listing};
use crate::ocfl::inventory::{parse_sidecar, Inventory};
use crate::ocfl::object::scan_object_root;
use crate::ocfl::paths;
use crate::ocfl::serde::parse_lenient;
use crate::ocfl::types::VersionNum;
use crate::ocfl::validate::ValidationResult;

/// Options controlling an object validation run
pub struct ValidateOptions {
    /// When false, content files are not digested
    pub fixity_check: bool,
    /// Worker pool width for content digesting; 0 means the CPU count
    pub width: usize,
    pub cancel: Cancel,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            fixity_check: true,
            width: 0,
            cancel: Cancel::new(),
        }
    }
}

/// Validates the object at `object_root` and reports every problem found.
/// `Err` is only returned for failures that prevented validation itself, such
/// as backend I/O errors or cancellation.
pub fn validate_object<F: Fs + ?Sized + 'static>(
    fs: Arc<F>,
    object_root: &str,
    options: &ValidateOptions,
) -> Result<ValidationResult> {
    let validator = ObjectValidator {
        fs,
        root: object_root.to_string(),
        fixity_check: options.fixity_check,
        width: if options.width == 0 {
            default_width()
        } else {
            options.width
        },
        cancel: options.cancel.clone(),
    };

    validator.validate()
}

struct ObjectValidator<F: Fs + ?Sized> {
    fs: Arc<F>,
    root: String,
    fixity_check: bool,
    width: usize,
    cancel: Cancel,
}

impl<F: Fs + ?Sized + 'static> ObjectValidator<F> {
    fn validate(&self) -> Result<ValidationResult> {
        let mut result = ValidationResult::new();

        let entries = self.fs.read_dir(&self.root)?;
        let root_state = scan_object_root(&entries);

        for name in &root_state.invalid {
            result.error(
                ErrorCode::E001,
                format!("Object root contains an unexpected entry: {}", name),
            );
        }

        for entry in &entries {
            if let Listing::Other(name) = entry {
                result.error(
                    ErrorCode::E090,
                    format!("Object root contains an irregular file: {}", name),
                );
            }
        }

        match root_state.spec {
            Some(spec) => self.validate_namaste(spec, &mut result)?,
            None => result.error(
                ErrorCode::E003,
                "Object version declaration does not exist".to_string(),
            ),
        }

        if !root_state.has_inventory {
            result.error(ErrorCode::E063, "Inventory does not exist".to_string());
        }

        let inventory = self.validate_root_inventory(
            root_state.sidecar_algorithm,
            root_state.has_inventory,
            &mut result,
        )?;

        if let Some(inventory) = &inventory {
            result.object_id = Some(inventory.id.clone());

            self.validate_version_dirs(inventory, &root_state.version_dirs, &mut result);
            self.validate_prior_inventories(inventory, &root_state.version_dirs, &mut result)?;
            self.validate_content(inventory, &root_state.version_dirs, &mut result)?;
        }

        info!(
            "Validated object at {}: {} errors, {} warnings",
            self.root,
            result.errors.len(),
            result.warnings.len()
        );

        Ok(result)
    }

    fn validate_namaste(&self, spec: crate::ocfl::spec::SpecVersion, result: &mut ValidationResult) -> Result<()> {
        let namaste = spec.object_namaste();

        match self.read_file(&paths::join(&self.root, namaste.filename))? {
            Some(bytes) => {
                if !namaste.is_valid_content(&bytes) {
                    result.error(
                        ErrorCode::E007,
                        format!(
                            "Object version declaration {} has invalid contents",
                            namaste.filename
                        ),
                    );
                }
            }
            None => result.error(
                ErrorCode::E003,
                "Object version declaration does not exist".to_string(),
            ),
        }

        Ok(())
    }

    /// Parses the root inventory leniently and verifies its sidecar
    fn validate_root_inventory(
        &self,
        sidecar_algorithm: Option<DigestAlgorithm>,
        has_inventory: bool,
        result: &mut ValidationResult,
    ) -> Result<Option<Inventory>> {
        if !has_inventory {
            return Ok(None);
        }

        let bytes = match self.read_file(&paths::inventory_path(&self.root))? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        let parsed = parse_lenient(&bytes);
        let inventory = parsed.inventory;
        result.extend(parsed.result);

        let algorithm = inventory
            .as_ref()
            .map(|inv| inv.digest_algorithm)
            .or(sidecar_algorithm);

        if let Some(algorithm) = algorithm {
            let digest = algorithm.hash_hex(&mut bytes.as_slice())?;
            self.validate_sidecar(&self.root, algorithm, &digest, None, result)?;
        }

        Ok(inventory)
    }

    /// Verifies `dir/inventory.json.<alg>` against the inventory digest
    fn validate_sidecar(
        &self,
        dir: &str,
        algorithm: DigestAlgorithm,
        digest: &HexDigest,
        version: Option<VersionNum>,
        result: &mut ValidationResult,
    ) -> Result<()> {
        let tag = version.map(|v| v.to_string());
        let sidecar_path = paths::sidecar_path(dir, algorithm);

        match self.read_file(&sidecar_path)? {
            Some(bytes) => match String::from_utf8(bytes) {
                Ok(contents) => match parse_sidecar(&contents) {
                    Ok(expected) => {
                        if expected != *digest {
                            push(result, tag, ErrorCode::E060, format!(
                                "Inventory does not match expected digest. Expected: {}; Actual: {}",
                                expected, digest
                            ));
                        }
                    }
                    Err(_) => push(
                        result,
                        tag,
                        ErrorCode::E061,
                        "Inventory sidecar is invalid".to_string(),
                    ),
                },
                Err(_) => push(
                    result,
                    tag,
                    ErrorCode::E061,
                    "Inventory sidecar is invalid".to_string(),
                ),
            },
            None => push(
                result,
                tag,
                ErrorCode::E058,
                format!("Inventory sidecar {} does not exist", sidecar_path),
            ),
        }

        Ok(())
    }

    /// The version directories on disk and the versions the inventory
    /// declares must line up exactly.
    fn validate_version_dirs(
        &self,
        inventory: &Inventory,
        version_dirs: &[VersionNum],
        result: &mut ValidationResult,
    ) {
        let on_disk: HashSet<VersionNum> = version_dirs.iter().copied().collect();

        for num in inventory.versions.keys() {
            if !on_disk.contains(num) {
                result.error(
                    ErrorCode::E010,
                    format!("Version directory {} is missing", num),
                );
            }
        }

        let declared: HashSet<&VersionNum> = inventory.versions.keys().collect();

        for num in version_dirs {
            if !declared.contains(num) {
                result.error(
                    ErrorCode::E046,
                    format!("Version directory {} is not listed in the inventory", num),
                );
            }
        }

        // E012 covers the directory names as well as the inventory keys
        if let Some(first) = version_dirs.first() {
            if version_dirs.iter().any(|num| num.width != first.width) {
                result.error(
                    ErrorCode::E012,
                    "Version directories do not use the same zero-padding".to_string(),
                );
            }
        }
    }

    /// Loads the inventory of every version directory that has one: the head
    /// copy must be identical to the root inventory (E064), prior copies must
    /// agree on all shared state (E066).
    fn validate_prior_inventories(
        &self,
        root_inventory: &Inventory,
        version_dirs: &[VersionNum],
        result: &mut ValidationResult,
    ) -> Result<()> {
        let root_bytes = match self.read_file(&paths::inventory_path(&self.root))? {
            Some(bytes) => bytes,
            None => return Ok(()),
        };

        for num in version_dirs {
            self.cancel.check()?;

            let tag = num.to_string();
            let version_path = paths::version_path(&self.root, *num);

            let bytes = match self.read_file(&paths::inventory_path(&version_path))? {
                Some(bytes) => bytes,
                None => {
                    result.warn_version(
                        tag,
                        WarnCode::W010,
                        "Version directory does not contain an inventory".to_string(),
                    );
                    continue;
                }
            };

            if *num == root_inventory.head {
                if bytes != root_bytes {
                    result.error_version(
                        tag.clone(),
                        ErrorCode::E064,
                        "The root inventory and the head version inventory are not identical"
                            .to_string(),
                    );
                }
            }

            let mut parsed = parse_lenient(&bytes);
            parsed.result.tag_version(&tag);

            let inventory = parsed.inventory;
            result.extend(parsed.result);

            let inventory = match inventory {
                Some(inventory) => inventory,
                None => continue,
            };

            let digest = inventory.digest_algorithm.hash_hex(&mut bytes.as_slice())?;
            self.validate_sidecar(
                &version_path,
                inventory.digest_algorithm,
                &digest,
                Some(*num),
                result,
            )?;

            self.cross_check(root_inventory, &inventory, *num, result);
        }

        Ok(())
    }

    fn cross_check(
        &self,
        root: &Inventory,
        prior: &Inventory,
        version_dir: VersionNum,
        result: &mut ValidationResult,
    ) {
        let tag = version_dir.to_string();

        // E037: the id must not change between versions
        if prior.id != root.id {
            result.error_version(
                tag.clone(),
                ErrorCode::E037,
                format!(
                    "The inventory declares id {}, which does not match the root inventory id {}",
                    prior.id, root.id
                ),
            );
        }

        for (num, prior_version) in &prior.versions {
            let root_version = match root.versions.get(num) {
                Some(version) => version,
                None => {
                    result.error_version(
                        tag.clone(),
                        ErrorCode::E066,
                        format!(
                            "The inventory declares version {}, which the root inventory does not",
                            num
                        ),
                    );
                    continue;
                }
            };

            if root_version.state() != prior_version.state() {
                result.error_version(
                    tag.clone(),
                    ErrorCode::E066,
                    format!(
                        "The state of version {} does not match the root inventory",
                        num
                    ),
                );
            }

            if root_version.created != prior_version.created
                || root_version.message != prior_version.message
                || root_version.user != prior_version.user
            {
                result.warn_version(
                    tag.clone(),
                    WarnCode::W011,
                    format!(
                        "The metadata of version {} does not match the root inventory",
                        num
                    ),
                );
            }
        }
    }

    /// Walks every version directory: no stray files beside the inventory, no
    /// empty directories, and the discovered content paths must equal the
    /// manifest exactly. Content digests are then verified concurrently.
    fn validate_content(
        &self,
        inventory: &Inventory,
        version_dirs: &[VersionNum],
        result: &mut ValidationResult,
    ) -> Result<()> {
        let content_dir = inventory.defaulted_content_dir();
        let sidecar_name = paths::sidecar_name(inventory.digest_algorithm);

        let mut on_disk: HashSet<String> = HashSet::new();

        for num in version_dirs {
            self.cancel.check()?;

            let tag = num.to_string();
            let version_path = paths::version_path(&self.root, *num);

            for entry in self.fs.read_dir(&version_path)? {
                match &entry {
                    Listing::File(name) => {
                        if name != INVENTORY_FILE && name.as_ref() != sidecar_name {
                            result.error_version(
                                tag.clone(),
                                ErrorCode::E015,
                                format!("Version directory contains an unexpected file: {}", name),
                            );
                        }
                    }
                    Listing::Directory(name) => {
                        if name == content_dir {
                            let root_relative = paths::join(&tag, content_dir);
                            self.walk_content(&root_relative, &tag, &mut on_disk, result)?;
                        } else {
                            result.warn_version(
                                tag.clone(),
                                WarnCode::W002,
                                format!(
                                    "Version directory contains an unexpected directory: {}",
                                    name
                                ),
                            );
                        }
                    }
                    Listing::Other(name) => {
                        result.error_version(
                            tag.clone(),
                            ErrorCode::E090,
                            format!("Version directory contains an irregular file: {}", name),
                        );
                    }
                }
            }
        }

        let mut in_manifest: HashMap<String, Arc<HexDigest>> = HashMap::new();
        for (path, digest) in inventory.manifest().iter() {
            in_manifest.insert(path.as_str().to_string(), digest.clone());
        }

        for path in &on_disk {
            if !in_manifest.contains_key(path) {
                result.error(
                    ErrorCode::E023,
                    format!("A content file is not referenced in the manifest: {}", path),
                );
            }
        }

        for path in in_manifest.keys() {
            if !on_disk.contains(path) {
                result.error(
                    ErrorCode::E023,
                    format!("A manifest entry does not exist on disk: {}", path),
                );
            }
        }

        if self.fixity_check {
            self.check_digests(inventory, &in_manifest, &on_disk, result)?;
        }

        Ok(())
    }

    /// Recursively walks a content directory, recording files and flagging
    /// empty directories
    fn walk_content(
        &self,
        dir: &str,
        tag: &str,
        on_disk: &mut HashSet<String>,
        result: &mut ValidationResult,
    ) -> Result<()> {
        let mut dirs = vec![dir.to_string()];
        let mut content_is_empty = true;

        while let Some(current) = dirs.pop() {
            self.cancel.check()?;

            let entries = self.fs.read_dir(&paths::join(&self.root, &current))?;

            if entries.is_empty() && current != dir {
                result.error_version(
                    tag.to_string(),
                    ErrorCode::E024,
                    format!("Content directory contains an empty directory: {}", current),
                );
            }

            for entry in entries {
                let child = paths::join(&current, entry.path());

                match entry {
                    Listing::File(_) => {
                        content_is_empty = false;
                        on_disk.insert(child);
                    }
                    Listing::Directory(_) => dirs.push(child),
                    Listing::Other(_) => {
                        result.error_version(
                            tag.to_string(),
                            ErrorCode::E090,
                            format!("Content directory contains an irregular file: {}", child),
                        );
                    }
                }
            }
        }

        if content_is_empty {
            result.warn_version(
                tag.to_string(),
                WarnCode::W003,
                "Content directory is empty".to_string(),
            );
        }

        Ok(())
    }

    /// Digests every manifest-listed file concurrently and confirms the
    /// primary digests (E092) and all fixity digests (E093)
    fn check_digests(
        &self,
        inventory: &Inventory,
        in_manifest: &HashMap<String, Arc<HexDigest>>,
        on_disk: &HashSet<String>,
        result: &mut ValidationResult,
    ) -> Result<()> {
        // path -> (algorithm, expected) from the fixity block
        let mut fixity_expected: HashMap<String, Vec<(DigestAlgorithm, HexDigest)>> =
            HashMap::new();
        let mut algorithms = vec![inventory.digest_algorithm];

        if let Some(fixity) = &inventory.fixity {
            for (algorithm, block) in fixity {
                let algorithm = match DigestAlgorithm::from_str(algorithm) {
                    Ok(algorithm) => algorithm,
                    Err(_) => continue,
                };

                if !algorithms.contains(&algorithm) {
                    algorithms.push(algorithm);
                }

                for (digest, block_paths) in block {
                    for path in block_paths {
                        fixity_expected
                            .entry(path.clone())
                            .or_default()
                            .push((algorithm, HexDigest::from(digest.as_str())));
                    }
                }
            }
        }

        let to_digest: Vec<String> = in_manifest
            .keys()
            .filter(|path| on_disk.contains(*path))
            .map(|path| paths::join(&self.root, path))
            .collect();

        let pipeline = digest_files(
            self.fs.clone(),
            to_digest,
            algorithms,
            self.width,
            &self.cancel,
        );

        for item in pipeline {
            self.cancel.check()?;

            let relative = item
                .path
                .strip_prefix(&format!("{}/", self.root))
                .unwrap_or(&item.path)
                .to_string();

            let digests = match item.result {
                Ok(digests) => digests,
                Err(e) => {
                    result.error(
                        ErrorCode::E092,
                        format!("Failed to digest {}: {}", relative, e),
                    );
                    continue;
                }
            };

            if let Some(expected) = in_manifest.get(&relative) {
                match digests.get(inventory.digest_algorithm) {
                    Some(actual) if actual == expected.as_ref() => (),
                    Some(actual) => result.error(
                        ErrorCode::E092,
                        format!(
                            "Content file {} does not match its manifest digest. Expected: {}; Actual: {}",
                            relative, expected, actual
                        ),
                    ),
                    None => (),
                }
            }

            if let Some(expected) = fixity_expected.get(&relative) {
                for (algorithm, expected) in expected {
                    match digests.get(*algorithm) {
                        Some(actual) if actual == expected => (),
                        Some(actual) => result.error(
                            ErrorCode::E093,
                            format!(
                                "Content file {} does not match its {} fixity digest. Expected: {}; Actual: {}",
                                relative, algorithm, expected, actual
                            ),
                        ),
                        None => (),
                    }
                }
            }
        }

        Ok(())
    }

    fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.fs.open_file(path) {
            Ok(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn push(result: &mut ValidationResult, tag: Option<String>, code: ErrorCode, message: String) {
    match tag {
        Some(tag) => result.error_version(tag, code, message),
        None => result.error(code, message),
    }
}
