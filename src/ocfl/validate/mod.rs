//! Validation report types and the inventory structural checks shared by the
//! strict loader and the full object validator.

use std::convert::TryFrom;

use uriparse::URI;

use crate::ocfl::codes::{ErrorCode, WarnCode};
use crate::ocfl::digest::DigestAlgorithm;
use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::inventory::Inventory;
use crate::ocfl::spec::SpecVersion;
use crate::ocfl::types::ContentPath;

mod object;

pub use self::object::{validate_object, ValidateOptions};

/// The outcome of validating one object: fatal errors and warnings, each
/// tagged with a code from the published catalogue.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub object_id: Option<String>,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

#[derive(Debug)]
pub struct ValidationError {
    /// The version the problem was found in; `None` means the object root
    pub version_num: Option<String>,
    pub code: ErrorCode,
    pub text: String,
}

#[derive(Debug)]
pub struct ValidationWarning {
    /// The version the problem was found in; `None` means the object root
    pub version_num: Option<String>,
    pub code: WarnCode,
    pub text: String,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(object_id: &str) -> Self {
        Self {
            object_id: Some(object_id.to_string()),
            ..Self::default()
        }
    }

    pub fn error(&mut self, code: ErrorCode, message: String) {
        self.errors.push(ValidationError::new(code, message));
    }

    pub fn warn(&mut self, code: WarnCode, message: String) {
        self.warnings.push(ValidationWarning::new(code, message));
    }

    pub fn error_version(&mut self, version_num: String, code: ErrorCode, message: String) {
        self.errors
            .push(ValidationError::with_version(version_num, code, message));
    }

    pub fn warn_version(&mut self, version_num: String, code: WarnCode, message: String) {
        self.warnings
            .push(ValidationWarning::with_version(version_num, code, message));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// True if a fatal with the specified code was reported
    pub fn has_error_code(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    /// True if a warning with the specified code was reported
    pub fn has_warn_code(&self, code: WarnCode) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }

    /// Folds another result's problems into this one
    pub fn extend(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Re-tags every untagged problem with the specified version
    pub(crate) fn tag_version(&mut self, version_num: &str) {
        for error in &mut self.errors {
            if error.version_num.is_none() {
                error.version_num = Some(version_num.to_string());
            }
        }
        for warning in &mut self.warnings {
            if warning.version_num.is_none() {
                warning.version_num = Some(version_num.to_string());
            }
        }
    }
}

impl ValidationError {
    pub fn new(code: ErrorCode, text: String) -> Self {
        Self {
            version_num: None,
            code,
            text,
        }
    }

    pub fn with_version(version_num: String, code: ErrorCode, text: String) -> Self {
        Self {
            version_num: Some(version_num),
            code,
            text,
        }
    }
}

impl ValidationWarning {
    pub fn new(code: WarnCode, text: String) -> Self {
        Self {
            version_num: None,
            code,
            text,
        }
    }

    pub fn with_version(version_num: String, code: WarnCode, text: String) -> Self {
        Self {
            version_num: Some(version_num),
            code,
            text,
        }
    }
}

pub fn validate_object_id(object_id: &str) -> Result<()> {
    if object_id.is_empty() {
        return Err(OcflError::InvalidValue(
            "Object IDs may not be blank".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_digest_algorithm(digest_algorithm: DigestAlgorithm) -> Result<()> {
    if !digest_algorithm.is_inventory_algorithm() {
        return Err(OcflError::InvalidValue(format!(
            "The inventory digest algorithm must be sha512 or sha256. Found: {}",
            digest_algorithm
        )));
    }
    Ok(())
}

pub fn validate_content_dir(content_dir: &str) -> Result<()> {
    if content_dir.eq(".") || content_dir.eq("..") || content_dir.contains('/') {
        return Err(OcflError::InvalidValue(format!(
            "The content directory cannot equal '.' or '..' and cannot contain a '/'. Found: {}",
            content_dir
        )));
    }
    Ok(())
}

/// Runs every cross-field invariant over a structurally complete inventory,
/// accumulating coded problems. `unknown_keys` are the unrecognised top-level
/// JSON keys observed at parse.
pub(crate) fn validate_inventory_structure(
    inventory: &Inventory,
    unknown_keys: &[String],
    result: &mut ValidationResult,
) {
    let spec = inventory.spec_version();

    if inventory.id.is_empty() {
        result.error(
            ErrorCode::E037,
            "Inventory field 'id' must not be empty".to_string(),
        );
    } else if URI::try_from(inventory.id.as_str()).is_err() {
        result.warn(
            WarnCode::W005,
            format!("Inventory field 'id' should be a URI. Found: {}", inventory.id),
        );
    }

    if spec.is_none() {
        result.error(
            ErrorCode::E038,
            format!(
                "Inventory field 'type' must be an OCFL inventory type URI. Found: {}",
                inventory.type_declaration
            ),
        );
    }

    if !inventory.digest_algorithm.is_inventory_algorithm() {
        result.error(
            ErrorCode::E025,
            format!(
                "Inventory field 'digestAlgorithm' must be sha512 or sha256. Found: {}",
                inventory.digest_algorithm
            ),
        );
    } else if inventory.digest_algorithm == DigestAlgorithm::Sha256 {
        result.warn(
            WarnCode::W004,
            "Inventory field 'digestAlgorithm' should be sha512".to_string(),
        );
    }

    if let Some(content_dir) = &inventory.content_directory {
        if content_dir.contains('/') {
            result.error(
                ErrorCode::E017,
                format!(
                    "Inventory field 'contentDirectory' cannot contain '/'. Found: {}",
                    content_dir
                ),
            );
        } else if content_dir == "." || content_dir == ".." {
            result.error(
                ErrorCode::E018,
                format!(
                    "Inventory field 'contentDirectory' cannot equal '{}'",
                    content_dir
                ),
            );
        }
    }

    validate_version_sequence(inventory, result);
    validate_versions(inventory, result);
    validate_manifest(inventory, result);
    validate_fixity(inventory, result);

    if !unknown_keys.is_empty() && spec >= Some(SpecVersion::Ocfl1_1) {
        result.error(
            ErrorCode::E102,
            format!(
                "Inventory contains unknown fields: {}",
                unknown_keys.join(", ")
            ),
        );
    }
}

fn validate_version_sequence(inventory: &Inventory, result: &mut ValidationResult) {
    if inventory.versions.is_empty() {
        result.error(
            ErrorCode::E008,
            "Inventory does not contain any versions".to_string(),
        );
        return;
    }

    let keys: Vec<_> = inventory.versions.keys().collect();

    if keys[0].number != 1 {
        result.error(
            ErrorCode::E009,
            format!("Inventory versions must begin at v1. Found: {}", keys[0]),
        );
    }

    for pair in keys.windows(2) {
        if pair[1].number != pair[0].number + 1 {
            result.error(
                ErrorCode::E010,
                format!(
                    "Inventory versions are not sequential. Found {} after {}",
                    pair[1], pair[0]
                ),
            );
        }
    }

    let width = keys[0].width;
    if keys.iter().any(|key| key.width != width) {
        result.error(
            ErrorCode::E012,
            "Inventory versions do not use the same zero-padding".to_string(),
        );
    }

    if width > 0 {
        result.warn(
            WarnCode::W001,
            "Inventory version numbers should not be zero-padded".to_string(),
        );
    }

    let max = *keys.last().unwrap();
    if inventory.head != *max {
        result.error(
            ErrorCode::E040,
            format!(
                "Inventory field 'head' must equal the highest version, {}. Found: {}",
                max, inventory.head
            ),
        );
    }
}

fn validate_versions(inventory: &Inventory, result: &mut ValidationResult) {
    for (num, version) in &inventory.versions {
        let tag = num.to_string();

        for (path, digest) in version.state_iter() {
            if !inventory.manifest().contains_digest(digest) {
                result.error_version(
                    tag.clone(),
                    ErrorCode::E050,
                    format!(
                        "State digest for {} is not present in the manifest: {}",
                        path, digest
                    ),
                );
            }
        }

        match &version.user {
            Some(user) => {
                match &user.name {
                    Some(_) => (),
                    None => result.error_version(
                        tag.clone(),
                        ErrorCode::E054,
                        "Version user is missing field 'name'".to_string(),
                    ),
                }
                match &user.address {
                    Some(address) => {
                        if URI::try_from(address.as_str()).is_err() {
                            result.warn_version(
                                tag.clone(),
                                WarnCode::W009,
                                format!("Version user address should be a URI. Found: {}", address),
                            );
                        }
                    }
                    None => result.warn_version(
                        tag.clone(),
                        WarnCode::W008,
                        "Version user is missing field 'address'".to_string(),
                    ),
                }
            }
            None => result.warn_version(
                tag.clone(),
                WarnCode::W007,
                "Version is missing field 'user'".to_string(),
            ),
        }

        if version.message.is_none() {
            result.warn_version(
                tag,
                WarnCode::W007,
                "Version is missing field 'message'".to_string(),
            );
        }
    }
}

/// Duplicate and prefix-conflicting paths (E095/E101) are rejected while the
/// maps are built, so only the version-directory shape is checked here.
fn validate_manifest(inventory: &Inventory, result: &mut ValidationResult) {
    let content_dir = inventory.defaulted_content_dir();

    for (path, _digest) in inventory.manifest().iter() {
        if !inventory.versions.contains_key(&path.version) {
            result.error(
                ErrorCode::E042,
                format!(
                    "Manifest path {} is not inside a declared version directory",
                    path
                ),
            );
            continue;
        }

        let mut parts = path.parts();
        parts.next();
        if parts.next() != Some(content_dir) {
            result.error(
                ErrorCode::E042,
                format!(
                    "Manifest path {} is not inside the '{}' content directory",
                    path, content_dir
                ),
            );
        }
    }
}

fn validate_fixity(inventory: &Inventory, result: &mut ValidationResult) {
    let fixity = match &inventory.fixity {
        Some(fixity) => fixity,
        None => return,
    };

    for (algorithm, block) in fixity {
        if algorithm.parse::<DigestAlgorithm>().is_err() {
            result.warn(
                WarnCode::W006,
                format!("Fixity block uses an unregistered algorithm: {}", algorithm),
            );
        }

        for paths in block.values() {
            for path in paths {
                let known = ContentPath::try_from(path.as_str())
                    .map(|path| inventory.manifest().contains_path(&path))
                    .unwrap_or(false);

                if !known {
                    result.error(
                        ErrorCode::E057,
                        format!(
                            "Fixity block for {} references a path that is not in the manifest: {}",
                            algorithm, path
                        ),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryInto;

    use chrono::Local;

    use super::{validate_inventory_structure, ValidationResult};
    use crate::ocfl::digest_map::DigestMap;
    use crate::ocfl::codes::{ErrorCode, WarnCode};
    use crate::ocfl::consts::INVENTORY_TYPE_1_1;
    use crate::ocfl::digest::DigestAlgorithm;
    use crate::ocfl::inventory::{Inventory, Version};
    use crate::ocfl::types::VersionNum;

    fn minimal_inventory(head: &str, versions: Vec<(&str, &str, &str)>) -> Inventory {
        // versions: (version key, state digest, logical path)
        let mut manifest = DigestMap::new();
        let mut version_map = std::collections::BTreeMap::new();

        for (num, digest, logical) in &versions {
            let num: VersionNum = (*num).try_into().unwrap();
            let mut state = DigestMap::new();
            state
                .insert((*digest).into(), (*logical).try_into().unwrap())
                .unwrap();

            let content: String = format!("{}/content/{}", num, logical);
            manifest
                .insert((*digest).into(), content.try_into().unwrap())
                .unwrap();

            version_map.insert(num, Version::new(Local::now(), state, None, None));
        }

        Inventory::from_parts(
            "urn:example:obj".to_string(),
            INVENTORY_TYPE_1_1.to_string(),
            DigestAlgorithm::Sha512,
            head.try_into().unwrap(),
            None,
            manifest,
            version_map,
            None,
        )
    }

    #[test]
    fn accept_minimal_inventory() {
        let inventory = minimal_inventory("v1", vec![("v1", "abc1", "file.txt")]);
        let mut result = ValidationResult::new();

        validate_inventory_structure(&inventory, &[], &mut result);

        assert!(!result.has_errors(), "{:?}", result.errors);
        // missing message/user warnings only
        assert!(result.has_warn_code(WarnCode::W007));
    }

    #[test]
    fn detect_noncontiguous_versions() {
        let inventory = minimal_inventory(
            "v3",
            vec![("v1", "a1", "f1.txt"), ("v3", "a3", "f3.txt")],
        );
        let mut result = ValidationResult::new();

        validate_inventory_structure(&inventory, &[], &mut result);

        assert!(result.has_error_code(ErrorCode::E010));
    }

    #[test]
    fn detect_head_not_highest() {
        let inventory = minimal_inventory(
            "v1",
            vec![("v1", "a1", "f1.txt"), ("v2", "a2", "f2.txt")],
        );
        let mut result = ValidationResult::new();

        validate_inventory_structure(&inventory, &[], &mut result);

        assert!(result.has_error_code(ErrorCode::E040));
    }

    #[test]
    fn detect_state_digest_missing_from_manifest() {
        let mut inventory = minimal_inventory("v1", vec![("v1", "a1", "f1.txt")]);

        let mut state = DigestMap::new();
        state
            .insert("not-in-manifest".into(), "f1.txt".try_into().unwrap())
            .unwrap();
        inventory.versions.insert(
            "v1".try_into().unwrap(),
            Version::new(Local::now(), state, None, None),
        );

        let mut result = ValidationResult::new();
        validate_inventory_structure(&inventory, &[], &mut result);

        assert!(result.has_error_code(ErrorCode::E050));
    }

    #[test]
    fn detect_mixed_padding() {
        let mut inventory = minimal_inventory("v1", vec![("v1", "a1", "f1.txt")]);

        let mut state = DigestMap::new();
        state
            .insert("a1".into(), "f1.txt".try_into().unwrap())
            .unwrap();
        inventory.versions.insert(
            "v0002".try_into().unwrap(),
            Version::new(Local::now(), state, None, None),
        );
        inventory.head = "v0002".try_into().unwrap();

        let mut result = ValidationResult::new();
        validate_inventory_structure(&inventory, &[], &mut result);

        assert!(result.has_error_code(ErrorCode::E012));
    }

    #[test]
    fn detect_unknown_keys_in_1_1() {
        let inventory = minimal_inventory("v1", vec![("v1", "a1", "f1.txt")]);
        let mut result = ValidationResult::new();

        validate_inventory_structure(&inventory, &["bogus".to_string()], &mut result);

        assert!(result.has_error_code(ErrorCode::E102));
    }

    #[test]
    fn zero_padding_is_a_warning() {
        let inventory = minimal_inventory("v0001", vec![("v0001", "a1", "f1.txt")]);
        let mut result = ValidationResult::new();

        validate_inventory_structure(&inventory, &[], &mut result);

        assert!(!result.has_errors(), "{:?}", result.errors);
        assert!(result.has_warn_code(WarnCode::W001));
    }
}
