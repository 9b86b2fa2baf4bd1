//! Inventory parsing. The raw layer tolerates structurally damaged documents
//! so that validation can report every coded problem it finds; the strict
//! entry point refuses any document with fatal problems.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::convert::TryFrom;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Deserialize;

use crate::ocfl::codes::ErrorCode;
use crate::ocfl::digest::{DigestAlgorithm, HexDigest};
use crate::ocfl::digest_map::DigestMap;
use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::inventory::Inventory;
use crate::ocfl::types::{ContentPath, LogicalPath, User, VersionNum};
use crate::ocfl::validate::{validate_inventory_structure, ValidationResult};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawInventory {
    id: Option<String>,
    #[serde(rename = "type")]
    type_declaration: Option<String>,
    digest_algorithm: Option<String>,
    head: Option<String>,
    content_directory: Option<String>,
    manifest: Option<BTreeMap<String, Vec<String>>>,
    versions: Option<BTreeMap<String, RawVersion>>,
    fixity: Option<BTreeMap<String, BTreeMap<String, Vec<String>>>>,
    #[serde(flatten)]
    unknown: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawVersion {
    created: Option<String>,
    state: Option<BTreeMap<String, Vec<String>>>,
    message: Option<String>,
    user: Option<RawUser>,
}

#[derive(Deserialize, Debug)]
struct RawUser {
    name: Option<String>,
    address: Option<String>,
}

/// The outcome of a lenient parse: the inventory is only present when no
/// fatal problems were found.
pub(crate) struct ParsedInventory {
    pub inventory: Option<Inventory>,
    pub result: ValidationResult,
}

/// Shares one allocation per distinct digest and logical path across the
/// manifest and every version state.
#[derive(Default)]
struct DigestsAndPaths {
    digests: HashMap<String, Arc<HexDigest>>,
    paths: HashMap<String, Arc<LogicalPath>>,
}

impl DigestsAndPaths {
    fn insert_digest(&mut self, digest: &str) -> Arc<HexDigest> {
        self.digests
            .entry(digest.to_string())
            .or_insert_with(|| Arc::new(digest.into()))
            .clone()
    }

    fn insert_path(&mut self, path: &str) -> Result<Arc<LogicalPath>> {
        match self.paths.entry(path.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(vacant) => {
                let path_rc = Arc::new(LogicalPath::try_from(path)?);
                vacant.insert(path_rc.clone());
                Ok(path_rc)
            }
        }
    }
}

/// Parses inventory bytes, refusing documents with any fatal problem
pub fn parse_inventory(bytes: &[u8]) -> Result<Inventory> {
    let parsed = parse_lenient(bytes);

    match parsed.inventory {
        Some(inventory) => Ok(inventory),
        None => {
            let detail = parsed
                .result
                .errors
                .iter()
                .map(|e| format!("[{}] {}", e.code, e.text))
                .collect::<Vec<_>>()
                .join("; ");
            Err(OcflError::General(format!(
                "Inventory is invalid: {}",
                detail
            )))
        }
    }
}

/// Parses inventory bytes, accumulating every coded problem found
pub(crate) fn parse_lenient(bytes: &[u8]) -> ParsedInventory {
    let mut result = ValidationResult::new();

    let raw: RawInventory = match serde_json::from_slice(bytes) {
        Ok(raw) => raw,
        Err(e) => {
            result.error(
                ErrorCode::E033,
                format!("Inventory could not be parsed: {}", e),
            );
            return ParsedInventory {
                inventory: None,
                result,
            };
        }
    };

    let inventory = build_inventory(raw, &mut result);

    ParsedInventory { inventory, result }
}

fn build_inventory(raw: RawInventory, result: &mut ValidationResult) -> Option<Inventory> {
    let mut data = DigestsAndPaths::default();

    let id = require(raw.id, "id", ErrorCode::E036, result);
    let type_declaration = require(raw.type_declaration, "type", ErrorCode::E036, result);

    let digest_algorithm = match require(raw.digest_algorithm, "digestAlgorithm", ErrorCode::E036, result)
    {
        Some(value) => match DigestAlgorithm::from_str(&value) {
            Ok(algorithm) => Some(algorithm),
            Err(_) => {
                result.error(
                    ErrorCode::E025,
                    format!("Inventory field 'digestAlgorithm' is not a known algorithm: {}", value),
                );
                None
            }
        },
        None => None,
    };

    let head = match require(raw.head, "head", ErrorCode::E036, result) {
        Some(value) => match VersionNum::try_from(value.as_str()) {
            Ok(num) => Some(num),
            Err(_) => {
                result.error(
                    ErrorCode::E040,
                    format!("Inventory field 'head' is not a valid version: {}", value),
                );
                None
            }
        },
        None => None,
    };

    let manifest = match raw.manifest {
        Some(manifest) => parse_manifest(manifest, &mut data, result),
        None => {
            result.error(
                ErrorCode::E041,
                "Inventory is missing field 'manifest'".to_string(),
            );
            None
        }
    };

    let versions = match raw.versions {
        Some(versions) => parse_versions(versions, &mut data, result),
        None => {
            result.error(
                ErrorCode::E041,
                "Inventory is missing field 'versions'".to_string(),
            );
            None
        }
    };

    if let Some(fixity) = &raw.fixity {
        for (algorithm, block) in fixity {
            let mut folded = HashMap::with_capacity(block.len());
            for digest in block.keys() {
                if let Some(existing) =
                    folded.insert(digest.to_ascii_lowercase(), digest.clone())
                {
                    result.error(
                        ErrorCode::E097,
                        format!(
                            "Fixity block for {} contains duplicated digest: {} and {}",
                            algorithm, existing, digest
                        ),
                    );
                }
            }
        }
    }

    if result.has_errors() {
        return None;
    }

    let inventory = Inventory::from_parts(
        id.unwrap(),
        type_declaration.unwrap(),
        digest_algorithm.unwrap(),
        head.unwrap(),
        raw.content_directory,
        manifest.unwrap(),
        versions.unwrap(),
        raw.fixity,
    );

    let unknown_keys: Vec<String> = raw.unknown.keys().cloned().collect();
    validate_inventory_structure(&inventory, &unknown_keys, result);

    if result.has_errors() {
        None
    } else {
        Some(inventory)
    }
}

fn require(
    value: Option<String>,
    field: &str,
    code: ErrorCode,
    result: &mut ValidationResult,
) -> Option<String> {
    if value.is_none() {
        result.error(code, format!("Inventory is missing field '{}'", field));
    }
    value
}

fn parse_manifest(
    raw: BTreeMap<String, Vec<String>>,
    data: &mut DigestsAndPaths,
    result: &mut ValidationResult,
) -> Option<DigestMap<ContentPath>> {
    let mut manifest = DigestMap::new();
    let mut failed = false;

    for (digest, paths) in raw {
        let digest_rc = data.insert_digest(&digest);

        // Distinct JSON keys folding to one digest
        if manifest.contains_digest(&digest_rc) {
            result.error(
                ErrorCode::E096,
                format!("Manifest contains duplicated digest: {}", digest),
            );
            failed = true;
            continue;
        }

        for path in paths {
            match ContentPath::try_from(path.as_str()) {
                Ok(parsed) => {
                    if let Err(conflict) = manifest.insert_rc(digest_rc.clone(), Arc::new(parsed))
                    {
                        result.error(ErrorCode::E101, format!("Manifest {}", conflict));
                        failed = true;
                    }
                }
                Err(_) => {
                    result.error(
                        content_path_code(&path),
                        format!("Manifest contains an invalid content path: {}", path),
                    );
                    failed = true;
                }
            }
        }
    }

    if failed {
        None
    } else {
        Some(manifest)
    }
}

fn parse_versions(
    raw: BTreeMap<String, RawVersion>,
    data: &mut DigestsAndPaths,
    result: &mut ValidationResult,
) -> Option<BTreeMap<VersionNum, crate::ocfl::inventory::Version>> {
    let mut versions = BTreeMap::new();
    let mut failed = false;

    for (key, version) in raw {
        let num = match VersionNum::try_from(key.as_str()) {
            Ok(num) => num,
            Err(_) => {
                result.error(
                    ErrorCode::E011,
                    format!("Inventory contains an invalid version number: {}", key),
                );
                failed = true;
                continue;
            }
        };

        match parse_version(version, &key, data, result) {
            Some(version) => {
                versions.insert(num, version);
            }
            None => failed = true,
        }
    }

    if failed {
        None
    } else {
        Some(versions)
    }
}

fn parse_version(
    raw: RawVersion,
    key: &str,
    data: &mut DigestsAndPaths,
    result: &mut ValidationResult,
) -> Option<crate::ocfl::inventory::Version> {
    let mut failed = false;

    let created: Option<DateTime<Local>> = match raw.created {
        Some(value) => match DateTime::parse_from_rfc3339(&value) {
            Ok(created) => Some(created.with_timezone(&Local)),
            Err(_) => {
                result.error_version(
                    key.to_string(),
                    ErrorCode::E049,
                    format!("Version field 'created' must be an RFC 3339 timestamp. Found: {}", value),
                );
                failed = true;
                None
            }
        },
        None => {
            result.error_version(
                key.to_string(),
                ErrorCode::E048,
                "Version is missing field 'created'".to_string(),
            );
            failed = true;
            None
        }
    };

    let state = match raw.state {
        Some(state) => {
            let mut map = DigestMap::new();

            for (digest, paths) in state {
                let digest_rc = data.insert_digest(&digest);

                // Distinct JSON keys folding to one digest
                if map.contains_digest(&digest_rc) {
                    result.error_version(
                        key.to_string(),
                        ErrorCode::E096,
                        format!("Version state contains duplicated digest: {}", digest),
                    );
                    failed = true;
                    continue;
                }

                for path in paths {
                    match data.insert_path(&path) {
                        Ok(parsed) => {
                            if let Err(conflict) = map.insert_rc(digest_rc.clone(), parsed) {
                                result.error_version(
                                    key.to_string(),
                                    ErrorCode::E095,
                                    format!("Version state {}", conflict),
                                );
                                failed = true;
                            }
                        }
                        Err(_) => {
                            result.error_version(
                                key.to_string(),
                                logical_path_code(&path),
                                format!("Version state contains an invalid path: {}", path),
                            );
                            failed = true;
                        }
                    }
                }
            }

            Some(map)
        }
        None => {
            result.error_version(
                key.to_string(),
                ErrorCode::E048,
                "Version is missing field 'state'".to_string(),
            );
            failed = true;
            None
        }
    };

    let user = raw.user.map(|user| User {
        name: user.name,
        address: user.address,
    });

    if failed {
        None
    } else {
        Some(crate::ocfl::inventory::Version::new(
            created.unwrap(),
            state.unwrap(),
            raw.message,
            user,
        ))
    }
}

fn logical_path_code(path: &str) -> ErrorCode {
    if path.starts_with('/') || path.ends_with('/') {
        ErrorCode::E053
    } else {
        ErrorCode::E052
    }
}

fn content_path_code(path: &str) -> ErrorCode {
    if path.starts_with('/') || path.ends_with('/') {
        ErrorCode::E100
    } else if path
        .split('/')
        .any(|part| part == "." || part == ".." || part.is_empty())
    {
        ErrorCode::E099
    } else {
        // Well formed but not rooted in a version directory
        ErrorCode::E042
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_inventory, parse_lenient};
    use crate::ocfl::codes::{ErrorCode, WarnCode};
    use crate::ocfl::digest::DigestAlgorithm;
    use crate::ocfl::types::VersionNum;

    fn base_inventory() -> serde_json::Value {
        json!({
            "id": "urn:example:obj",
            "type": "https://ocfl.io/1.1/spec/#inventory",
            "digestAlgorithm": "sha512",
            "head": "v2",
            "contentDirectory": "content",
            "manifest": {
                "fb0d38126bb990e2fd0edae87bf58e7a69e85a652b67cb9db30b32c138750377f6c3e1bb2f45588aeb0db1509f3562107f896b47d5b2c8972809e42e6bb68455": [
                    "v1/content/file1.txt"
                ],
                "ab0d38126bb990e2fd0edae87bf58e7a69e85a652b67cb9db30b32c138750377f6c3e1bb2f45588aeb0db1509f3562107f896b47d5b2c8972809e42e6bb68455": [
                    "v2/content/file2.txt"
                ]
            },
            "versions": {
                "v1": {
                    "created": "2021-09-05T20:36:50.923505656-05:00",
                    "message": "initial commit",
                    "state": {
                        "fb0d38126bb990e2fd0edae87bf58e7a69e85a652b67cb9db30b32c138750377f6c3e1bb2f45588aeb0db1509f3562107f896b47d5b2c8972809e42e6bb68455": [
                            "file1.txt"
                        ]
                    },
                    "user": {
                        "name": "Peter",
                        "address": "mailto:me@example.com"
                    }
                },
                "v2": {
                    "created": "2021-09-06T20:36:50.923505656-05:00",
                    "message": "update",
                    "state": {
                        "fb0d38126bb990e2fd0edae87bf58e7a69e85a652b67cb9db30b32c138750377f6c3e1bb2f45588aeb0db1509f3562107f896b47d5b2c8972809e42e6bb68455": [
                            "file1.txt"
                        ],
                        "ab0d38126bb990e2fd0edae87bf58e7a69e85a652b67cb9db30b32c138750377f6c3e1bb2f45588aeb0db1509f3562107f896b47d5b2c8972809e42e6bb68455": [
                            "file2.txt"
                        ]
                    },
                    "user": {
                        "name": "Peter",
                        "address": "mailto:me@example.com"
                    }
                }
            }
        })
    }

    #[test]
    fn parse_complete_inventory() {
        let bytes = base_inventory().to_string().into_bytes();

        let inventory = parse_inventory(&bytes).unwrap();

        assert_eq!("urn:example:obj", inventory.id);
        assert_eq!(DigestAlgorithm::Sha512, inventory.digest_algorithm);
        assert_eq!(VersionNum::new(2), inventory.head);
        assert_eq!(2, inventory.manifest().len());
        assert_eq!(2, inventory.versions.len());

        let v1 = inventory.get_version(VersionNum::new(1)).unwrap();
        assert_eq!("initial commit", v1.message.as_ref().unwrap());
        assert_eq!(
            "Peter",
            v1.user.as_ref().unwrap().name.as_ref().unwrap()
        );
    }

    #[test]
    fn reject_missing_required_fields() {
        let mut value = base_inventory();
        value.as_object_mut().unwrap().remove("digestAlgorithm");

        let parsed = parse_lenient(&value.to_string().into_bytes());

        assert!(parsed.inventory.is_none());
        assert!(parsed.result.has_error_code(ErrorCode::E036));
    }

    #[test]
    fn reject_state_digest_not_in_manifest() {
        let mut value = base_inventory();
        value["versions"]["v2"]["state"]
            .as_object_mut()
            .unwrap()
            .insert(
                "cc0d38126bb990e2fd0edae87bf58e7a69e85a652b67cb9db30b32c138750377f6c3e1bb2f45588aeb0db1509f3562107f896b47d5b2c8972809e42e6bb68455".to_string(),
                serde_json::json!(["file3.txt"]),
            );

        let parsed = parse_lenient(&value.to_string().into_bytes());

        assert!(parsed.inventory.is_none());
        assert!(parsed.result.has_error_code(ErrorCode::E050));
    }

    #[test]
    fn reject_manifest_prefix_conflict() {
        let mut value = base_inventory();
        value["manifest"].as_object_mut().unwrap().insert(
            "cc0d38126bb990e2fd0edae87bf58e7a69e85a652b67cb9db30b32c138750377f6c3e1bb2f45588aeb0db1509f3562107f896b47d5b2c8972809e42e6bb68455".to_string(),
            serde_json::json!(["v2/content/file2.txt/nested.txt"]),
        );

        let parsed = parse_lenient(&value.to_string().into_bytes());

        assert!(parsed.inventory.is_none());
        assert!(parsed.result.has_error_code(ErrorCode::E101));
    }

    #[test]
    fn reject_malformed_created() {
        let mut value = base_inventory();
        value["versions"]["v1"]["created"] = serde_json::json!("2021-09-05");

        let parsed = parse_lenient(&value.to_string().into_bytes());

        assert!(parsed.inventory.is_none());
        assert!(parsed.result.has_error_code(ErrorCode::E049));
    }

    #[test]
    fn missing_user_name_is_fatal() {
        let mut value = base_inventory();
        value["versions"]["v1"]["user"]
            .as_object_mut()
            .unwrap()
            .remove("name");

        let parsed = parse_lenient(&value.to_string().into_bytes());

        assert!(parsed.inventory.is_none());
        assert!(parsed.result.has_error_code(ErrorCode::E054));
    }

    #[test]
    fn unknown_top_level_key_is_fatal_in_1_1() {
        let mut value = base_inventory();
        value
            .as_object_mut()
            .unwrap()
            .insert("customField".to_string(), serde_json::json!(true));

        let parsed = parse_lenient(&value.to_string().into_bytes());

        assert!(parsed.inventory.is_none());
        assert!(parsed.result.has_error_code(ErrorCode::E102));
    }

    #[test]
    fn case_folded_manifest_digests_collide() {
        let mut value = base_inventory();
        let existing = "fb0d38126bb990e2fd0edae87bf58e7a69e85a652b67cb9db30b32c138750377f6c3e1bb2f45588aeb0db1509f3562107f896b47d5b2c8972809e42e6bb68455";
        value["manifest"].as_object_mut().unwrap().insert(
            existing.to_uppercase(),
            serde_json::json!(["v2/content/other.txt"]),
        );

        let parsed = parse_lenient(&value.to_string().into_bytes());

        assert!(parsed.inventory.is_none());
        assert!(parsed.result.has_error_code(ErrorCode::E096));
    }

    #[test]
    fn missing_message_is_a_warning() {
        let mut value = base_inventory();
        value["versions"]["v1"]
            .as_object_mut()
            .unwrap()
            .remove("message");

        let parsed = parse_lenient(&value.to_string().into_bytes());

        assert!(parsed.inventory.is_some());
        assert!(parsed.result.has_warn_code(WarnCode::W007));
    }
}
