//! The closed set of validation codes published by the OCFL specification.
//!
//! Code identifiers are a stable part of the public API. Consumers match on
//! them; the descriptions and spec links exist for reporting.

use strum_macros::Display as EnumDisplay;

use crate::ocfl::spec::SpecVersion;

/// OCFL validation error codes. `E065` does not exist in the published
/// catalogue and is intentionally absent.
#[derive(Debug, EnumDisplay, Copy, Clone, Eq, PartialEq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum ErrorCode {
    E001,
    E002,
    E003,
    E004,
    E005,
    E006,
    E007,
    E008,
    E009,
    E010,
    E011,
    E012,
    E013,
    E014,
    E015,
    E016,
    E017,
    E018,
    E019,
    E020,
    E021,
    E022,
    E023,
    E024,
    E025,
    E026,
    E027,
    E028,
    E029,
    E030,
    E031,
    E032,
    E033,
    E034,
    E035,
    E036,
    E037,
    E038,
    E039,
    E040,
    E041,
    E042,
    E043,
    E044,
    E045,
    E046,
    E047,
    E048,
    E049,
    E050,
    E051,
    E052,
    E053,
    E054,
    E055,
    E056,
    E057,
    E058,
    E059,
    E060,
    E061,
    E062,
    E063,
    E064,
    E066,
    E067,
    E068,
    E069,
    E070,
    E071,
    E072,
    E073,
    E074,
    E075,
    E076,
    E077,
    E078,
    E079,
    E080,
    E081,
    E082,
    E083,
    E084,
    E085,
    E086,
    E087,
    E088,
    E089,
    E090,
    E091,
    E092,
    E093,
    E094,
    E095,
    E096,
    E097,
    E098,
    E099,
    E100,
    E101,
    E102,
}

/// OCFL validation warning codes
#[derive(Debug, EnumDisplay, Copy, Clone, Eq, PartialEq, Hash)]
pub enum WarnCode {
    W001,
    W002,
    W003,
    W004,
    W005,
    W006,
    W007,
    W008,
    W009,
    W010,
    W011,
    W012,
    W013,
    W014,
    W015,
}

impl ErrorCode {
    /// The URL of the section of the spec the code refers to
    pub fn url(self, spec: SpecVersion) -> String {
        format!("{}#{}", spec.url(), self)
    }

    /// Human readable description from the published catalogue
    pub fn description(self) -> &'static str {
        use ErrorCode::*;
        match self {
            E001 => "The OCFL object root must not contain files or directories other than those specified",
            E002 => "The version declaration must be formatted according to the NAMASTE specification",
            E003 => "There must be exactly one version declaration file in the object root",
            E004 => "The version declaration filename must begin with '0=ocfl_object_'",
            E005 => "The version declaration filename must be '0=ocfl_object_' followed by the spec version number",
            E006 => "The version declaration filename must match the conformance declaration exactly",
            E007 => "The version declaration contents must be the filename minus the '0=' prefix, followed by a newline",
            E008 => "OCFL object content must be stored as a sequence of one or more versions",
            E009 => "The version number sequence must start at 1",
            E010 => "The version number sequence must be continuous without missing integers",
            E011 => "Version numbers must be positive integers, optionally zero-padded",
            E012 => "All version directories of an object must use the same zero-padding convention",
            E013 => "Operations that add a new version must follow the object's zero-padding convention",
            E014 => "References to files inside version directories must use the actual version directory names",
            E015 => "A version directory must contain no files other than the inventory and its sidecar",
            E016 => "Version directories must contain the designated content directory when the version has content",
            E017 => "The contentDirectory value must not contain the forward slash character",
            E018 => "The contentDirectory value must not be '.' or '..'",
            E019 => "If contentDirectory is set, it must be set in the first version's inventory",
            E020 => "The contentDirectory value must not change between versions",
            E021 => "If contentDirectory is unset, content must be stored in a directory named 'content'",
            E022 => "An empty content directory must not appear within a version directory",
            E023 => "Every file in a version's content directory must be referenced in the manifest, and every manifest content path must correspond to a file",
            E024 => "There must be no empty directories within a version's content directory",
            E025 => "OCFL inventories must use either sha512 or sha256 as the digest algorithm",
            E026 => "For content-addressing, OCFL objects must use either sha512 or sha256",
            E027 => "OCFL clients must support both sha512 and sha256",
            E028 => "Digest algorithm identifiers must come from the OCFL digest registry",
            E029 => "The SHA-1 algorithm must be referenced as 'sha1'",
            E030 => "The SHA-256 algorithm must be referenced as 'sha256'",
            E031 => "The SHA-512 algorithm must be referenced as 'sha512'",
            E032 => "The BLAKE2 algorithms must be referenced by their registered identifiers",
            E033 => "An OCFL inventory must be a valid JSON document",
            E034 => "An OCFL inventory must follow the structure described in the specification",
            E035 => "Inventory field values must use the JSON types the specification assigns to them",
            E036 => "An OCFL inventory must include the keys: id, type, digestAlgorithm, and head",
            E037 => "The 'id' value must not be empty and must not change between versions",
            E038 => "The 'type' value must be the inventory section URI of the declared spec version",
            E039 => "The 'digestAlgorithm' value must name the algorithm used in the manifest",
            E040 => "The 'head' value must be the version directory name with the highest version number",
            E041 => "An OCFL inventory must include the manifest and versions blocks",
            E042 => "Manifest content paths must be relative to the object root and begin with a version directory name",
            E043 => "An OCFL inventory must include a versions block",
            E044 => "The versions value must be a JSON object",
            E045 => "The versions block must include a key for each version directory",
            E046 => "Each version directory must have a corresponding key in the versions block",
            E047 => "Each key in the versions block must correspond to a version block",
            E048 => "Each version block must include the 'created' and 'state' keys",
            E049 => "The 'created' value must be an RFC 3339 timestamp with a timezone and at least seconds precision",
            E050 => "The keys of a version state block must be digests that appear as keys in the manifest",
            E051 => "State values must be arrays of logical paths",
            E052 => "Logical paths must not contain '.', '..', or empty segments",
            E053 => "Logical paths must not begin or end with a forward slash",
            E054 => "The 'user' value must contain a 'name' key",
            E055 => "If present, the 'message' value must be a JSON string",
            E056 => "If present, the 'fixity' value must be a JSON object keyed by digest algorithm",
            E057 => "The paths in a fixity block must be content paths that appear in the manifest",
            E058 => "Every inventory file must have a corresponding sidecar file",
            E059 => "The sidecar filename must be 'inventory.json.' followed by the digest algorithm name",
            E060 => "The digest in the sidecar file must match the digest of the inventory file",
            E061 => "The sidecar contents must be the inventory digest, whitespace, and 'inventory.json'",
            E062 => "The sidecar file must be in the same directory as the inventory it describes",
            E063 => "Every OCFL object must have an inventory file in the object root",
            E064 => "The inventory in the object root must be identical to the inventory in the head version directory",
            E066 => "Each version state in an earlier inventory must match the corresponding state in later inventories",
            E067 => "The extensions directory must not contain files, only sub-directories",
            E068 => "Extension sub-directories must conform to their published definitions",
            E069 => "An OCFL storage root must contain a root conformance declaration",
            E070 => "A storage root layout declaration must describe the layout extension in use",
            E071 => "A storage root layout extension must be a registered extension",
            E072 => "The storage hierarchy must only contain OCFL objects and the specified root files",
            E073 => "Empty directories must not appear in the storage hierarchy",
            E074 => "OCFL objects in a storage hierarchy must be isolated from each other",
            E075 => "The OCFL object at a mapped path must have an id matching the mapping",
            E076 => "A storage root conformance declaration must be formatted according to NAMASTE",
            E077 => "A storage root conformance declaration filename must be '0=ocfl_' followed by the spec version",
            E078 => "A storage root conformance declaration's contents must match its filename",
            E079 => "A storage root must declare at most one spec version",
            E080 => "A storage root conformance declaration must be a regular file",
            E081 => "OCFL objects within a storage root must conform to a spec version no later than the root's",
            E082 => "Object root paths must not begin or end with a forward slash",
            E083 => "Object root paths must be interior to the storage root",
            E084 => "Storage root extension configuration must be valid JSON",
            E085 => "Storage root extension names must conform to the extension naming rules",
            E086 => "Logs directory contents are opaque but must be well-formed directory entries",
            E087 => "A storage root's spec copy, if present, must match the declared spec version",
            E088 => "A storage root must not contain entries other than those the specification allows",
            E089 => "Content files must be accessible through the declared storage hierarchy",
            E090 => "Hard links, symbolic links, and other irregular files must not be used within OCFL storage",
            E091 => "Manifest values must be arrays of content paths",
            E092 => "The value of a manifest key must match the digest of the content file at each corresponding content path",
            E093 => "The digests in a fixity block must match the digests of the content files they reference",
            E094 => "The 'message' value must describe the version it belongs to",
            E095 => "Within a version, logical paths must be unique and non-conflicting",
            E096 => "Manifest digest keys must be unique with case-insensitive comparison",
            E097 => "Fixity digest keys must be unique with case-insensitive comparison",
            E098 => "Content paths must be interior to the object root",
            E099 => "Content paths must not contain '.', '..', or empty segments",
            E100 => "Content paths must not begin or end with a forward slash",
            E101 => "Content paths must be unique and non-conflicting",
            E102 => "An inventory file must not contain keys that are not specified",
        }
    }
}

impl WarnCode {
    /// The URL of the section of the spec the code refers to
    pub fn url(self, spec: SpecVersion) -> String {
        format!("{}#{}", spec.url(), self)
    }

    /// Human readable description from the published catalogue
    pub fn description(self) -> &'static str {
        use WarnCode::*;
        match self {
            W001 => "Implementations should use version directory names constructed without zero-padding",
            W002 => "Version directories should not contain directories other than the designated content directory",
            W003 => "Version directories should not contain an empty content directory",
            W004 => "For content-addressing, sha512 should be used rather than sha256",
            W005 => "The inventory 'id' value should be a URI",
            W006 => "Fixity blocks should only reference digest algorithms from the OCFL registry",
            W007 => "Version blocks should include the 'message' and 'user' keys",
            W008 => "The 'user' block should include an 'address' key",
            W009 => "The 'user' address should be a URI, such as a mailto address",
            W010 => "Each version directory other than the head should include an inventory file",
            W011 => "Version metadata in prior inventories should match the corresponding version in the root inventory",
            W012 => "Extension sub-directory names should be registered extension names",
            W013 => "Objects should not contain unregistered extension directories",
            W014 => "Storage roots should include a copy of the OCFL specification",
            W015 => "The storage root extensions directory should only contain registered extensions",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, WarnCode};
    use crate::ocfl::spec::SpecVersion;

    #[test]
    fn codes_render_their_identifiers() {
        assert_eq!("E001", ErrorCode::E001.to_string());
        assert_eq!("E102", ErrorCode::E102.to_string());
        assert_eq!("W015", WarnCode::W015.to_string());
    }

    #[test]
    fn code_urls_point_at_the_spec() {
        assert_eq!(
            "https://ocfl.io/1.1/spec/#E050",
            ErrorCode::E050.url(SpecVersion::Ocfl1_1)
        );
        assert_eq!(
            "https://ocfl.io/1.0/spec/#W004",
            WarnCode::W004.url(SpecVersion::Ocfl1_0)
        );
    }

    #[test]
    fn every_code_has_a_description() {
        assert!(!ErrorCode::E090.description().is_empty());
        assert!(!WarnCode::W007.description().is_empty());
    }
}
