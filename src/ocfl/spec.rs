use serde::{Deserialize, Serialize};
use strum_macros::{Display as EnumDisplay, EnumString};

use crate::ocfl::consts::*;
use crate::ocfl::error::{OcflError, Result};

/// A recognised OCFL specification version. Only 1.0 and 1.1 exist.
#[derive(
    Deserialize,
    Serialize,
    Debug,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Copy,
    Clone,
    EnumString,
    EnumDisplay,
)]
pub enum SpecVersion {
    #[serde(rename = "1.0")]
    #[strum(serialize = "1.0")]
    Ocfl1_0,
    #[serde(rename = "1.1")]
    #[strum(serialize = "1.1")]
    Ocfl1_1,
}

/// A NAMASTE declaration: a flag file whose name and contents declare the
/// type and spec version of the directory containing it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Namaste {
    pub filename: &'static str,
    pub content: &'static str,
}

impl SpecVersion {
    /// Parses a spec version string, eg `1.1`
    pub fn parse(version: &str) -> Result<Self> {
        match version {
            "1.0" => Ok(SpecVersion::Ocfl1_0),
            "1.1" => Ok(SpecVersion::Ocfl1_1),
            _ => Err(OcflError::InvalidValue(format!(
                "Unsupported OCFL spec version: {}",
                version
            ))),
        }
    }

    /// Resolves the spec version declared by an inventory `type` URI
    pub fn from_inventory_type(type_declaration: &str) -> Option<Self> {
        match type_declaration {
            INVENTORY_TYPE_1_0 => Some(SpecVersion::Ocfl1_0),
            INVENTORY_TYPE_1_1 => Some(SpecVersion::Ocfl1_1),
            _ => None,
        }
    }

    /// Resolves the spec version declared by an object NAMASTE filename
    pub fn from_object_namaste(filename: &str) -> Option<Self> {
        match filename {
            OBJECT_NAMASTE_FILE_1_0 => Some(SpecVersion::Ocfl1_0),
            OBJECT_NAMASTE_FILE_1_1 => Some(SpecVersion::Ocfl1_1),
            _ => None,
        }
    }

    /// The inventory `type` URI for this spec version
    pub fn inventory_type(self) -> &'static str {
        match self {
            SpecVersion::Ocfl1_0 => INVENTORY_TYPE_1_0,
            SpecVersion::Ocfl1_1 => INVENTORY_TYPE_1_1,
        }
    }

    /// The object declaration for this spec version
    pub fn object_namaste(self) -> Namaste {
        match self {
            SpecVersion::Ocfl1_0 => Namaste {
                filename: OBJECT_NAMASTE_FILE_1_0,
                content: OBJECT_NAMASTE_CONTENTS_1_0,
            },
            SpecVersion::Ocfl1_1 => Namaste {
                filename: OBJECT_NAMASTE_FILE_1_1,
                content: OBJECT_NAMASTE_CONTENTS_1_1,
            },
        }
    }

    /// The storage-root declaration for this spec version
    pub fn root_namaste(self) -> Namaste {
        match self {
            SpecVersion::Ocfl1_0 => Namaste {
                filename: ROOT_NAMASTE_FILE_1_0,
                content: ROOT_NAMASTE_CONTENTS_1_0,
            },
            SpecVersion::Ocfl1_1 => Namaste {
                filename: ROOT_NAMASTE_FILE_1_1,
                content: ROOT_NAMASTE_CONTENTS_1_1,
            },
        }
    }

    /// Base URL of the published spec this version corresponds to
    pub fn url(self) -> &'static str {
        match self {
            SpecVersion::Ocfl1_0 => SPEC_URL_1_0,
            SpecVersion::Ocfl1_1 => SPEC_URL_1_1,
        }
    }
}

impl Namaste {
    /// True if the bytes are the exact required declaration body
    pub fn is_valid_content(&self, bytes: &[u8]) -> bool {
        bytes == self.content.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::SpecVersion;

    #[test]
    fn spec_versions_are_ordered() {
        assert!(SpecVersion::Ocfl1_0 < SpecVersion::Ocfl1_1);
    }

    #[test]
    fn object_namaste_round_trip() {
        let namaste = SpecVersion::Ocfl1_1.object_namaste();
        assert_eq!("0=ocfl_object_1.1", namaste.filename);
        assert_eq!("ocfl_object_1.1\n", namaste.content);
        assert_eq!(
            Some(SpecVersion::Ocfl1_1),
            SpecVersion::from_object_namaste(namaste.filename)
        );
    }

    #[test]
    fn namaste_content_check() {
        let namaste = SpecVersion::Ocfl1_0.object_namaste();
        assert!(namaste.is_valid_content(b"ocfl_object_1.0\n"));
        assert!(!namaste.is_valid_content(b"ocfl_object_1.0"));
        assert!(!namaste.is_valid_content(b"ocfl_object_1.1\n"));
    }

    #[test]
    fn reject_unknown_spec_version() {
        assert!(SpecVersion::parse("1.2").is_err());
        assert!(SpecVersion::from_inventory_type("https://ocfl.io/2.0/spec/#inventory").is_none());
    }
}
