//! A storage agnostic library for reading, writing, and validating
//! [OCFL objects](https://ocfl.io/).
//!
//! Open an existing object and read a file out of its head version:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ocfl_core::ocfl::{LocalFs, Object};
//!
//! # fn main() -> ocfl_core::ocfl::Result<()> {
//! let fs = Arc::new(LocalFs::new("path/to/storage")?);
//! let object = Object::open(fs, "path/to/object")?;
//! let mut reader = object.open_file(&"file.txt".try_into()?, 0)?;
//! # Ok(())
//! # }
//! ```

pub use self::codes::{ErrorCode, WarnCode};
pub use self::commit::{
    build_update_plan, recover_update_plan, ContentSource, FixitySource, PlanStep, Stage,
    UpdateOptions, UpdatePlan,
};
pub use self::digest::{DigestAlgorithm, DigestSet, HexDigest, MultiDigestWriter};
pub use self::digest_map::{DigestMap, PathConflict};
pub use self::error::{not_found, OcflError, Result};
pub use self::fs::walk::{default_width, digest_files, walk_files, DigestPipeline, FileDigests};
pub use self::fs::{Cancel, Fs, Listing, LocalFs, WriteFs};
pub use self::inventory::{
    parse_sidecar, read_inventory, sidecar_line, ContentPathFn, Inventory, InventoryBuilder,
    StoredInventory, Version,
};
pub use self::object::{scan_object_root, FileDetails, Object, ObjectRootState};
pub use self::serde::parse_inventory;
pub use self::spec::{Namaste, SpecVersion};
pub use self::types::*;
pub use self::validate::{
    validate_object, ValidateOptions, ValidationError, ValidationResult, ValidationWarning,
};

mod codes;
mod commit;
mod consts;
mod digest;
mod digest_map;
mod error;
pub mod fs;
mod inventory;
mod object;
mod paths;
mod serde;
mod spec;
mod types;
mod validate;
