use const_format::concatcp;

pub const INVENTORY_FILE: &str = "inventory.json";
pub const INVENTORY_SIDECAR_PREFIX: &str = "inventory.json.";
pub const DEFAULT_CONTENT_DIR: &str = "content";
pub const EXTENSIONS_DIR: &str = "extensions";
pub const LOGS_DIR: &str = "logs";

pub const OBJECT_NAMASTE_PREFIX: &str = "0=ocfl_object_";
pub const ROOT_NAMASTE_PREFIX: &str = "0=ocfl_";

pub const OBJECT_NAMASTE_FILE_1_0: &str = concatcp!(OBJECT_NAMASTE_PREFIX, "1.0");
pub const OBJECT_NAMASTE_FILE_1_1: &str = concatcp!(OBJECT_NAMASTE_PREFIX, "1.1");
pub const OBJECT_NAMASTE_CONTENTS_1_0: &str = concatcp!("ocfl_object_", "1.0", "\n");
pub const OBJECT_NAMASTE_CONTENTS_1_1: &str = concatcp!("ocfl_object_", "1.1", "\n");

pub const ROOT_NAMASTE_FILE_1_0: &str = concatcp!(ROOT_NAMASTE_PREFIX, "1.0");
pub const ROOT_NAMASTE_FILE_1_1: &str = concatcp!(ROOT_NAMASTE_PREFIX, "1.1");
pub const ROOT_NAMASTE_CONTENTS_1_0: &str = concatcp!("ocfl_", "1.0", "\n");
pub const ROOT_NAMASTE_CONTENTS_1_1: &str = concatcp!("ocfl_", "1.1", "\n");

pub const INVENTORY_TYPE_1_0: &str = "https://ocfl.io/1.0/spec/#inventory";
pub const INVENTORY_TYPE_1_1: &str = "https://ocfl.io/1.1/spec/#inventory";

pub const SPEC_URL_1_0: &str = "https://ocfl.io/1.0/spec/";
pub const SPEC_URL_1_1: &str = "https://ocfl.io/1.1/spec/";

/// At most this many unexpected object-root entries are recorded by the scanner
pub const MAX_INVALID_ENTRIES: usize = 8;
