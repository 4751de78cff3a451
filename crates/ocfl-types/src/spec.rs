//! Constants fixed by the OCFL 1.1 specification and the extensions this
//! engine implements.

/// The OCFL spec version this engine writes.
pub const OCFL_VERSION: &str = "1.1";

/// Namaste file marking a storage root.
pub const ROOT_NAMASTE_FILE: &str = "0=ocfl_1.1";

/// Contents of the storage-root namaste file.
pub const ROOT_NAMASTE_CONTENT: &str = "ocfl_1.1\n";

/// Namaste file marking an object root.
pub const OBJECT_NAMASTE_FILE: &str = "0=ocfl_object_1.1";

/// Contents of the object-root namaste file.
pub const OBJECT_NAMASTE_CONTENT: &str = "ocfl_object_1.1\n";

/// Filename prefix shared by all object namaste files, any spec version.
pub const OBJECT_NAMASTE_PREFIX: &str = "0=ocfl_object_";

/// The inventory type URI written into every inventory.
pub const INVENTORY_TYPE: &str = "https://ocfl.io/1.1/spec/#inventory";

/// Name of the inventory file.
pub const INVENTORY_FILE: &str = "inventory.json";

/// Prefix of the inventory digest sidecar; the algorithm name follows.
pub const SIDECAR_PREFIX: &str = "inventory.json.";

/// Default version content directory name.
pub const DEFAULT_CONTENT_DIR: &str = "content";

/// Name of the storage-root layout declaration file.
pub const OCFL_LAYOUT_FILE: &str = "ocfl_layout.json";

/// Directory holding extension state, under both storage and object roots.
pub const EXTENSIONS_DIR: &str = "extensions";

/// Filename of a layout extension's configuration, under its extension dir.
pub const EXTENSION_CONFIG_FILE: &str = "config.json";

/// Registered name of the mutable-HEAD extension.
pub const MUTABLE_HEAD_EXT_NAME: &str = "0005-mutable-head-0.1";

/// Path of the mutable-HEAD overlay, relative to an object root.
pub const MUTABLE_HEAD_DIR: &str = "extensions/0005-mutable-head-0.1/head";
