//! Registry file definitions.
//!
//! Each kind lives in its own JSON file under the state directory, wrapped
//! in a single-key object: `{"applications": [...]}`.

/// Location and wrapper key of one registry file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    /// Path relative to the state directory.
    pub file: &'static str,
    /// Key of the top-level array.
    pub root: &'static str,
    /// Human name used in error messages.
    pub kind: &'static str,
}

/// Applications keyed by name, `apps.json`.
pub const APPLICATIONS: Table = Table {
    file: "apps.json",
    root: "applications",
    kind: "application",
};

/// Databases keyed by name, `databases.json`.
pub const DATABASES: Table = Table {
    file: "databases.json",
    root: "databases",
    kind: "database",
};

/// VPCs keyed by name, `vpcs.json`.
pub const VPCS: Table = Table {
    file: "vpcs.json",
    root: "vpcs",
    kind: "vpc",
};

/// Volume backups keyed by id, `volume-backups/volume-registry.json`.
pub const VOLUME_BACKUPS: Table = Table {
    file: "volume-backups/volume-registry.json",
    root: "backups",
    kind: "volume backup",
};
