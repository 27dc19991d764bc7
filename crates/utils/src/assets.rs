use std::{env, path::PathBuf};

use directories::ProjectDirs;

const DATA_DIR_ENV: &str = "APHRODITE_DATA_DIR";

/// Filing structure under the data root:
/// ```text
/// <data root>/
/// ├── db.sqlite                 # job + poster status store
/// ├── cache/
/// │   └── posters/              # per-attempt original downloads + .meta sidecars
/// ├── output/
/// │   └── processed/            # composed posters
/// └── assets/
///     └── badges/               # badge image assets (codec logos, award ribbons)
/// ```
pub mod layout {
    pub const POSTER_CACHE_DIR: &str = "cache/posters";
    pub const PROCESSED_OUTPUT_DIR: &str = "output/processed";
    pub const BADGE_ASSET_DIR: &str = "assets/badges";
}

/// Resolve the data root from `APHRODITE_DATA_DIR` or the platform data dir.
pub fn data_root() -> PathBuf {
    if let Ok(dir) = env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    ProjectDirs::from("com", "aphrodite", "aphrodite")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn db_path() -> PathBuf {
    data_root().join("db.sqlite")
}

pub fn poster_cache_dir() -> PathBuf {
    data_root().join(layout::POSTER_CACHE_DIR)
}

pub fn processed_output_dir() -> PathBuf {
    data_root().join(layout::PROCESSED_OUTPUT_DIR)
}

pub fn badge_asset_dir() -> PathBuf {
    data_root().join(layout::BADGE_ASSET_DIR)
}

/// Create the on-disk layout if missing. Called once at startup.
pub fn ensure_layout() -> std::io::Result<()> {
    for dir in [
        data_root(),
        poster_cache_dir(),
        processed_output_dir(),
        badge_asset_dir(),
    ] {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(())
}

/// Short form of a UUID used in cache filenames.
pub fn short_uuid(id: &uuid::Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}
