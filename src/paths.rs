// ABOUTME: XDG Base Directory paths for the relay's configuration file
// ABOUTME: Falls back to the current directory when no home directory is available

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application identifier for XDG directories
const QUALIFIER: &str = "chat";
const ORGANIZATION: &str = "simplex";
const APPLICATION: &str = "simplex-relay";

/// Get XDG-compliant directories for the application
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Get the config directory path (e.g., ~/.config/simplex-relay/)
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the default config file path
/// e.g., ~/.config/simplex-relay/config.toml
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
