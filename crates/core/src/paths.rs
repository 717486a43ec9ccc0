//! Project directory name encoding and on-disk layout helpers.
//!
//! The assistant encodes a session's working directory into its log
//! directory name by replacing `/` with `-` and prefixing a leading `-`.
//! This is a simple, reversible mapping — no attempt is made to disambiguate
//! directory names that legitimately contain a literal `-` (that
//! disambiguation lives in the assistant CLI, which is out of scope here).

use std::path::PathBuf;

/// Decode a project directory name (e.g. `-Users-cmericli-workspace`) back
/// into an absolute working directory path (e.g. `/Users/cmericli/workspace`).
pub fn project_dir_to_path(project_dir_name: &str) -> String {
    let stripped = project_dir_name.trim_start_matches('-');
    format!("/{}", stripped.replace('-', "/"))
}

/// Encode an absolute working directory path into the project directory
/// name the assistant would have used for it.
pub fn path_to_project_dir(working_dir: &str) -> String {
    let replaced = working_dir.replace('/', "-");
    format!("-{}", replaced.trim_start_matches('-'))
}

/// The basename (last path component) of a working directory, used as the
/// human-readable project name. Falls back to `"unknown"` for an empty or
/// root path.
pub fn project_name_from_working_dir(working_dir: &str) -> String {
    PathBuf::from(working_dir)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Base directory under which the assistant writes per-project transcript
/// directories. Defaults to `~/.claude/projects`, overridable via
/// `FLEETDECK_LOG_ROOT` for tests and non-standard installs.
pub fn default_log_root() -> PathBuf {
    if let Ok(path) = std::env::var("FLEETDECK_LOG_ROOT") {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
        .join("projects")
}

/// Directory under the platform cache/config root used for the embedded
/// store, push-notification keys, and the federation machine roster.
/// Overridable via `FLEETDECK_CONFIG_DIR`.
pub fn config_dir() -> PathBuf {
    if let Ok(path) = std::env::var("FLEETDECK_CONFIG_DIR") {
        return PathBuf::from(path);
    }
    dirs::cache_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fleetdeck")
}

/// Path to the embedded SQLite store within [`config_dir`].
pub fn db_path() -> PathBuf {
    config_dir().join("index.db")
}

/// Path to the federation machine roster file.
pub fn machines_config_path() -> PathBuf {
    config_dir().join("machines.json")
}

/// Path to the persisted VAPID keypair for Web Push.
pub fn vapid_keys_path() -> PathBuf {
    config_dir().join("vapid_keys.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_path() {
        let dir = path_to_project_dir("/Users/cmericli/workspace");
        assert_eq!(dir, "-Users-cmericli-workspace");
        assert_eq!(project_dir_to_path(&dir), "/Users/cmericli/workspace");
    }

    #[test]
    fn project_name_is_basename() {
        assert_eq!(
            project_name_from_working_dir("/Users/cmericli/workspace/fleetdeck"),
            "fleetdeck"
        );
        assert_eq!(project_name_from_working_dir(""), "unknown");
    }

    #[test]
    fn root_path_round_trips() {
        let dir = path_to_project_dir("/");
        assert_eq!(project_dir_to_path(&dir), "/");
    }
}
