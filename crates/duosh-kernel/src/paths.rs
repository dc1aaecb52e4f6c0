//! XDG Base Directory paths for duosh.
//!
//! | Purpose | XDG Variable | Default | duosh path |
//! |---------|--------------|---------|------------|
//! | Config | `$XDG_CONFIG_HOME` | `~/.config` | `duosh/config.toml` |
//! | Data | `$XDG_DATA_HOME` | `~/.local/share` | `duosh/lib` (module root) |

use std::path::PathBuf;

use directories::BaseDirs;

// ═══════════════════════════════════════════════════════════════════════════
// XDG Primitives
// ═══════════════════════════════════════════════════════════════════════════

/// Get the user's home directory.
///
/// Returns `$HOME` or falls back to `/tmp` if not set.
pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// `$XDG_DATA_HOME`, or `~/.local/share`.
pub fn xdg_data_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| home_dir().join(".local").join("share"))
}

/// `$XDG_CONFIG_HOME`, or `~/.config`.
pub fn xdg_config_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| home_dir().join(".config"))
}

// ═══════════════════════════════════════════════════════════════════════════
// duosh Paths
// ═══════════════════════════════════════════════════════════════════════════

pub fn config_dir() -> PathBuf {
    xdg_config_home().join("duosh")
}

pub fn data_dir() -> PathBuf {
    xdg_data_home().join("duosh")
}

/// Where `KernelConfig::load` looks by default.
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default root for `use` lookups.
pub fn default_module_root() -> PathBuf {
    data_dir().join("lib")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_dir_is_absolute() {
        assert!(home_dir().is_absolute());
    }

    #[test]
    fn duosh_paths_build_on_xdg_primitives() {
        assert_eq!(data_dir(), xdg_data_home().join("duosh"));
        assert_eq!(config_dir(), xdg_config_home().join("duosh"));
        assert!(config_file().ends_with("duosh/config.toml"));
        assert!(default_module_root().starts_with(data_dir()));
    }
}
