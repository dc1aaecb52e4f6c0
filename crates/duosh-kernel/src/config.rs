//! Kernel configuration.
//!
//! Defaults come from code, then an optional TOML file, then environment
//! overrides:
//!
//! ```toml
//! name = "build"
//! module_root = "/home/me/.local/share/duosh/lib"
//! module_extension = "duo"
//! pipe_buffer = 65536
//! value_buffer = 32
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths;
use crate::scheduler::{PIPE_BUFFER_SIZE, VALUE_BUFFER_SIZE};

/// Environment variable that overrides `module_root`.
pub const MODULE_ROOT_ENV: &str = "DUOSH_MODULE_ROOT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Configuration for kernel initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Name of this kernel (for identification in logs).
    pub name: String,
    /// Directory `use` resolves module specs against.
    pub module_root: PathBuf,
    /// File extension of module sources, without the dot.
    pub module_extension: String,
    /// Byte capacity of each pipe between pipeline forms.
    pub pipe_buffer: usize,
    /// Value capacity of each pipe between pipeline forms.
    pub value_buffer: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            module_root: paths::default_module_root(),
            module_extension: "duo".to_string(),
            pipe_buffer: PIPE_BUFFER_SIZE,
            value_buffer: VALUE_BUFFER_SIZE,
        }
    }
}

impl KernelConfig {
    /// Defaults under the name "transient"; nothing is read from disk.
    pub fn transient() -> Self {
        Self::named("transient")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Load the default config file (a missing file means defaults), then
    /// apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = paths::config_file();
        let config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        Ok(config.with_env_overrides())
    }

    /// Parse one TOML file. Unset keys keep their defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(root) = std::env::var_os(MODULE_ROOT_ENV) {
            if !root.is_empty() {
                self.module_root = PathBuf::from(root);
            }
        }
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_module_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.module_root = root.into();
        self
    }

    pub fn with_module_extension(mut self, ext: impl Into<String>) -> Self {
        self.module_extension = ext.into();
        self
    }

    /// Set both pipe capacities. Zero is raised to one.
    pub fn with_buffers(mut self, pipe_buffer: usize, value_buffer: usize) -> Self {
        self.pipe_buffer = pipe_buffer.max(1);
        self.value_buffer = value_buffer.max(1);
        self
    }
}
