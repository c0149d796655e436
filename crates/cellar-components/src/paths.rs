use dirs::data_dir;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::types::ComponentStore;

/// Filesystem layout under one data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellarPaths {
    root: PathBuf,
}

impl CellarPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$CELLAR_HOME`, else ~/.local/share/cellar (or platform-equivalent)
    pub fn from_env() -> Self {
        if let Some(home) = std::env::var_os("CELLAR_HOME") {
            return Self::new(home);
        }
        Self::new(
            data_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("cellar"),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// <root>/temp
    pub fn temp(&self) -> PathBuf {
        self.root.join("temp")
    }

    /// <root>/runners
    pub fn runners(&self) -> PathBuf {
        self.root.join("runners")
    }

    /// <root>/dxvk
    pub fn dxvk(&self) -> PathBuf {
        self.root.join("dxvk")
    }

    /// <root>/environments
    pub fn environments(&self) -> PathBuf {
        self.root.join("environments")
    }

    /// <root>/cache
    pub fn cache(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn store_root(&self, store: ComponentStore) -> PathBuf {
        match store {
            ComponentStore::Runners => self.runners(),
            ComponentStore::GraphicsShims => self.dxvk(),
        }
    }

    /// Create every standard directory that is missing.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.runners(),
            self.environments(),
            self.dxvk(),
            self.temp(),
            self.cache(),
        ] {
            if !dir.is_dir() {
                tracing::info!(path = %dir.display(), "directory missing, creating");
                fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }
}
