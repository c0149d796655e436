use crate::errors::Result;
use crate::paths::CellarPaths;
use crate::types::{ComponentStore, RunnerFamily};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

/// Installed components as discovered on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Available {
    /// Runner directory names, sorted descending.
    pub runners: Vec<String>,
    /// Graphics shim directory names, sorted descending.
    pub dxvk: Vec<String>,
}

impl Available {
    pub fn contains(&self, store: ComponentStore, name: &str) -> bool {
        self.list(store).iter().any(|n| n == name)
    }

    pub fn list(&self, store: ComponentStore) -> &[String] {
        match store {
            ComponentStore::Runners => &self.runners,
            ComponentStore::GraphicsShims => &self.dxvk,
        }
    }

    pub fn latest_runner(&self, family: RunnerFamily) -> Option<&str> {
        self.runners
            .iter()
            .find(|r| r.to_lowercase().starts_with(family.prefix()))
            .map(String::as_str)
    }
}

/// Component availability index.
///
/// Readers take cheap `Arc` snapshots. Rebuilds are serialized: one writer
/// lists the store directory, builds a full replacement, then swaps it in.
/// The index is never patched incrementally.
#[derive(Clone)]
pub struct ComponentIndex {
    paths: CellarPaths,
    inner: Arc<RwLock<Arc<Available>>>,
    writer: Arc<Mutex<()>>,
}

impl ComponentIndex {
    pub fn new(paths: CellarPaths) -> Self {
        Self {
            paths,
            inner: Arc::new(RwLock::new(Arc::new(Available::default()))),
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn snapshot(&self) -> Arc<Available> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Recompute one store's list from the filesystem.
    pub fn rebuild(&self, store: ComponentStore) -> Result<Arc<Available>> {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let listed = list_dirs(&self.paths.store_root(store))?;

        let mut next = (*self.snapshot()).clone();
        match store {
            ComponentStore::Runners => next.runners = listed,
            ComponentStore::GraphicsShims => next.dxvk = listed,
        }
        if !next.list(store).is_empty() {
            tracing::info!(store = ?store, found = %next.list(store).join(", "), "components found");
        }

        let next = Arc::new(next);
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = next.clone();
        Ok(next)
    }

    pub fn rebuild_all(&self) -> Result<Arc<Available>> {
        self.rebuild(ComponentStore::Runners)?;
        self.rebuild(ComponentStore::GraphicsShims)
    }
}

fn list_dirs(root: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    if !root.is_dir() {
        return Ok(out);
    }
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            out.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    out.sort_by(|a, b| b.cmp(a));
    Ok(out)
}
