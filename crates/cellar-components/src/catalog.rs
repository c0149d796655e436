//! Front-end facing helpers over the installer: update checks, first-run
//! installs and staging cleanup. Blocking; run them through a task.

use std::sync::Arc;

use crate::errors::{ComponentError, Result};
use crate::feeds::fetch_releases;
use crate::install::ComponentInstaller;
use crate::state::Available;
use crate::types::{ComponentKind, ComponentStore, RunnerFamily};
use crate::ui::icons;

/// How many of the newest releases an update check looks at.
pub const UPDATE_WINDOW: usize = 3;

/// A release that is offered but not installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentUpdate {
    pub kind: ComponentKind,
    pub tag: String,
    pub asset: String,
}

#[derive(Clone)]
pub struct ComponentCatalog {
    installer: Arc<ComponentInstaller>,
}

impl ComponentCatalog {
    pub fn new(installer: Arc<ComponentInstaller>) -> Self {
        Self { installer }
    }

    pub fn installer(&self) -> &Arc<ComponentInstaller> {
        &self.installer
    }

    pub fn available(&self) -> Arc<Available> {
        self.installer.index().snapshot()
    }

    /// Runner and alternate-runner releases not yet installed.
    pub fn runner_updates(&self) -> Result<Vec<ComponentUpdate>> {
        let updates = self.updates_for(&[ComponentKind::Runner, ComponentKind::CompatLayerVariant])?;
        if updates.is_empty() {
            self.installer.notifier().info(
                "Download manager",
                "No runner updates available.",
                icons::SYSTEM,
            );
        }
        Ok(updates)
    }

    pub fn dxvk_updates(&self) -> Result<Vec<ComponentUpdate>> {
        let updates = self.updates_for(&[ComponentKind::GraphicsShim])?;
        if updates.is_empty() {
            self.installer.notifier().info(
                "Download manager",
                "No dxvk updates available.",
                icons::SYSTEM,
            );
        }
        Ok(updates)
    }

    fn updates_for(&self, kinds: &[ComponentKind]) -> Result<Vec<ComponentUpdate>> {
        if !self.installer.is_online() {
            tracing::warn!("offline, skipping update check");
            return Ok(Vec::new());
        }
        let available = self.available();
        let mut out = Vec::new();
        for &kind in kinds {
            let repo = self.installer.feeds().repository(kind);
            for release in fetch_releases(self.installer.client(), repo)?
                .into_iter()
                .take(UPDATE_WINDOW)
            {
                if available.contains(kind.store(), &kind.install_identity(&release.tag_name)) {
                    continue;
                }
                if let Some(asset) = release.first_asset() {
                    out.push(ComponentUpdate {
                        kind,
                        asset: asset.to_string(),
                        tag: release.tag_name,
                    });
                }
            }
        }
        Ok(out)
    }

    /// Re-index runners. With `install_latest`, an empty store gets the
    /// newest runner release installed on the calling thread.
    pub fn check_runners(&self, install_latest: bool) -> Result<Arc<Available>> {
        self.check(ComponentKind::Runner, install_latest)
    }

    pub fn check_dxvk(&self, install_latest: bool) -> Result<Arc<Available>> {
        self.check(ComponentKind::GraphicsShim, install_latest)
    }

    fn check(&self, kind: ComponentKind, install_latest: bool) -> Result<Arc<Available>> {
        let store = kind.store();
        let snap = self.installer.index().rebuild(store)?;
        if !snap.list(store).is_empty() || !install_latest {
            return Ok(snap);
        }

        tracing::warn!(%kind, "no components found");
        if !self.installer.is_online() {
            self.installer
                .notifier()
                .error("Download manager", "You are offline, unable to download.");
            return Err(ComponentError::ConnectivityUnavailable);
        }
        let releases = fetch_releases(self.installer.client(), self.installer.feeds().repository(kind))?;
        let (tag, asset) = releases
            .iter()
            .find_map(|r| r.first_asset().map(|a| (r.tag_name.clone(), a.to_string())))
            .ok_or(ComponentError::EmptyFeed(kind))?;

        self.installer.install(kind, &tag, &asset)?;
        Ok(self.installer.index().snapshot())
    }

    pub fn latest_runner(&self, family: RunnerFamily) -> Option<String> {
        self.available().latest_runner(family).map(str::to_string)
    }

    pub fn has(&self, store: ComponentStore, name: &str) -> bool {
        self.available().contains(store, name)
    }

    /// Empty the staging area when the cleanup setting is on or `force` is set.
    pub fn clear_temp(&self, force: bool) -> Result<usize> {
        if !force && !self.installer.notifier().settings().temp_cleanup_enabled() {
            return Ok(0);
        }
        let removed = self.installer.staging().clear()?;
        tracing::info!(removed, "temp directory cleaned");
        Ok(removed)
    }
}
