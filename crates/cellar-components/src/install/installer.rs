use crate::errors::{ComponentError, Result};
use crate::feeds::Feeds;
use crate::net::{download_to_path, Connectivity};
use crate::paths::CellarPaths;
use crate::progress::ProgressEntry;
use crate::staging::StagingArea;
use crate::state::ComponentIndex;
use crate::task::{TaskHandle, TaskRunner};
use crate::types::{ComponentKind, DownloadRequest, DownloadSource, StagedFile};
use crate::ui::{icons, Notifier, Ui};
use crate::verify::verify_checksum;
use reqwest::blocking::Client;
use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;

use super::extract::extract_archive;

/// Downloads, verifies and extracts component archives into the store.
pub struct ComponentInstaller {
    paths: CellarPaths,
    feeds: Feeds,
    client: Client,
    staging: StagingArea,
    index: ComponentIndex,
    connectivity: Arc<dyn Connectivity>,
    ui: Arc<dyn Ui>,
    notifier: Notifier,
    tasks: TaskRunner,
}

impl ComponentInstaller {
    pub fn new(
        paths: CellarPaths,
        feeds: Feeds,
        client: Client,
        connectivity: Arc<dyn Connectivity>,
        notifier: Notifier,
        ui: Arc<dyn Ui>,
    ) -> Self {
        Self {
            staging: StagingArea::new(paths.temp()),
            index: ComponentIndex::new(paths.clone()),
            paths,
            feeds,
            client,
            connectivity,
            ui,
            notifier,
            tasks: TaskRunner::new(),
        }
    }

    pub fn paths(&self) -> &CellarPaths {
        &self.paths
    }

    pub fn feeds(&self) -> &Feeds {
        &self.feeds
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn index(&self) -> &ComponentIndex {
        &self.index
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    fn resolve_url(&self, req: &DownloadRequest) -> String {
        match &req.source {
            DownloadSource::Release { kind, tag } => {
                self.feeds.repository(*kind).asset_url(tag, &req.file_name)
            }
            DownloadSource::Direct(url) => url.clone(),
        }
    }

    /// Stage one file. Skips the transfer when a file with the staged name is
    /// already present. A checksum mismatch deletes the staged file and is the
    /// only content failure reported from here.
    pub fn download(&self, req: &DownloadRequest) -> Result<StagedFile> {
        let name = req.staged_name().to_string();
        let path = self.staging.path(&name);
        let _claim = self.staging.claim(&name)?;

        let transferred = if path.is_file() {
            tracing::warn!(file = %name, "file already exists in temp, skipping");
            false
        } else {
            let url = self.resolve_url(req);
            tracing::debug!(%url, file = %name, "downloading");
            download_to_path(&self.client, &url, &path)?;
            if req.rename.is_some() {
                tracing::info!(from = %req.file_name, to = %name, "renamed staged download");
            }
            true
        };

        if let Some(expected) = &req.checksum {
            if let Err(e) = verify_checksum(&path, expected) {
                tracing::error!(file = %name, error = %e, "downloaded file looks corrupted");
                self.notifier.error(
                    "Cellar",
                    &format!("Downloaded file `{name}` looks corrupted. Try again."),
                );
                match fs::remove_file(&path) {
                    Err(rm) if rm.kind() != ErrorKind::NotFound => return Err(rm.into()),
                    _ => {}
                }
                return Err(e);
            }
        }

        Ok(StagedFile {
            name,
            path,
            transferred,
        })
    }

    /// Unpack a staged archive into the kind's store root.
    pub fn extract(&self, kind: ComponentKind, archive_name: &str) -> Result<()> {
        let dest = self.paths.store_root(kind.store());
        tracing::info!(archive = archive_name, dest = %dest.display(), "extracting");
        extract_archive(&self.staging.path(archive_name), &dest)
    }

    /// Download, extract, re-index. Runs on the calling thread.
    pub fn install(&self, kind: ComponentKind, tag: &str, asset: &str) -> Result<()> {
        self.notifier.info(
            "Download manager",
            &format!("Installing `{tag}` {kind} …"),
            icons::SAVE,
        );
        let progress = ProgressEntry::start(self.ui.clone(), &self.tasks, &kind.display_label(tag));
        tracing::info!(%kind, tag, "installing component");

        let result = self
            .download(&DownloadRequest::release(kind, tag, asset))
            .and_then(|_| self.extract(kind, asset))
            .and_then(|_| self.index.rebuild(kind.store()).map(|_| ()));

        match result {
            Ok(()) => {
                self.notifier.info(
                    "Download manager",
                    &format!("Installation of `{tag}` component finished!"),
                    icons::INSTALLED,
                );
                drop(progress);
                self.ui.refresh_component_lists();
                Ok(())
            }
            Err(e) => {
                tracing::error!(%kind, tag, error = %e, "component installation failed");
                drop(progress);
                self.notifier.error(
                    "Download manager",
                    &format!("Installation of `{tag}` failed: {e}"),
                );
                Err(e)
            }
        }
    }

    /// Connectivity pre-check, then [`install`](Self::install) on a background task.
    pub fn install_component(
        self: &Arc<Self>,
        kind: ComponentKind,
        tag: &str,
        asset: &str,
    ) -> Result<TaskHandle<Result<()>>> {
        if !self.is_online() {
            self.notifier
                .error("Download manager", "You are offline, unable to download.");
            return Err(ComponentError::ConnectivityUnavailable);
        }
        let this = Arc::clone(self);
        let (tag, asset) = (tag.to_string(), asset.to_string());
        Ok(self
            .tasks
            .run("install", move || this.install(kind, &tag, &asset)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::Repository;
    use crate::install::extract_tests::tar_gz_with_top_dir;
    use crate::net::{build_client, StaticConnectivity};
    use crate::settings::StaticSettings;
    use crate::types::ComponentStore;
    use crate::ui::{RecordingUi, UiEvent};
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _tmp: TempDir,
        server: Server,
        ui: Arc<RecordingUi>,
        installer: Arc<ComponentInstaller>,
    }

    fn fixture(online: bool) -> Fixture {
        let tmp = tempdir().expect("tempdir");
        let server = Server::run();
        let paths = CellarPaths::new(tmp.path());
        paths.ensure().expect("ensure");
        let repo = Repository {
            releases_api: server.url_str("/releases"),
            downloads: server.url_str("/dl"),
        };
        let feeds = Feeds {
            runner: repo.clone(),
            proton: repo.clone(),
            dxvk: repo,
            dependencies: server.url_str("/deps"),
        };
        let ui = RecordingUi::new();
        let settings = Arc::new(StaticSettings {
            notifications: true,
            temp_cleanup: false,
        });
        let installer = Arc::new(ComponentInstaller::new(
            paths,
            feeds,
            build_client().expect("client"),
            Arc::new(StaticConnectivity(online)),
            Notifier::new(ui.clone(), settings),
            ui.clone(),
        ));
        Fixture {
            _tmp: tmp,
            server,
            ui,
            installer,
        }
    }

    fn direct(url: String, name: &str) -> DownloadRequest {
        DownloadRequest {
            source: DownloadSource::Direct(url),
            file_name: name.into(),
            rename: None,
            checksum: None,
        }
    }

    #[test]
    fn second_download_of_same_name_is_a_cache_hit() -> Result<()> {
        let fx = fixture(true);
        fx.server.expect(
            Expectation::matching(request::method_path("GET", "/files/setup.exe"))
                .times(1)
                .respond_with(status_code(200).body("MZ")),
        );
        let req = direct(fx.server.url_str("/files/setup.exe"), "setup.exe");

        let first = fx.installer.download(&req)?;
        let second = fx.installer.download(&req)?;
        assert!(first.transferred);
        assert!(!second.transferred);
        assert_eq!(second.path, fx.installer.staging().path("setup.exe"));
        Ok(())
    }

    #[test]
    fn checksum_mismatch_removes_staged_file() -> Result<()> {
        let fx = fixture(true);
        fx.server.expect(
            Expectation::matching(request::method_path("GET", "/files/vcredist.exe"))
                .respond_with(status_code(200).body("tampered")),
        );
        let mut req = direct(fx.server.url_str("/files/vcredist.exe"), "vcredist.exe");
        req.checksum = Some("00".repeat(32));

        let err = fx.installer.download(&req).expect_err("mismatch");
        assert!(matches!(err, ComponentError::ChecksumMismatch { .. }));
        assert!(!fx.installer.staging().contains("vcredist.exe"));
        assert!(fx
            .ui
            .notifications()
            .iter()
            .any(|(_, body)| body.contains("looks corrupted")));
        Ok(())
    }

    #[test]
    fn rename_stages_under_new_name() -> Result<()> {
        let fx = fixture(true);
        fx.server.expect(
            Expectation::matching(request::method_path("GET", "/files/dl.php"))
                .respond_with(status_code(200).body("msi")),
        );
        let mut req = direct(fx.server.url_str("/files/dl.php"), "dl.php");
        req.rename = Some("dotnet.msi".into());

        let staged = fx.installer.download(&req)?;
        assert_eq!(staged.name, "dotnet.msi");
        assert!(fx.installer.staging().contains("dotnet.msi"));
        assert!(!fx.installer.staging().contains("dl.php"));
        Ok(())
    }

    #[test]
    fn install_runner_indexes_it_and_keeps_archive_cached() -> Result<()> {
        let fx = fixture(true);
        fx.server.expect(
            Expectation::matching(request::method_path("GET", "/dl/download/v6.0/wine-v6.0.tar.gz"))
                .times(1)
                .respond_with(status_code(200).body(tar_gz_with_top_dir("v6.0"))),
        );

        fx.installer
            .install_component(ComponentKind::Runner, "v6.0", "wine-v6.0.tar.gz")?
            .join()??;

        let snap = fx.installer.index().snapshot();
        assert!(snap.contains(ComponentStore::Runners, "v6.0"));
        assert!(fx.installer.staging().contains("wine-v6.0.tar.gz"));

        // Re-installing the same tag re-uses the staged archive (times(1) above).
        fx.installer
            .install(ComponentKind::Runner, "v6.0", "wine-v6.0.tar.gz")?;

        let events = fx.ui.events();
        assert!(events.contains(&UiEvent::ProgressRegistered("v6.0".into())));
        assert!(events.contains(&UiEvent::ComponentListsRefreshed));
        Ok(())
    }

    #[test]
    fn failed_extraction_is_fatal_and_reported() -> Result<()> {
        let fx = fixture(true);
        fx.server.expect(
            Expectation::matching(request::method_path("GET", "/dl/download/v1.8/dxvk-1.8.tar.gz"))
                .respond_with(status_code(200).body("garbage")),
        );

        let err = fx
            .installer
            .install(ComponentKind::GraphicsShim, "v1.8", "dxvk-1.8.tar.gz")
            .expect_err("extraction should fail");
        assert!(matches!(err, ComponentError::Extraction { .. }));
        assert!(fx.installer.index().snapshot().dxvk.is_empty());
        assert!(!fx.ui.events().contains(&UiEvent::ComponentListsRefreshed));
        Ok(())
    }

    #[test]
    fn offline_install_is_refused_up_front() {
        let fx = fixture(false);
        let res = fx
            .installer
            .install_component(ComponentKind::Runner, "v6.0", "wine-v6.0.tar.gz");
        assert!(matches!(res, Err(ComponentError::ConnectivityUnavailable)));
    }
}
