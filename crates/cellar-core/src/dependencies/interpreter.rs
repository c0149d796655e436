use cellar_components::{
    icons, ComponentError, ComponentInstaller, Notifier, ProgressEntry, TaskHandle, TaskRunner, Ui,
};
use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;

use super::index::DependencyRepository;
use super::manifest::Step;
use super::DependencyWidget;
use crate::environment::{Environment, EnvironmentStore};
use crate::errors::{CoreError, Result};
use crate::runtime::{Runtime, RuntimeTool};

const SYSTEM_DIRS: [&str; 2] = ["system32", "syswow64"];

/// Applies dependency manifests to environments.
///
/// A failing step aborts the rest. Steps already executed are not undone and
/// the dependency is only recorded after every step succeeded.
pub struct ManifestInterpreter {
    installer: Arc<ComponentInstaller>,
    repository: Arc<DependencyRepository>,
    store: Arc<EnvironmentStore>,
    runtime: Arc<Runtime>,
    ui: Arc<dyn Ui>,
    notifier: Notifier,
    tasks: TaskRunner,
}

impl ManifestInterpreter {
    pub fn new(
        installer: Arc<ComponentInstaller>,
        repository: Arc<DependencyRepository>,
        store: Arc<EnvironmentStore>,
        runtime: Arc<Runtime>,
        ui: Arc<dyn Ui>,
        notifier: Notifier,
    ) -> Self {
        Self {
            installer,
            repository,
            store,
            runtime,
            ui,
            notifier,
            tasks: TaskRunner::new(),
        }
    }

    pub fn repository(&self) -> &Arc<DependencyRepository> {
        &self.repository
    }

    /// Fetch the manifest for `id` and run it against `env`. Blocking.
    ///
    /// Returns the updated record on success.
    pub fn apply(&self, env: &Environment, id: &str, widget: &dyn DependencyWidget) -> Result<Environment> {
        tracing::info!(environment = %env.name, dependency = id, "installing dependency");
        self.ui.set_ui_enabled(false);
        self.notifier.info(
            "Dependency manager",
            &format!("Installing `{id}` in `{}` …", env.name),
            icons::SAVE,
        );
        let progress = ProgressEntry::start(
            self.ui.clone(),
            &self.tasks,
            &format!("{id} in {}", env.name),
        );

        let outcome = self
            .execute(env, id)
            .and_then(|_| self.commit(env, id));
        drop(progress);

        match outcome {
            Ok(updated) => {
                tracing::info!(environment = %env.name, dependency = id, "dependency installed");
                widget.show_installed(true);
                self.notifier.info(
                    "Dependency manager",
                    &format!("`{id}` installed in `{}`.", env.name),
                    icons::INSTALLED,
                );
                self.ui.set_ui_enabled(true);
                Ok(updated)
            }
            Err(e) => {
                tracing::error!(environment = %env.name, dependency = id, error = %e, "dependency installation aborted");
                widget.set_install_sensitive(true);
                self.notifier.error(
                    "Dependency manager",
                    &format!("Installation of `{id}` failed: {e}"),
                );
                self.ui.set_ui_enabled(true);
                Err(e)
            }
        }
    }

    /// Connectivity pre-check, then [`apply`](Self::apply) on a background task.
    pub fn apply_async(
        self: &Arc<Self>,
        env: Environment,
        id: &str,
        widget: Arc<dyn DependencyWidget>,
    ) -> Result<TaskHandle<Result<Environment>>> {
        if !self.installer.is_online() {
            self.notifier
                .error("Dependency manager", "You are offline, unable to download.");
            return Err(ComponentError::ConnectivityUnavailable.into());
        }
        let this = Arc::clone(self);
        let id = id.to_string();
        Ok(self
            .tasks
            .run("install_dependency", move || this.apply(&env, &id, widget.as_ref())))
    }

    fn execute(&self, env: &Environment, id: &str) -> Result<()> {
        let manifest = self.repository.fetch_manifest(id)?;
        for (index, step) in manifest.steps.iter().enumerate() {
            tracing::debug!(dependency = id, index, action = step.label(), "executing step");
            self.run_step(env, step)
                .map_err(|e| CoreError::ManifestStep {
                    index,
                    source: Box::new(e),
                })?;
        }
        Ok(())
    }

    fn run_step(&self, env: &Environment, step: &Step) -> Result<()> {
        match step {
            Step::RemoveSystemFiles { files } => {
                self.remove_system_files(env, files);
                Ok(())
            }
            Step::RunInstaller { .. } => {
                let Some(req) = step.download_request() else {
                    return Ok(());
                };
                let staged = self.installer.download(&req)?;
                let handle = self.runtime.run_executable(env, &staged.path, None)?;
                if !handle.wait()? {
                    tracing::warn!(file = %staged.name, "installer exited with failure");
                }
                Ok(())
            }
        }
    }

    fn remove_system_files(&self, env: &Environment, files: &[String]) {
        let windows = self.store.storage_path(env).join("drive_c").join("windows");
        for dir in SYSTEM_DIRS {
            for file in files {
                let path = windows.join(dir).join(file);
                match fs::remove_file(&path) {
                    Ok(()) => tracing::info!(path = %path.display(), "removed"),
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        tracing::warn!(path = %path.display(), "file not found, continuing")
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "cannot remove, continuing")
                    }
                }
            }
        }
    }

    fn commit(&self, env: &Environment, id: &str) -> Result<Environment> {
        self.store.modify(env, |current| {
            if !current.has_dependency(id) {
                current.installed_dependencies.push(id.to_string());
            }
            Ok(())
        })
    }

    /// Run the uninstaller and forget `id`. Best effort; nothing is replayed.
    pub fn revert(&self, env: &Environment, id: &str, widget: &dyn DependencyWidget) -> Result<Environment> {
        tracing::info!(environment = %env.name, dependency = id, "removing dependency");
        self.runtime.run_tool(env, RuntimeTool::Uninstaller)?;

        let updated = self.store.modify(env, |current| {
            current.installed_dependencies.retain(|d| d != id);
            Ok(())
        })?;
        widget.show_installed(false);
        widget.set_install_sensitive(true);
        Ok(updated)
    }
}
