//! The `Cellar` facade: one object owning the component installer, the
//! environment store, the runtime and the dependency interpreter.
//!
//! Front-ends construct it once and call into it from their event handlers.
//! Operations that take a while come back as [`TaskHandle`]s.

use cellar_components::{
    build_client, Available, CellarPaths, ComponentCatalog, ComponentError, ComponentInstaller,
    ComponentKind, Connectivity, Feeds, HttpConnectivity, Notifier, Settings, StaticSettings,
    TaskHandle, TaskRunner, Ui,
};
use cellar_hwprof::StorageInfo;
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::command::{CommandComposer, HostGraphics};
use crate::dependencies::{DependencyCatalog, DependencyRepository, DependencyWidget, ManifestInterpreter};
use crate::environment::{CreateRequest, Environment, EnvironmentIndex, EnvironmentStore, Scope};
use crate::errors::{CoreError, Result};
use crate::runtime::{DxvkAction, ProcessSpawner, Runtime, Spawner};

const DEFAULT_PROBE_URL: &str = "https://github.com";

pub struct CellarConfig {
    pub paths: CellarPaths,
    pub feeds: Feeds,
    pub settings: Arc<dyn Settings>,
    pub host: HostGraphics,
    /// HEAD target for the connectivity check.
    pub probe_url: String,
}

impl CellarConfig {
    /// Paths, feeds and settings from the environment. Host graphics are
    /// left undetected; see [`detect_host`](Self::detect_host).
    pub fn from_env() -> Self {
        Self {
            paths: CellarPaths::from_env(),
            feeds: Feeds::from_env(),
            settings: Arc::new(StaticSettings::from_env()),
            host: HostGraphics::default(),
            probe_url: std::env::var("CELLAR_PROBE_URL").unwrap_or_else(|_| DEFAULT_PROBE_URL.to_string()),
        }
    }

    /// Fill in host graphics from the cached host profile, probing on a miss.
    pub fn detect_host(mut self) -> Self {
        match cellar_hwprof::load_or_detect(&self.paths.cache(), self.paths.root()) {
            Ok(profile) => {
                self.host = HostGraphics::from_profile(&profile);
                tracing::debug!(nvidia = self.host.nvidia, gpus = profile.gpus.len(), "host profile loaded");
            }
            Err(e) => tracing::warn!(error = %e, "host profiling failed, assuming no discrete adapter"),
        }
        self
    }
}

pub struct Cellar {
    paths: CellarPaths,
    ui: Arc<dyn Ui>,
    catalog: ComponentCatalog,
    store: Arc<EnvironmentStore>,
    runtime: Arc<Runtime>,
    interpreter: Arc<ManifestInterpreter>,
    tasks: TaskRunner,
}

impl Cellar {
    pub fn new(config: CellarConfig, ui: Arc<dyn Ui>) -> Result<Self> {
        let client = build_client()?;
        let connectivity = Arc::new(HttpConnectivity::new(client.clone(), config.probe_url.clone()));
        Self::with_parts(config, ui, client, connectivity, Arc::new(ProcessSpawner::new()))
    }

    /// Build from explicit collaborators.
    pub fn with_parts(
        config: CellarConfig,
        ui: Arc<dyn Ui>,
        client: Client,
        connectivity: Arc<dyn Connectivity>,
        spawner: Arc<dyn Spawner>,
    ) -> Result<Self> {
        let CellarConfig {
            paths,
            feeds,
            settings,
            host,
            ..
        } = config;
        paths.ensure()?;

        let notifier = Notifier::new(ui.clone(), settings);
        let installer = Arc::new(ComponentInstaller::new(
            paths.clone(),
            feeds.clone(),
            client.clone(),
            connectivity.clone(),
            notifier.clone(),
            ui.clone(),
        ));
        let runtime = Arc::new(Runtime::new(
            &paths,
            CommandComposer::new(&paths, host),
            spawner,
            notifier.clone(),
        ));
        let store = Arc::new(EnvironmentStore::new(paths.environments(), ui.clone(), notifier.clone()));
        let repository = Arc::new(DependencyRepository::new(client, feeds, connectivity));
        let interpreter = Arc::new(ManifestInterpreter::new(
            installer.clone(),
            repository,
            store.clone(),
            runtime.clone(),
            ui.clone(),
            notifier,
        ));

        Ok(Self {
            paths,
            ui,
            catalog: ComponentCatalog::new(installer),
            store,
            runtime,
            interpreter,
            tasks: TaskRunner::new(),
        })
    }

    pub fn paths(&self) -> &CellarPaths {
        &self.paths
    }

    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<EnvironmentStore> {
        &self.store
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn available(&self) -> Arc<Available> {
        self.catalog.available()
    }

    pub fn environments(&self) -> Arc<EnvironmentIndex> {
        self.store.snapshot()
    }

    pub fn environment(&self, name: &str) -> Result<Environment> {
        self.store.get(name)
    }

    /// Discover environments, re-index components (installing the newest
    /// ones into an empty store when `install_latest`) and clean staging.
    pub fn checks(&self, install_latest: bool) -> Result<()> {
        self.store.discover()?;
        self.catalog.check_runners(install_latest)?;
        self.catalog.check_dxvk(install_latest)?;
        self.catalog.clear_temp(false)?;
        self.ui.refresh_component_lists();
        Ok(())
    }

    pub fn async_checks(self: &Arc<Self>, install_latest: bool) -> TaskHandle<Result<()>> {
        let this = Arc::clone(self);
        self.tasks.run("checks", move || this.checks(install_latest))
    }

    pub fn install_component(&self, kind: ComponentKind, tag: &str, asset: &str) -> Result<TaskHandle<cellar_components::Result<()>>> {
        Ok(self.catalog.installer().install_component(kind, tag, asset)?)
    }

    /// Create on a background task. A missing runner or dxvk build starts
    /// the install-latest checks before the error is returned.
    pub fn create_environment(self: &Arc<Self>, req: CreateRequest) -> TaskHandle<Result<Environment>> {
        let this = Arc::clone(self);
        self.tasks.run("create_environment", move || {
            let available = this.available();
            let result = this.store.create(&req, &available, &this.runtime);
            if let Err(e) = &result {
                if matches!(e.component(), Some(ComponentError::MissingPrerequisite(_))) {
                    if let Err(check) = this.checks(true) {
                        tracing::error!(error = %check, "installing missing components failed");
                    }
                }
            }
            result
        })
    }

    pub fn delete_environment(self: &Arc<Self>, env: Environment) -> TaskHandle<Result<()>> {
        let this = Arc::clone(self);
        self.tasks.run("delete_environment", move || this.store.delete(&env))
    }

    pub fn repair_environment(&self, env: &Environment) -> Result<Environment> {
        self.store.repair(env, &self.available(), &self.runtime)
    }

    pub fn update_field(&self, env: &Environment, key: &str, value: Value, scope: Scope) -> Result<Environment> {
        self.store.update_field(env, key, value, scope)
    }

    pub fn dependency_index(&self) -> Result<Arc<DependencyCatalog>> {
        self.interpreter.repository().fetch_index()
    }

    pub fn install_dependency(
        &self,
        env: Environment,
        id: &str,
        widget: Arc<dyn DependencyWidget>,
    ) -> Result<TaskHandle<Result<Environment>>> {
        self.interpreter.apply_async(env, id, widget)
    }

    pub fn remove_dependency(&self, env: &Environment, id: &str, widget: &dyn DependencyWidget) -> Result<Environment> {
        self.interpreter.revert(env, id, widget)
    }

    /// Run the newest dxvk build's setup script and record the toggle.
    pub fn install_dxvk(&self, env: &Environment) -> Result<Environment> {
        self.setup_dxvk(env, DxvkAction::Install)
    }

    pub fn remove_dxvk(&self, env: &Environment) -> Result<Environment> {
        self.setup_dxvk(env, DxvkAction::Uninstall)
    }

    fn setup_dxvk(&self, env: &Environment, action: DxvkAction) -> Result<Environment> {
        let available = self.available();
        let version = available
            .dxvk
            .first()
            .ok_or(ComponentError::MissingPrerequisite(ComponentKind::GraphicsShim))?;
        if !self.runtime.setup_dxvk(env, version, action)?.wait()? {
            return Err(CoreError::Msg(format!("dxvk setup failed for `{}`", env.name)));
        }
        self.store.update_field(
            env,
            "dxvk",
            json!(action == DxvkAction::Install),
            Scope::Parameters,
        )
    }

    /// Record the toggle and write the matching registry value.
    pub fn toggle_virtual_desktop(&self, env: &Environment, enabled: bool) -> Result<Environment> {
        let updated = self
            .store
            .update_field(env, "virtual_desktop", json!(enabled), Scope::Parameters)?;
        self.runtime
            .toggle_virtual_desktop(&updated, enabled, &updated.parameters.virtual_desktop_res)?;
        Ok(updated)
    }

    pub fn environment_size(&self, env: &Environment) -> u64 {
        self.store.size(env)
    }

    /// Space on the filesystem holding the data root.
    pub fn disk_usage(&self) -> StorageInfo {
        cellar_hwprof::storage_info(self.paths.root())
    }

    pub fn programs(&self, env: &Environment) -> BTreeMap<String, String> {
        self.store.programs(env)
    }

    pub fn clear_temp(&self, force: bool) -> Result<usize> {
        Ok(self.catalog.clear_temp(force)?)
    }
}
