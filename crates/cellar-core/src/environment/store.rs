use cellar_components::{
    Available, ComponentError, ComponentKind, CreationStatus, Notifier, Ui,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use super::{discover_programs, Environment, Preset, Scope};
use crate::errors::{CoreError, Result};
use crate::runtime::{DxvkAction, Runtime, RuntimeTool};

/// Record file inside each environment directory.
pub const CONFIG_FILE: &str = "environment.json";

/// Name -> storage path of environments living outside the store root.
/// Kept as a file in the store root.
pub const CUSTOM_PATHS_FILE: &str = "custom_paths.json";

/// Directory name (or display name, for custom paths) -> record.
pub type EnvironmentIndex = BTreeMap<String, Environment>;

type CustomPaths = BTreeMap<String, PathBuf>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub preset: Preset,
    /// Explicit storage location. `None` derives it from the name.
    pub path: Option<PathBuf>,
    /// Runner to bind. `None` picks the newest installed one.
    pub runner: Option<String>,
}

impl CreateRequest {
    pub fn new(name: impl Into<String>, preset: Preset) -> Self {
        Self {
            name: name.into(),
            preset,
            path: None,
            runner: None,
        }
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

fn index_key(env: &Environment) -> String {
    if env.custom_path {
        env.name.clone()
    } else {
        env.path.clone()
    }
}

/// Owns every environment record under one store root.
///
/// The in-memory index is only ever replaced wholesale. Record writes and
/// index swaps are serialized through one writer lock.
pub struct EnvironmentStore {
    root: PathBuf,
    index: RwLock<Arc<EnvironmentIndex>>,
    writer: Mutex<()>,
    ui: Arc<dyn Ui>,
    notifier: Notifier,
}

impl EnvironmentStore {
    pub fn new(root: impl Into<PathBuf>, ui: Arc<dyn Ui>, notifier: Notifier) -> Self {
        Self {
            root: root.into(),
            index: RwLock::new(Arc::new(EnvironmentIndex::new())),
            writer: Mutex::new(()),
            ui,
            notifier,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot(&self) -> Arc<EnvironmentIndex> {
        self.index.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn get(&self, name: &str) -> Result<Environment> {
        let snap = self.snapshot();
        snap.get(name)
            .or_else(|| snap.values().find(|e| e.name == name))
            .cloned()
            .ok_or_else(|| CoreError::UnknownEnvironment(name.to_string()))
    }

    pub fn storage_path(&self, env: &Environment) -> PathBuf {
        env.storage_path(&self.root)
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn swap(&self, next: EnvironmentIndex) -> Arc<EnvironmentIndex> {
        let next = Arc::new(next);
        *self.index.write().unwrap_or_else(|e| e.into_inner()) = next.clone();
        next
    }

    /// Rebuild the index from disk: every directory under the root plus the
    /// registered custom paths. Unreadable records become broken placeholders.
    pub fn discover(&self) -> Result<Arc<EnvironmentIndex>> {
        let _writer = self.lock_writer();
        let mut next = EnvironmentIndex::new();

        if self.root.is_dir() {
            for entry in fs::read_dir(&self.root)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let dir_name = entry.file_name().to_string_lossy().into_owned();
                let env = match read_record(&entry.path().join(CONFIG_FILE)) {
                    Ok(env) => env,
                    Err(e) => {
                        tracing::warn!(environment = %dir_name, error = %e, "unreadable record, marking broken");
                        Environment::broken_placeholder(&dir_name)
                    }
                };
                next.insert(dir_name, env);
            }
        }

        for (name, path) in self.custom_paths() {
            let env = match read_record(&path.join(CONFIG_FILE)) {
                Ok(env) => env,
                Err(e) => {
                    tracing::warn!(environment = %name, path = %path.display(), error = %e, "unreadable record, marking broken");
                    Environment {
                        path: path.display().to_string(),
                        custom_path: true,
                        ..Environment::broken_placeholder(&name)
                    }
                }
            };
            next.insert(name, env);
        }

        if !next.is_empty() {
            let names: Vec<&str> = next.keys().map(String::as_str).collect();
            tracing::info!(found = %names.join(", "), "environments found");
        }
        Ok(self.swap(next))
    }

    fn custom_paths(&self) -> CustomPaths {
        let path = self.root.join(CUSTOM_PATHS_FILE);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable custom path registry");
                CustomPaths::new()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => CustomPaths::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read custom path registry");
                CustomPaths::new()
            }
        }
    }

    /// Caller holds the writer lock.
    fn edit_custom_paths(&self, edit: impl FnOnce(&mut CustomPaths)) -> Result<()> {
        let mut paths = self.custom_paths();
        edit(&mut paths);
        write_json(&self.root, CUSTOM_PATHS_FILE, &paths)
    }

    /// Caller holds the writer lock.
    fn write_record(&self, env: &Environment) -> Result<()> {
        if env.path.is_empty() {
            return Err(CoreError::InvalidField {
                key: "Path".into(),
                reason: "empty".into(),
            });
        }
        write_json(&self.storage_path(env), CONFIG_FILE, env)
    }

    fn persist(&self, env: &Environment) -> Result<()> {
        let _writer = self.lock_writer();
        self.write_record(env)
    }

    /// The freshest copy of `env`: its record on disk, else the indexed
    /// entry, else `env` itself.
    fn current(&self, env: &Environment) -> Environment {
        match read_record(&self.storage_path(env).join(CONFIG_FILE)) {
            Ok(found) => found,
            Err(_) => self
                .snapshot()
                .get(&index_key(env))
                .cloned()
                .unwrap_or_else(|| env.clone()),
        }
    }

    /// Apply `change` to the current record and write it back. Read, change
    /// and write all happen under the writer lock.
    pub fn modify<F>(&self, env: &Environment, change: F) -> Result<Environment>
    where
        F: FnOnce(&mut Environment) -> Result<()>,
    {
        let next = {
            let _writer = self.lock_writer();
            let mut next = self.current(env);
            change(&mut next)?;
            self.write_record(&next)?;

            let mut index = (*self.snapshot()).clone();
            index.insert(index_key(&next), next.clone());
            self.swap(index);
            next
        };
        self.ui.refresh_environment_list();
        Ok(next)
    }

    /// Set one field and rewrite the whole record.
    pub fn update_field(&self, env: &Environment, key: &str, value: Value, scope: Scope) -> Result<Environment> {
        tracing::info!(environment = %env.name, key, %value, ?scope, "setting parameter");
        self.modify(env, |current| current.set_field(key, value, scope))
    }

    /// Create, bootstrap and register a new environment. Blocking.
    pub fn create(&self, req: &CreateRequest, available: &Available, runtime: &Runtime) -> Result<Environment> {
        tracing::info!(name = %req.name, preset = %req.preset, "creating environment");

        let missing = if available.runners.is_empty() {
            Some(ComponentKind::Runner)
        } else if available.dxvk.is_empty() {
            Some(ComponentKind::GraphicsShim)
        } else {
            None
        };
        if let Some(kind) = missing {
            tracing::warn!(%kind, "prerequisite component missing");
            self.ui
                .append_output("Runner and/or dxvk not found, installing latest version…\n");
            self.ui.show_component_preferences();
            return Err(ComponentError::MissingPrerequisite(kind).into());
        }

        self.ui.set_ui_enabled(false);
        self.ui.set_creation_status(CreationStatus::Creating);

        match self.create_inner(req, available, runtime) {
            Ok(env) => {
                tracing::info!(name = %env.name, "environment created");
                self.ui.append_output(&format!(
                    "\nYour new environment `{}` is now ready!",
                    env.name
                ));
                self.ui.set_creation_status(CreationStatus::Created);
                self.ui.set_ui_enabled(true);
                self.discover()?;
                self.ui.refresh_environment_list();
                Ok(env)
            }
            Err(e) => {
                tracing::error!(name = %req.name, error = %e, "environment creation failed");
                self.ui.set_creation_status(CreationStatus::Failed);
                self.notifier
                    .error("Cellar", &format!("Creation of `{}` failed: {e}", req.name));
                self.ui.set_ui_enabled(true);
                Err(e)
            }
        }
    }

    fn create_inner(&self, req: &CreateRequest, available: &Available, runtime: &Runtime) -> Result<Environment> {
        let dir_name = req.name.replace(' ', "-");
        let (path_field, custom_path, storage) = match &req.path {
            Some(p) => (p.display().to_string(), true, p.clone()),
            None => (dir_name.clone(), false, self.root.join(&dir_name)),
        };
        if storage.join(CONFIG_FILE).exists()
            || (custom_path && self.custom_paths().contains_key(&req.name))
        {
            return Err(CoreError::EnvironmentExists(req.name.clone()));
        }
        let runner = req
            .runner
            .clone()
            .or_else(|| available.runners.first().cloned())
            .ok_or(CoreError::NoRunnerAvailable)?;

        fs::create_dir_all(&storage)?;
        self.ui
            .append_output("The runtime configuration is being updated…\n");
        let output = runtime.bootstrap(&storage, &runner)?;
        self.ui.append_output(&output);

        self.ui.append_output("\nGenerating environment configuration…");
        let mut env = Environment::new(&req.name, &runner, &path_field, req.preset);
        env.custom_path = custom_path;
        env.creation_date = today();
        env.update_date = env.creation_date.clone();

        self.ui.append_output(&format!(
            "\nApplying `{}` environment configuration..",
            req.preset
        ));
        req.preset.overlay().apply(&mut env.parameters);

        {
            let _writer = self.lock_writer();
            self.write_record(&env)?;
            if custom_path {
                self.edit_custom_paths(|paths| {
                    paths.insert(req.name.clone(), storage.clone());
                })?;
            }
        }

        if env.parameters.dxvk {
            if let Some(version) = available.dxvk.first() {
                self.ui.append_output("\nInstalling dxvk…");
                if !runtime.setup_dxvk(&env, version, DxvkAction::Install)?.wait()? {
                    tracing::warn!(environment = %env.name, "dxvk setup exited with failure");
                }
            }
        }
        Ok(env)
    }

    /// Replace the record with a fresh default in the same storage location
    /// and re-run the boot sequence.
    pub fn repair(&self, env: &Environment, available: &Available, runtime: &Runtime) -> Result<Environment> {
        tracing::info!(environment = %env.name, path = %env.path, "repairing");
        let runner = available
            .runners
            .first()
            .ok_or(CoreError::NoRunnerAvailable)?;

        let mut fresh = Environment::new(&env.name, runner, &env.path, Preset::Custom);
        fresh.custom_path = env.custom_path;
        fresh.creation_date = today();
        fresh.update_date = fresh.creation_date.clone();

        self.persist(&fresh)?;
        runtime.run_tool(&fresh, RuntimeTool::Update)?;
        self.discover()?;
        self.ui.refresh_environment_list();
        Ok(fresh)
    }

    /// Remove the environment's directory tree.
    pub fn delete(&self, env: &Environment) -> Result<()> {
        if env.path.is_empty() {
            tracing::error!(environment = %env.name, "empty path found, refusing to delete");
            return Err(CoreError::EmptyDestructivePath(env.name.clone()));
        }
        let path = self.storage_path(env);
        if path == self.root || path.parent().is_none() {
            tracing::error!(environment = %env.name, path = %path.display(), "path resolves to a root, refusing to delete");
            return Err(CoreError::EmptyDestructivePath(env.name.clone()));
        }

        fs::remove_dir_all(&path)?;
        tracing::info!(path = %path.display(), "environment deleted");
        if env.custom_path {
            let _writer = self.lock_writer();
            self.edit_custom_paths(|paths| {
                paths.remove(&env.name);
            })?;
        }
        self.discover()?;
        self.ui.refresh_environment_list();
        Ok(())
    }

    /// Total bytes of regular files under the environment.
    pub fn size(&self, env: &Environment) -> u64 {
        WalkDir::new(self.storage_path(env))
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum()
    }

    pub fn programs(&self, env: &Environment) -> BTreeMap<String, String> {
        discover_programs(&self.storage_path(env))
    }
}

fn read_record(path: &Path) -> Result<Environment> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_json<T: Serialize + ?Sized>(dir: &Path, file_name: &str, value: &T) -> Result<()> {
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(tmp.as_file_mut(), value)?;
    tmp.persist(dir.join(file_name)).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandComposer, HostGraphics};
    use crate::environment::strategies::arb_parameters;
    use crate::runtime::{RecordingSpawner, SpawnMode};
    use cellar_components::{CellarPaths, RecordingUi, StaticSettings, UiEvent};
    use proptest::prelude::*;
    use serde_json::json;
    use std::thread;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        tmp: TempDir,
        ui: Arc<RecordingUi>,
        spawner: Arc<RecordingSpawner>,
        store: EnvironmentStore,
        runtime: Runtime,
    }

    fn fixture() -> Fixture {
        let tmp = tempdir().expect("tempdir");
        let paths = CellarPaths::new(tmp.path());
        paths.ensure().expect("ensure");
        let ui = RecordingUi::new();
        let notifier = Notifier::new(
            ui.clone(),
            Arc::new(StaticSettings {
                notifications: true,
                temp_cleanup: false,
            }),
        );
        let spawner = RecordingSpawner::new().with_output("wine: configuration updated\n");
        let runtime = Runtime::new(
            &paths,
            CommandComposer::new(&paths, HostGraphics::default()),
            spawner.clone(),
            notifier.clone(),
        );
        let store = EnvironmentStore::new(paths.environments(), ui.clone(), notifier);
        Fixture {
            tmp,
            ui,
            spawner,
            store,
            runtime,
        }
    }

    fn available() -> Available {
        Available {
            runners: vec!["lutris-6.0".into(), "lutris-5.0".into()],
            dxvk: vec!["dxvk-1.8".into()],
        }
    }

    fn write_env(store: &EnvironmentStore, env: &Environment) {
        store.persist(env).expect("persist");
    }

    #[test]
    fn discover_marks_unreadable_records_broken() -> Result<()> {
        let fx = fixture();
        write_env(&fx.store, &Environment::new("Good", "lutris-6.0", "Good", Preset::Software));
        fs::create_dir(fx.store.root().join("NoRecord"))?;
        fs::create_dir(fx.store.root().join("Corrupt"))?;
        fs::write(fx.store.root().join("Corrupt").join(CONFIG_FILE), b"{not json")?;

        let index = fx.store.discover()?;
        assert_eq!(index.len(), 3);
        assert!(!index["Good"].broken);
        for name in ["NoRecord", "Corrupt"] {
            let env = &index[name];
            assert!(env.broken);
            assert_eq!(env.name, name);
            assert_eq!(env.preset, Preset::Undefined);
        }
        Ok(())
    }

    #[test]
    fn discover_replaces_the_index() -> Result<()> {
        let fx = fixture();
        write_env(&fx.store, &Environment::new("A", "r", "A", Preset::Custom));
        write_env(&fx.store, &Environment::new("B", "r", "B", Preset::Custom));
        assert_eq!(fx.store.discover()?.len(), 2);

        fs::remove_dir_all(fx.store.root().join("A"))?;
        let index = fx.store.discover()?;
        assert_eq!(index.keys().collect::<Vec<_>>(), vec!["B"]);
        Ok(())
    }

    /// Every settable root field except the two that relocate the record.
    fn arb_root_fields() -> impl Strategy<Value = Vec<(&'static str, Value)>> {
        (
            "[A-Za-z][A-Za-z0-9 ]{0,15}",
            "(lutris|Proton)-[0-9]\\.[0-9]",
            prop_oneof![Just(Preset::Gaming), Just(Preset::Software), Just(Preset::Custom)],
            "20[0-9]{2}-[01][0-9]-[0-3][0-9]",
            "20[0-9]{2}-[01][0-9]-[0-3][0-9]",
            proptest::collection::vec("[a-z0-9_]{1,12}", 0..4),
            proptest::collection::btree_map("[A-Za-z ]{1,10}", "C:/[a-z/]{1,10}\\.exe", 0..3),
            arb_parameters(),
        )
            .prop_map(|(name, runner, preset, created, updated, deps, programs, params)| {
                vec![
                    ("Name", json!(name)),
                    ("Runner", json!(runner)),
                    ("Environment", json!(preset)),
                    ("Creation_Date", json!(created)),
                    ("Update_Date", json!(updated)),
                    ("Installed_Dependencies", json!(deps)),
                    ("Programs", json!(programs)),
                    ("Parameters", json!(params)),
                ]
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn every_field_round_trips_through_discover(
            root in arb_root_fields(),
            params in arb_parameters(),
        ) {
            let fx = fixture();
            let mut current = Environment::new("Office", "lutris-6.0", "Office", Preset::Software);
            write_env(&fx.store, &current);

            let params_doc = serde_json::to_value(&params).expect("params");
            let param_fields = params_doc.as_object().expect("object");
            prop_assert_eq!(param_fields.len(), 11);

            let cases = root
                .into_iter()
                .map(|(k, v)| (k.to_string(), v, Scope::Root))
                .chain(
                    param_fields
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone(), Scope::Parameters)),
                );
            for (key, value, scope) in cases {
                current = fx
                    .store
                    .update_field(&current, &key, value.clone(), scope)
                    .expect("update");
                let found = fx.store.discover().expect("discover")["Office"].clone();
                let doc = serde_json::to_value(&found).expect("doc");
                let got = match scope {
                    Scope::Root => doc[key.as_str()].clone(),
                    Scope::Parameters => doc["Parameters"][key.as_str()].clone(),
                };
                prop_assert_eq!(got, value, "{}", key);
            }
            prop_assert!(fx.ui.events().contains(&UiEvent::EnvironmentListRefreshed));
        }
    }

    #[test]
    fn stale_copies_do_not_drop_earlier_updates() -> Result<()> {
        let fx = fixture();
        let env = Environment::new("Office", "lutris-6.0", "Office", Preset::Software);
        write_env(&fx.store, &env);

        fx.store.update_field(&env, "esync", json!(true), Scope::Parameters)?;
        let latest = fx.store.update_field(&env, "dxvk", json!(true), Scope::Parameters)?;
        assert!(latest.parameters.esync && latest.parameters.dxvk);

        let found = fx.store.discover()?["Office"].clone();
        assert!(found.parameters.esync && found.parameters.dxvk);
        Ok(())
    }

    #[test]
    fn concurrent_updates_keep_every_field() -> Result<()> {
        let fx = fixture();
        let env = Environment::new("Office", "lutris-6.0", "Office", Preset::Software);
        write_env(&fx.store, &env);

        let keys = ["dxvk", "esync", "fsync", "aco_compiler", "discrete_gpu", "pulseaudio_latency"];
        thread::scope(|s| -> Result<()> {
            let workers: Vec<_> = keys
                .iter()
                .map(|key| {
                    let store = &fx.store;
                    let stale = &env;
                    s.spawn(move || store.update_field(stale, key, json!(true), Scope::Parameters))
                })
                .collect();
            for worker in workers {
                worker.join().expect("worker")?;
            }
            Ok(())
        })?;

        let found = fx.store.discover()?["Office"].clone();
        let doc = serde_json::to_value(&found.parameters)?;
        for key in keys {
            assert_eq!(doc[key], true, "{key}");
        }
        Ok(())
    }

    #[test]
    fn delete_with_empty_path_touches_nothing() -> Result<()> {
        let fx = fixture();
        write_env(&fx.store, &Environment::new("Keep", "r", "Keep", Preset::Custom));
        let mut victim = Environment::new("Ghost", "r", "", Preset::Custom);

        assert!(matches!(
            fx.store.delete(&victim),
            Err(CoreError::EmptyDestructivePath(_))
        ));
        victim.custom_path = true;
        victim.path = "/".into();
        assert!(matches!(
            fx.store.delete(&victim),
            Err(CoreError::EmptyDestructivePath(_))
        ));
        assert!(fx.store.root().join("Keep").join(CONFIG_FILE).is_file());
        Ok(())
    }

    #[test]
    fn delete_removes_tree_and_reindexes() -> Result<()> {
        let fx = fixture();
        let env = Environment::new("Doomed", "r", "Doomed", Preset::Custom);
        write_env(&fx.store, &env);
        fs::create_dir_all(fx.store.root().join("Doomed/drive_c/windows"))?;
        fx.store.discover()?;

        fx.store.delete(&env)?;
        assert!(!fx.store.root().join("Doomed").exists());
        assert!(fx.store.snapshot().is_empty());
        Ok(())
    }

    #[test]
    fn create_gaming_environment_applies_overlay() -> Result<()> {
        let fx = fixture();
        let env = fx.store.create(
            &CreateRequest::new("Test Game", Preset::Gaming),
            &available(),
            &fx.runtime,
        )?;

        assert_eq!(env.path, "Test-Game");
        assert!(!env.custom_path);
        assert_eq!(env.runner, "lutris-6.0");
        let p = &env.parameters;
        assert!(p.dxvk && p.esync && p.discrete_gpu && p.pulseaudio_latency);
        assert!(!p.fsync);

        let on_disk: Value = serde_json::from_slice(&fs::read(
            fx.store.root().join("Test-Game").join(CONFIG_FILE),
        )?)?;
        assert_eq!(on_disk["Path"], "Test-Game");
        assert_eq!(on_disk["Custom_Path"], false);
        assert_eq!(on_disk["Environment"], "gaming");
        assert_eq!(on_disk["Parameters"]["dxvk"], true);
        assert_eq!(on_disk["Parameters"]["esync"], true);
        assert_eq!(on_disk["Parameters"]["discrete_gpu"], true);
        assert_eq!(on_disk["Parameters"]["pulseaudio_latency"], true);
        assert_eq!(on_disk["Creation_Date"], on_disk["Update_Date"]);

        let calls = fx.spawner.calls();
        assert_eq!(calls[0].0, SpawnMode::Capture);
        assert_eq!(calls[0].1.args, vec!["wineboot"]);
        assert_eq!(calls[0].1.env_var("WINEARCH"), Some("win64"));
        assert!(calls[1].1.program.ends_with("dxvk-1.8/setup_dxvk.sh"));

        let events = fx.ui.events();
        assert!(events.contains(&UiEvent::Output("wine: configuration updated\n".into())));
        assert!(events.contains(&UiEvent::CreationStatus(CreationStatus::Created)));
        assert_eq!(events.last(), Some(&UiEvent::EnvironmentListRefreshed));
        assert!(fx.store.get("Test Game").is_ok());
        Ok(())
    }

    #[test]
    fn create_with_custom_path() -> Result<()> {
        let fx = fixture();
        let target = fx.tmp.path().join("elsewhere/prefix");
        let mut req = CreateRequest::new("Elsewhere", Preset::Custom);
        req.path = Some(target.clone());
        req.runner = Some("lutris-5.0".into());

        let env = fx.store.create(&req, &available(), &fx.runtime)?;
        assert!(env.custom_path);
        assert_eq!(env.runner, "lutris-5.0");
        assert!(target.join(CONFIG_FILE).is_file());
        // custom preset leaves dxvk off, so only the bootstrap ran
        assert_eq!(fx.spawner.calls().len(), 1);

        assert!(fx.store.get("Elsewhere").is_ok());
        assert!(fx.store.discover()?.contains_key("Elsewhere"));
        assert!(!fx.store.root().join("Elsewhere").exists());

        fx.store.delete(&env)?;
        assert!(!target.exists());
        assert!(fx.store.get("Elsewhere").is_err());
        assert!(fx.store.discover()?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_custom_path_shows_up_broken() -> Result<()> {
        let fx = fixture();
        let target = fx.tmp.path().join("usb/prefix");
        let mut req = CreateRequest::new("Portable", Preset::Custom);
        req.path = Some(target.clone());
        fx.store.create(&req, &available(), &fx.runtime)?;

        fs::remove_dir_all(&target)?;
        let env = fx.store.discover()?["Portable"].clone();
        assert!(env.broken);
        assert!(env.custom_path);
        assert_eq!(fx.store.storage_path(&env), target);
        Ok(())
    }

    #[test]
    fn create_refuses_an_existing_name() -> Result<()> {
        let fx = fixture();
        let first = fx.store.create(
            &CreateRequest::new("Test Game", Preset::Gaming),
            &available(),
            &fx.runtime,
        )?;
        let first = fx.store.update_field(
            &first,
            "Installed_Dependencies",
            json!(["vcredist2019"]),
            Scope::Root,
        )?;
        let calls = fx.spawner.calls().len();

        let err = fx
            .store
            .create(&CreateRequest::new("Test Game", Preset::Software), &available(), &fx.runtime)
            .expect_err("duplicate");
        assert!(matches!(err, CoreError::EnvironmentExists(ref name) if name == "Test Game"));
        assert_eq!(fx.spawner.calls().len(), calls);

        let kept = fx.store.discover()?["Test-Game"].clone();
        assert_eq!(kept.installed_dependencies, first.installed_dependencies);
        assert_eq!(kept.preset, Preset::Gaming);
        Ok(())
    }

    #[test]
    fn create_without_components_redirects() {
        let fx = fixture();
        let err = fx
            .store
            .create(
                &CreateRequest::new("Nope", Preset::Gaming),
                &Available {
                    runners: vec!["lutris-6.0".into()],
                    dxvk: Vec::new(),
                },
                &fx.runtime,
            )
            .expect_err("dxvk missing");
        assert!(matches!(
            err.component(),
            Some(ComponentError::MissingPrerequisite(ComponentKind::GraphicsShim))
        ));
        assert!(fx.spawner.calls().is_empty());
        assert!(!fx.store.root().join("Nope").exists());
        assert!(fx.ui.events().contains(&UiEvent::ComponentPreferencesShown));
    }

    #[test]
    fn failed_bootstrap_reenables_ui_and_registers_nothing() -> Result<()> {
        let fx = fixture();
        fx.spawner.fail_capture();
        assert!(fx
            .store
            .create(&CreateRequest::new("Broken", Preset::Software), &available(), &fx.runtime)
            .is_err());

        let events = fx.ui.events();
        assert!(events.contains(&UiEvent::CreationStatus(CreationStatus::Failed)));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, UiEvent::UiEnabled(_)))
                .last(),
            Some(&UiEvent::UiEnabled(true))
        );
        assert!(fx.store.snapshot().is_empty());
        Ok(())
    }

    #[test]
    fn repair_writes_fresh_custom_record_and_reboots() -> Result<()> {
        let fx = fixture();
        fs::create_dir(fx.store.root().join("Damaged"))?;
        let broken = fx.store.discover()?["Damaged"].clone();
        assert!(broken.broken);

        let fixed = fx.store.repair(&broken, &available(), &fx.runtime)?;
        assert!(!fixed.broken);
        assert_eq!(fixed.preset, Preset::Custom);
        assert_eq!(fixed.runner, "lutris-6.0");
        assert!(!fx.store.snapshot()["Damaged"].broken);
        assert_eq!(fx.spawner.arg_lines(), vec!["wineboot -u"]);
        Ok(())
    }

    #[test]
    fn repair_rewrites_the_record_in_its_own_directory() -> Result<()> {
        let fx = fixture();
        fx.store.create(
            &CreateRequest::new("Test Game", Preset::Gaming),
            &available(),
            &fx.runtime,
        )?;
        fs::write(fx.store.root().join("Test-Game").join(CONFIG_FILE), b"{truncated")?;
        let broken = fx.store.discover()?["Test-Game"].clone();
        assert!(broken.broken);

        let fixed = fx.store.repair(&broken, &available(), &fx.runtime)?;
        assert_eq!(fixed.path, "Test-Game");

        let mut dirs: Vec<String> = fs::read_dir(fx.store.root())?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        dirs.sort();
        assert_eq!(dirs, vec!["Test-Game"]);
        let index = fx.store.snapshot();
        assert_eq!(index.len(), 1);
        assert!(!index["Test-Game"].broken);
        Ok(())
    }

    #[test]
    fn repair_keeps_a_custom_path() -> Result<()> {
        let fx = fixture();
        let target = fx.tmp.path().join("games/prefix");
        let mut req = CreateRequest::new("Elsewhere", Preset::Custom);
        req.path = Some(target.clone());
        fx.store.create(&req, &available(), &fx.runtime)?;
        fs::remove_file(target.join(CONFIG_FILE))?;
        let broken = fx.store.discover()?["Elsewhere"].clone();

        let fixed = fx.store.repair(&broken, &available(), &fx.runtime)?;
        assert!(fixed.custom_path);
        assert!(target.join(CONFIG_FILE).is_file());
        assert!(!fx.store.root().join("Elsewhere").exists());
        assert!(!fx.store.snapshot()["Elsewhere"].broken);
        Ok(())
    }

    #[test]
    fn size_sums_regular_files() -> Result<()> {
        let fx = fixture();
        let env = Environment::new("Sized", "r", "Sized", Preset::Custom);
        fs::create_dir_all(fx.store.root().join("Sized/drive_c"))?;
        fs::write(fx.store.root().join("Sized/drive_c/a.bin"), vec![0u8; 1000])?;
        fs::write(fx.store.root().join("Sized/b.bin"), vec![0u8; 24])?;
        assert_eq!(fx.store.size(&env), 1024);
        Ok(())
    }
}
