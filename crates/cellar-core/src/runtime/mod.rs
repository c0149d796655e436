//! Running things inside an environment: tools, installers, registry edits,
//! DLL overrides and the graphics shim setup script.

mod spawner;

pub use spawner::{ProcessHandle, ProcessSpawner, Spawner};
#[cfg(any(test, feature = "testing"))]
pub use spawner::{RecordingSpawner, SpawnMode};

use cellar_components::{icons, CellarPaths, Notifier};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::command::{CommandComposer, Invocation};
use crate::environment::Environment;
use crate::errors::{CoreError, Result};

pub const VIRTUAL_DESKTOP_KEY: &str = r"HKEY_CURRENT_USER\Software\Wine\Explorer\Desktops";

/// Suffix of the copy kept when a DLL is overridden.
pub const DLL_BACKUP_SUFFIX: &str = ".old";

/// Built-in runner tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeTool {
    Boot,
    Update,
    Config,
    Debug,
    Console,
    TaskManager,
    ControlPanel,
    Uninstaller,
    Regedit,
}

impl RuntimeTool {
    pub fn args(self) -> &'static [&'static str] {
        match self {
            RuntimeTool::Boot => &["wineboot"],
            RuntimeTool::Update => &["wineboot", "-u"],
            RuntimeTool::Config => &["winecfg"],
            RuntimeTool::Debug => &["winedbg"],
            RuntimeTool::Console => &["wineconsole", "cmd"],
            RuntimeTool::TaskManager => &["taskmgr"],
            RuntimeTool::ControlPanel => &["control"],
            RuntimeTool::Uninstaller => &["uninstaller"],
            RuntimeTool::Regedit => &["regedit"],
        }
    }

    pub fn needs_terminal(self) -> bool {
        matches!(self, RuntimeTool::Debug)
    }
}

impl std::str::FromStr for RuntimeTool {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "boot" | "wineboot" => RuntimeTool::Boot,
            "update" => RuntimeTool::Update,
            "config" | "winecfg" => RuntimeTool::Config,
            "debug" | "winedbg" => RuntimeTool::Debug,
            "console" | "cmd" => RuntimeTool::Console,
            "taskmanager" | "taskmgr" => RuntimeTool::TaskManager,
            "controlpanel" | "control" => RuntimeTool::ControlPanel,
            "uninstaller" => RuntimeTool::Uninstaller,
            "regedit" => RuntimeTool::Regedit,
            other => return Err(format!("unknown tool: {other}")),
        })
    }
}

/// Power actions delivered through `wineboot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Shutdown,
    Reboot,
    Kill,
}

impl PowerAction {
    fn flag(self) -> &'static str {
        match self {
            PowerAction::Shutdown => "-s",
            PowerAction::Reboot => "-r",
            PowerAction::Kill => "-k",
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PowerAction::Shutdown => "shutdown",
            PowerAction::Reboot => "reboot",
            PowerAction::Kill => "kill",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DxvkAction {
    Install,
    Uninstall,
}

impl DxvkAction {
    fn as_str(self) -> &'static str {
        match self {
            DxvkAction::Install => "install",
            DxvkAction::Uninstall => "uninstall",
        }
    }
}

/// Which system directory a DLL override lands in: 32-bit overrides go to
/// `system32`, 64-bit ones to `syswow64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DllArch {
    Bits32,
    Bits64,
}

impl DllArch {
    pub fn system_dir(self) -> &'static str {
        match self {
            DllArch::Bits32 => "system32",
            DllArch::Bits64 => "syswow64",
        }
    }
}

impl std::str::FromStr for DllArch {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "32" | "system32" => Ok(DllArch::Bits32),
            "64" | "syswow64" => Ok(DllArch::Bits64),
            other => Err(format!("unknown arch: {other}")),
        }
    }
}

/// A wine process as listed by `ps`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningProcess {
    pub pid: u32,
    pub pmem: String,
    pub pcpu: String,
    pub stime: String,
    pub time: String,
    pub cmd: String,
}

impl RunningProcess {
    fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_start();
        let mut fields = [""; 5];
        for slot in fields.iter_mut() {
            let end = rest.find(char::is_whitespace)?;
            *slot = &rest[..end];
            rest = rest[end..].trim_start();
        }
        let cmd = rest.trim_end();
        if !cmd.contains("wine") {
            return None;
        }
        Some(Self {
            pid: fields[0].parse().ok()?,
            pmem: fields[1].to_string(),
            pcpu: fields[2].to_string(),
            stime: fields[3].to_string(),
            time: fields[4].to_string(),
            cmd: cmd.to_string(),
        })
    }
}

/// Composer plus process host.
pub struct Runtime {
    composer: CommandComposer,
    spawner: Arc<dyn Spawner>,
    dxvk_root: PathBuf,
    notifier: Notifier,
}

impl Runtime {
    pub fn new(
        paths: &CellarPaths,
        composer: CommandComposer,
        spawner: Arc<dyn Spawner>,
        notifier: Notifier,
    ) -> Self {
        Self {
            composer,
            spawner,
            dxvk_root: paths.dxvk(),
            notifier,
        }
    }

    pub fn composer(&self) -> &CommandComposer {
        &self.composer
    }

    pub fn spawner(&self) -> &Arc<dyn Spawner> {
        &self.spawner
    }

    /// Runner with `args` in the environment.
    pub fn run_command(&self, env: &Environment, args: &[&str], terminal: bool) -> Result<ProcessHandle> {
        let inv = self.composer.compose(env).invocation(args.iter().copied());
        if terminal {
            self.spawner.spawn_in_terminal(&inv)
        } else {
            self.spawner.spawn(&inv)
        }
    }

    pub fn run_tool(&self, env: &Environment, tool: RuntimeTool) -> Result<ProcessHandle> {
        tracing::info!(environment = %env.name, ?tool, "running tool");
        self.run_command(env, tool.args(), tool.needs_terminal())
    }

    /// `.msi` files go through `msiexec /i`, anything else is run directly.
    pub fn run_executable(&self, env: &Environment, file: &Path, arguments: Option<&str>) -> Result<ProcessHandle> {
        tracing::info!(environment = %env.name, file = %file.display(), "running executable");
        let file_str = file.display().to_string();
        let is_msi = file
            .extension()
            .map(|e| e.eq_ignore_ascii_case("msi"))
            .unwrap_or(false);

        let mut args: Vec<&str> = if is_msi {
            vec!["msiexec", "/i", file_str.as_str()]
        } else {
            vec![file_str.as_str()]
        };
        if let Some(extra) = arguments {
            args.extend(extra.split_whitespace());
        }
        self.run_command(env, &args, false)
    }

    /// Bootstrap a new prefix and return the runner's output.
    pub fn bootstrap(&self, prefix: &Path, runner: &str) -> Result<String> {
        self.spawner.capture(&self.composer.bootstrap(prefix, runner))
    }

    pub fn send_status(&self, env: &Environment, action: PowerAction) -> Result<()> {
        tracing::info!(environment = %env.name, %action, "sending status");
        self.run_command(env, &["wineboot", action.flag()], false)?;
        self.notifier.info(
            "Cellar",
            &format!("`{action}` completed for `{}`.", env.name),
            icons::SYSTEM,
        );
        Ok(())
    }

    pub fn reg_add(&self, env: &Environment, key: &str, value: &str, data: &str) -> Result<ProcessHandle> {
        tracing::info!(environment = %env.name, key, value, data, "adding registry value");
        self.run_command(env, &["reg", "add", key, "/v", value, "/d", data, "/f"], false)
    }

    pub fn reg_delete(&self, env: &Environment, key: &str, value: &str) -> Result<ProcessHandle> {
        tracing::info!(environment = %env.name, key, value, "removing registry value");
        self.run_command(env, &["reg", "delete", key, "/v", value, "/f"], false)
    }

    pub fn toggle_virtual_desktop(&self, env: &Environment, enabled: bool, resolution: &str) -> Result<ProcessHandle> {
        if enabled {
            self.reg_add(env, VIRTUAL_DESKTOP_KEY, "Default", resolution)
        } else {
            self.reg_delete(env, VIRTUAL_DESKTOP_KEY, "Default")
        }
    }

    /// Wine processes currently running on the host, any environment.
    pub fn running_processes(&self) -> Result<Vec<RunningProcess>> {
        let inv = Invocation::new("ps").args(["-eo", "pid,pmem,pcpu,stime,time,cmd"]);
        let table = self.spawner.capture(&inv)?;
        Ok(table.lines().filter_map(RunningProcess::parse).collect())
    }

    /// Replace `dlls` in the environment's system directory with the copies
    /// from `source`, keeping the originals as `<dll>.old`. With `revert`
    /// the backups are moved back instead.
    pub fn dll_override(
        &self,
        env: &Environment,
        arch: DllArch,
        dlls: &[&str],
        source: &Path,
        revert: bool,
    ) -> Result<()> {
        let dir = env
            .storage_path(self.composer.environments_root())
            .join("drive_c")
            .join("windows")
            .join(arch.system_dir());
        tracing::info!(environment = %env.name, dir = %dir.display(), ?dlls, revert, "overriding dlls");

        for dll in dlls {
            let target = dir.join(dll);
            let backup = dir.join(format!("{dll}{DLL_BACKUP_SUFFIX}"));
            if revert {
                if backup.is_file() {
                    fs::rename(&backup, &target)?;
                } else {
                    tracing::warn!(dll, "no backup to restore, skipping");
                }
                continue;
            }

            // a second override must not clobber the original backup
            if target.is_file() && !backup.exists() {
                fs::rename(&target, &backup)?;
            }
            fs::create_dir_all(&dir)?;
            fs::copy(source.join(dll), &target)?;
        }
        Ok(())
    }

    /// `setup_dxvk.sh` from `<dxvk>/<version>` with the environment's runner
    /// first on `PATH`.
    pub fn setup_dxvk(&self, env: &Environment, version: &str, action: DxvkAction) -> Result<ProcessHandle> {
        tracing::info!(environment = %env.name, dxvk = version, action = action.as_str(), "running dxvk setup");
        let prefix = env.storage_path(self.composer.environments_root());

        let mut search = vec![self.composer.runner_bin_dir(&env.runner)];
        if let Some(existing) = std::env::var_os("PATH") {
            search.extend(std::env::split_paths(&existing));
        }
        let path: OsString = std::env::join_paths(search)
            .map_err(|e| CoreError::Msg(e.to_string()))?;

        let inv = Invocation::new(self.dxvk_root.join(version).join("setup_dxvk.sh"))
            .arg(action.as_str())
            .env("WINEPREFIX", prefix.display().to_string())
            .env("PATH", path.to_string_lossy());
        self.spawner.spawn(&inv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::HostGraphics;
    use crate::environment::Preset;
    use cellar_components::{RecordingUi, StaticSettings};
    use tempfile::tempdir;

    fn runtime() -> (Arc<RecordingSpawner>, Arc<RecordingUi>, Runtime) {
        runtime_at(Path::new("/data/cellar"), RecordingSpawner::new())
    }

    fn runtime_at(root: &Path, spawner: Arc<RecordingSpawner>) -> (Arc<RecordingSpawner>, Arc<RecordingUi>, Runtime) {
        let paths = CellarPaths::new(root);
        let ui = RecordingUi::new();
        let notifier = Notifier::new(
            ui.clone(),
            Arc::new(StaticSettings {
                notifications: true,
                temp_cleanup: false,
            }),
        );
        let rt = Runtime::new(
            &paths,
            CommandComposer::new(&paths, HostGraphics::default()),
            spawner.clone(),
            notifier,
        );
        (spawner, ui, rt)
    }

    fn env() -> Environment {
        Environment::new("Office", "lutris-6.0", "Office", Preset::Software)
    }

    #[test]
    fn msi_goes_through_msiexec() -> Result<()> {
        let (spawner, _ui, rt) = runtime();
        rt.run_executable(&env(), Path::new("/tmp/dotnet.MSI"), None)?;
        rt.run_executable(&env(), Path::new("/tmp/setup.exe"), Some("/S /quiet"))?;
        assert_eq!(
            spawner.arg_lines(),
            vec!["msiexec /i /tmp/dotnet.MSI", "/tmp/setup.exe /S /quiet"]
        );
        Ok(())
    }

    #[test]
    fn debug_tool_opens_a_terminal() -> Result<()> {
        let (spawner, _ui, rt) = runtime();
        rt.run_tool(&env(), RuntimeTool::Debug)?;
        rt.run_tool(&env(), RuntimeTool::Update)?;
        let calls = spawner.calls();
        assert_eq!(calls[0].0, SpawnMode::Terminal);
        assert_eq!(calls[1].0, SpawnMode::Background);
        assert_eq!(calls[1].1.args, vec!["wineboot", "-u"]);
        assert_eq!(
            calls[1].1.env_var("WINEPREFIX"),
            Some("/data/cellar/environments/Office")
        );
        Ok(())
    }

    #[test]
    fn virtual_desktop_uses_explorer_desktops_key() -> Result<()> {
        let (spawner, _ui, rt) = runtime();
        rt.toggle_virtual_desktop(&env(), true, "1920x1080")?;
        rt.toggle_virtual_desktop(&env(), false, "1920x1080")?;
        assert_eq!(
            spawner.arg_lines(),
            vec![
                format!("reg add {VIRTUAL_DESKTOP_KEY} /v Default /d 1920x1080 /f"),
                format!("reg delete {VIRTUAL_DESKTOP_KEY} /v Default /f"),
            ]
        );
        Ok(())
    }

    #[test]
    fn send_status_runs_wineboot_and_notifies() -> Result<()> {
        let (spawner, ui, rt) = runtime();
        rt.send_status(&env(), PowerAction::Kill)?;
        assert_eq!(spawner.arg_lines(), vec!["wineboot -k"]);
        assert_eq!(
            ui.notifications(),
            vec![("Cellar".to_string(), "`kill` completed for `Office`.".to_string())]
        );
        Ok(())
    }

    #[test]
    fn dxvk_setup_prepends_runner_bin_to_path() -> Result<()> {
        let (spawner, _ui, rt) = runtime();
        rt.setup_dxvk(&env(), "dxvk-1.8", DxvkAction::Uninstall)?;
        let (_, inv) = spawner.calls().remove(0);
        assert_eq!(inv.program, PathBuf::from("/data/cellar/dxvk/dxvk-1.8/setup_dxvk.sh"));
        assert_eq!(inv.args, vec!["uninstall"]);
        let path = inv.env_var("PATH").unwrap_or_default();
        assert!(path.starts_with("/data/cellar/runners/lutris-6.0/bin"), "{path}");
        Ok(())
    }

    #[test]
    fn tools_parse_from_cli_names() {
        assert_eq!("winecfg".parse::<RuntimeTool>(), Ok(RuntimeTool::Config));
        assert_eq!("TaskMgr".parse::<RuntimeTool>(), Ok(RuntimeTool::TaskManager));
        assert!("winetricks".parse::<RuntimeTool>().is_err());
    }

    #[test]
    fn running_processes_keeps_wine_rows() -> Result<()> {
        let table = "\
    PID %MEM %CPU STIME     TIME CMD
      1  0.1  0.0 09:12 00:00:03 /sbin/init splash
   4242  1.5  3.2 10:01 00:01:10 /data/cellar/runners/lutris-6.0/bin/wine64 C:\\Games\\game.exe -windowed
   4250  0.3  0.1 10:01 00:00:02 wineserver
   4301  0.0  0.0 10:05 00:00:00
";
        let spawner = RecordingSpawner::new().with_output(table);
        let (spawner, _ui, rt) = runtime_at(Path::new("/data/cellar"), spawner);

        let procs = rt.running_processes()?;
        assert_eq!(procs.len(), 2);
        assert_eq!(procs[0].pid, 4242);
        assert_eq!(procs[0].pcpu, "3.2");
        assert_eq!(procs[0].time, "00:01:10");
        assert!(procs[0].cmd.ends_with("game.exe -windowed"), "{}", procs[0].cmd);
        assert_eq!(procs[1].cmd, "wineserver");

        let (mode, inv) = spawner.calls().remove(0);
        assert_eq!(mode, SpawnMode::Capture);
        assert_eq!(inv.program, PathBuf::from("ps"));
        assert_eq!(inv.args, vec!["-eo", "pid,pmem,pcpu,stime,time,cmd"]);
        Ok(())
    }

    #[test]
    fn dll_override_backs_up_and_reverts() -> Result<()> {
        let tmp = tempdir()?;
        let (spawner, _ui, rt) = runtime_at(tmp.path(), RecordingSpawner::new());
        let system32 = tmp.path().join("environments/Office/drive_c/windows/system32");
        fs::create_dir_all(&system32)?;
        fs::write(system32.join("d3d9.dll"), b"builtin")?;
        let source = tmp.path().join("dxvk-1.8/x32");
        fs::create_dir_all(&source)?;
        fs::write(source.join("d3d9.dll"), b"native")?;
        fs::write(source.join("dxgi.dll"), b"native dxgi")?;

        rt.dll_override(&env(), DllArch::Bits32, &["d3d9.dll", "dxgi.dll"], &source, false)?;
        assert_eq!(fs::read(system32.join("d3d9.dll"))?, b"native");
        assert_eq!(fs::read(system32.join("d3d9.dll.old"))?, b"builtin");
        assert_eq!(fs::read(system32.join("dxgi.dll"))?, b"native dxgi");
        assert!(!system32.join("dxgi.dll.old").exists());

        // overriding again keeps the first backup
        rt.dll_override(&env(), DllArch::Bits32, &["d3d9.dll"], &source, false)?;
        assert_eq!(fs::read(system32.join("d3d9.dll.old"))?, b"builtin");

        rt.dll_override(&env(), DllArch::Bits32, &["d3d9.dll", "dxgi.dll"], &source, true)?;
        assert_eq!(fs::read(system32.join("d3d9.dll"))?, b"builtin");
        assert!(!system32.join("d3d9.dll.old").exists());
        assert_eq!(fs::read(system32.join("dxgi.dll"))?, b"native dxgi");
        assert!(spawner.calls().is_empty());
        Ok(())
    }

    #[test]
    fn dll_override_with_missing_source_fails() -> Result<()> {
        let tmp = tempdir()?;
        let (_spawner, _ui, rt) = runtime_at(tmp.path(), RecordingSpawner::new());
        let err = rt.dll_override(&env(), DllArch::Bits64, &["d3d11.dll"], &tmp.path().join("absent"), false);
        assert!(matches!(err, Err(CoreError::Io(_))));
        assert_eq!("64".parse::<DllArch>(), Ok(DllArch::Bits64));
        assert_eq!(DllArch::Bits64.system_dir(), "syswow64");
        Ok(())
    }
}
