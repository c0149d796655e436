use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use crate::command::Invocation;
use crate::errors::{CoreError, Result};

/// Process host for runner invocations.
pub trait Spawner: Send + Sync {
    /// Start in the background.
    fn spawn(&self, inv: &Invocation) -> Result<ProcessHandle>;
    /// Start inside a terminal emulator window.
    fn spawn_in_terminal(&self, inv: &Invocation) -> Result<ProcessHandle>;
    /// Run to completion, returning stdout and stderr interleaved as text.
    fn capture(&self, inv: &Invocation) -> Result<String>;
}

/// A started process. Dropping it leaves the process running.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Option<Child>,
}

impl ProcessHandle {
    pub fn from_child(child: Child) -> Self {
        Self { child: Some(child) }
    }

    /// Handle with no process behind it; `wait` succeeds immediately.
    pub fn detached() -> Self {
        Self { child: None }
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Block until exit. `true` on a zero exit status.
    pub fn wait(self) -> Result<bool> {
        match self.child {
            Some(mut child) => Ok(child.wait()?.success()),
            None => Ok(true),
        }
    }
}

/// Terminal emulators tried in order, with the flag that precedes the command.
const TERMINALS: &[(&str, &str)] = &[
    ("xterm", "-e"),
    ("konsole", "-e"),
    ("gnome-terminal", "--"),
    ("xfce4-terminal", "-x"),
    ("mate-terminal", "-x"),
    ("tilix", "-e"),
];

/// Runs invocations with `std::process::Command`. No shell is involved.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpawner {
    terminal: Option<(PathBuf, &'static str)>,
}

impl ProcessSpawner {
    pub fn new() -> Self {
        let terminal = TERMINALS
            .iter()
            .find_map(|(name, flag)| which::which(name).ok().map(|p| (p, *flag)));
        match &terminal {
            Some((path, _)) => tracing::debug!(terminal = %path.display(), "terminal found"),
            None => tracing::debug!("no terminal emulator on PATH"),
        }
        Self { terminal }
    }

    fn command(inv: &Invocation) -> Command {
        let mut cmd = Command::new(&inv.program);
        cmd.args(&inv.args);
        cmd.envs(inv.env.iter().map(|(k, v)| (k, v)));
        cmd
    }
}

impl Spawner for ProcessSpawner {
    fn spawn(&self, inv: &Invocation) -> Result<ProcessHandle> {
        tracing::debug!(command = %inv.display_line(), "spawning");
        Ok(ProcessHandle::from_child(Self::command(inv).spawn()?))
    }

    fn spawn_in_terminal(&self, inv: &Invocation) -> Result<ProcessHandle> {
        let (term, flag) = self.terminal.as_ref().ok_or(CoreError::NoTerminal)?;
        tracing::debug!(terminal = %term.display(), command = %inv.display_line(), "spawning in terminal");
        let child = Command::new(term)
            .arg(flag)
            .arg(&inv.program)
            .args(&inv.args)
            .envs(inv.env.iter().map(|(k, v)| (k, v)))
            .spawn()?;
        Ok(ProcessHandle::from_child(child))
    }

    fn capture(&self, inv: &Invocation) -> Result<String> {
        tracing::debug!(command = %inv.display_line(), "capturing");
        let out = Self::command(inv)
            .stdin(Stdio::null())
            .output()?;
        let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&out.stderr));
        if !out.status.success() {
            tracing::warn!(status = ?out.status.code(), "command exited with failure");
        }
        Ok(text)
    }
}

#[cfg(any(test, feature = "testing"))]
pub use recording::{RecordingSpawner, SpawnMode};

#[cfg(any(test, feature = "testing"))]
mod recording {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SpawnMode {
        Background,
        Terminal,
        Capture,
    }

    /// Spawner double: records invocations and starts nothing.
    #[derive(Default)]
    pub struct RecordingSpawner {
        calls: Mutex<Vec<(SpawnMode, Invocation)>>,
        capture_output: Mutex<String>,
        fail_capture: Mutex<bool>,
    }

    impl RecordingSpawner {
        pub fn new() -> std::sync::Arc<Self> {
            std::sync::Arc::new(Self::default())
        }

        pub fn with_output(self: std::sync::Arc<Self>, text: &str) -> std::sync::Arc<Self> {
            *self.capture_output.lock().unwrap_or_else(|e| e.into_inner()) = text.to_string();
            self
        }

        pub fn fail_capture(&self) {
            *self.fail_capture.lock().unwrap_or_else(|e| e.into_inner()) = true;
        }

        pub fn calls(&self) -> Vec<(SpawnMode, Invocation)> {
            self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        /// `args` of every recorded call, joined with spaces.
        pub fn arg_lines(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .map(|(_, inv)| inv.args.join(" "))
                .collect()
        }

        fn record(&self, mode: SpawnMode, inv: &Invocation) {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((mode, inv.clone()));
        }
    }

    impl Spawner for RecordingSpawner {
        fn spawn(&self, inv: &Invocation) -> Result<ProcessHandle> {
            self.record(SpawnMode::Background, inv);
            Ok(ProcessHandle::detached())
        }

        fn spawn_in_terminal(&self, inv: &Invocation) -> Result<ProcessHandle> {
            self.record(SpawnMode::Terminal, inv);
            Ok(ProcessHandle::detached())
        }

        fn capture(&self, inv: &Invocation) -> Result<String> {
            self.record(SpawnMode::Capture, inv);
            if *self.fail_capture.lock().unwrap_or_else(|e| e.into_inner()) {
                return Err(CoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "runner binary missing",
                )));
            }
            Ok(self
                .capture_output
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone())
        }
    }
}
