//! Environment record -> process environment for the runner.
//!
//! Composition is a pure function of the record, the data root and the host
//! graphics facts handed in at construction. Nothing here touches the
//! filesystem or probes hardware, so the same record always yields the same
//! output.

use cellar_components::CellarPaths;
use cellar_hwprof::HostProfile;
use std::path::{Path, PathBuf};

use crate::environment::Environment;

pub const DXVK_DLL_OVERRIDES: &str = "d3d11,dxgi=n";
pub const DXVK_HUD_FULL: &str = "devinfo,memory,drawcalls,fps,version,api,compiler";
pub const DXVK_HUD_MINIMAL: &str = "compiler";
pub const PULSE_LATENCY_MSEC: &str = "60";

/// Host graphics facts the composer needs for discrete-GPU offload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostGraphics {
    pub nvidia: bool,
}

impl HostGraphics {
    pub fn from_profile(profile: &HostProfile) -> Self {
        Self {
            nvidia: profile.has_nvidia_adapter(),
        }
    }
}

/// A process to start: binary, arguments and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Applied on top of the inherited environment, in order.
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Shell-like rendering for logs and the creation output buffer.
    pub fn display_line(&self) -> String {
        let mut parts: Vec<String> = self.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        parts.push(self.program.display().to_string());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Output of [`CommandComposer::compose`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationEnvironment {
    pub runner_binary: PathBuf,
    pub prefix: PathBuf,
    /// Ordered variables, `WINEDLLOVERRIDES` last.
    pub vars: Vec<(String, String)>,
    pub dll_overrides: String,
}

impl InvocationEnvironment {
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The runner started with `args` inside this environment.
    pub fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation {
            program: self.runner_binary.clone(),
            args: args.into_iter().map(Into::into).collect(),
            env: self.vars.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandComposer {
    runners_root: PathBuf,
    environments_root: PathBuf,
    host: HostGraphics,
}

impl CommandComposer {
    pub fn new(paths: &CellarPaths, host: HostGraphics) -> Self {
        Self {
            runners_root: paths.runners(),
            environments_root: paths.environments(),
            host,
        }
    }

    pub fn environments_root(&self) -> &Path {
        &self.environments_root
    }

    /// `<runners>/<runner>/bin`, one level deeper (`dist/`) for Proton builds.
    pub fn runner_bin_dir(&self, runner: &str) -> PathBuf {
        let root = self.runners_root.join(runner);
        let root = if runner.starts_with("Proton") {
            root.join("dist")
        } else {
            root
        };
        root.join("bin")
    }

    pub fn runner_binary(&self, runner: &str) -> PathBuf {
        self.runner_bin_dir(runner).join("wine64")
    }

    /// First-run bootstrap of a fresh prefix.
    pub fn bootstrap(&self, prefix: &Path, runner: &str) -> Invocation {
        Invocation::new(self.runner_binary(runner))
            .arg("wineboot")
            .env("WINEPREFIX", prefix.display().to_string())
            .env("WINEARCH", "win64")
    }

    pub fn compose(&self, env: &Environment) -> InvocationEnvironment {
        let p = &env.parameters;
        let prefix = env.storage_path(&self.environments_root);
        let prefix_str = prefix.display().to_string();

        let mut vars: Vec<(String, String)> = Vec::new();
        let mut push = |k: &str, v: &str| vars.push((k.to_string(), v.to_string()));

        push("WINEPREFIX", &prefix_str);
        push("WINEARCH", "win64");

        for (k, v) in parse_env_assignments(&p.environment_variables) {
            push(k, v);
        }

        if p.dxvk {
            push("DXVK_STATE_CACHE_PATH", &prefix_str);
            push("STAGING_SHARED_MEMORY", "1");
            push("__GL_DXVK_OPTIMIZATIONS", "1");
            push("__GL_SHADER_DISK_CACHE", "1");
            push("__GL_SHADER_DISK_CACHE_PATH", &prefix_str);
        }

        push(
            "DXVK_HUD",
            if p.dxvk_hud {
                DXVK_HUD_FULL
            } else {
                DXVK_HUD_MINIMAL
            },
        );

        if p.esync {
            push("WINEESYNC", "1");
            push("WINEDEBUG", "+esync");
        }
        if p.fsync {
            push("WINEFSYNC", "1");
        }
        if p.aco_compiler {
            push("RADV_PERFTEST", "aco");
        }
        if p.discrete_gpu {
            if self.host.nvidia {
                push("__NV_PRIME_RENDER_OFFLOAD", "1");
                push("__GLX_VENDOR_LIBRARY_NAME", "nvidia");
                push("__VK_LAYER_NV_optimus", "NVIDIA_only");
            } else {
                push("DRI_PRIME", "1");
            }
        }
        if p.pulseaudio_latency {
            push("PULSE_LATENCY_MSEC", PULSE_LATENCY_MSEC);
        }

        let mut overrides: Vec<&str> = Vec::new();
        if !p.dll_overrides.is_empty() {
            overrides.push(&p.dll_overrides);
        }
        if p.dxvk {
            overrides.push(DXVK_DLL_OVERRIDES);
        }
        let dll_overrides = overrides.join(",");
        push("WINEDLLOVERRIDES", &dll_overrides);

        InvocationEnvironment {
            runner_binary: self.runner_binary(&env.runner),
            prefix,
            vars,
            dll_overrides,
        }
    }
}

/// `KEY=VALUE` tokens separated by whitespace. Tokens without `=` or with an
/// empty key are dropped.
pub fn parse_env_assignments(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.split_whitespace().filter_map(|tok| {
        let (k, v) = tok.split_once('=')?;
        (!k.is_empty()).then_some((k, v.trim_matches(&['\'', '"'][..])))
    })
}
