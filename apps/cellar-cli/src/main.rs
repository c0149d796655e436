mod ui;

use anyhow::{anyhow, Context, Result};
use cellar_components::{ComponentKind, ComponentStore};
use cellar_core::{
    Cellar, CellarConfig, CreateRequest, DllArch, Environment, PowerAction, Preset, RuntimeTool,
    Scope,
};
use cellar_hwprof::human_size;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use crate::ui::{CliUi, CliWidget};

#[derive(Parser, Debug)]
#[command(name = "cellar", version, about = "Manage Wine environments, runners and dependencies")]
struct Cli {
    #[arg(short, long, action = ArgAction::Count, global = true, help = "Increase logging (-vv reaches trace)")]
    verbose: u8,
    #[arg(long, global = true, help = "Force trace logging")]
    trace: bool,
    #[arg(short, long, global = true, help = "Hide runner output during creation")]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-index components and environments.
    Checks {
        #[arg(long, help = "Install the newest runner/dxvk when none is present")]
        install_latest: bool,
    },
    /// List environments.
    List,
    /// List installed runners and dxvk builds.
    Components,
    /// Show releases that are not installed yet.
    Updates,
    /// Download and install one component release.
    Install {
        /// runner, proton or dxvk
        kind: ComponentKind,
        tag: String,
        asset: String,
    },
    /// Create an environment.
    Create {
        name: String,
        #[arg(long, default_value = "gaming")]
        preset: Preset,
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        runner: Option<String>,
    },
    Delete {
        name: String,
    },
    /// Rewrite a broken record with defaults and re-run the boot sequence.
    Repair {
        name: String,
    },
    /// Set one field. VALUE is parsed as JSON, falling back to a string.
    Set {
        name: String,
        key: String,
        value: String,
        #[arg(long, help = "Field lives under Parameters")]
        param: bool,
    },
    /// Launch a runner tool (winecfg, regedit, debug, ...).
    Tool {
        name: String,
        tool: RuntimeTool,
    },
    /// Run an .exe or .msi inside the environment.
    Exec {
        name: String,
        file: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        args: Option<String>,
    },
    Power {
        name: String,
        action: PowerArg,
    },
    Dxvk {
        name: String,
        state: Toggle,
    },
    /// List running wine processes.
    Processes,
    /// Swap system DLLs for copies from SOURCE, or restore the backups.
    DllOverride {
        name: String,
        source: PathBuf,
        #[arg(required = true)]
        dlls: Vec<String>,
        #[arg(long, default_value = "32", help = "32 (system32) or 64 (syswow64)")]
        arch: DllArch,
        #[arg(long)]
        revert: bool,
    },
    VirtualDesktop {
        name: String,
        state: Toggle,
    },
    /// List the dependency index.
    Deps,
    DepInstall {
        name: String,
        id: String,
    },
    DepRemove {
        name: String,
        id: String,
    },
    Programs {
        name: String,
    },
    /// Disk usage of the data root and of each environment.
    Disk,
    ClearTemp {
        #[arg(long)]
        force: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PowerArg {
    Shutdown,
    Reboot,
    Kill,
}

impl From<PowerArg> for PowerAction {
    fn from(p: PowerArg) -> Self {
        match p {
            PowerArg::Shutdown => PowerAction::Shutdown,
            PowerArg::Reboot => PowerAction::Reboot,
            PowerArg::Kill => PowerAction::Kill,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "cellar={level},cellar_core={level},cellar_components={level},cellar_hwprof={level}"
        ))
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn find(cellar: &Cellar, name: &str) -> Result<Environment> {
    cellar
        .environment(name)
        .with_context(|| format!("no environment named `{name}`"))
}

fn print_environment(cellar: &Cellar, key: &str, env: &Environment) {
    if env.broken {
        println!("{key:<24} BROKEN (run `cellar repair {key}`)");
        return;
    }
    println!(
        "{:<24} {:<9} {:<20} {:>10}  deps: {}",
        env.name,
        env.preset.to_string(),
        env.runner,
        human_size(cellar.environment_size(env)),
        env.installed_dependencies.join(", ")
    );
}

fn run(cli: Cli) -> Result<()> {
    let ui = Arc::new(CliUi::new(cli.quiet));
    let config = CellarConfig::from_env().detect_host();
    let cellar = Arc::new(Cellar::new(config, ui).context("initializing cellar")?);

    if let Command::Checks { install_latest } = cli.command {
        cellar.checks(install_latest)?;
        let available = cellar.available();
        println!(
            "{} runner(s), {} dxvk build(s), {} environment(s)",
            available.runners.len(),
            available.dxvk.len(),
            cellar.environments().len()
        );
        return Ok(());
    }
    cellar.checks(false)?;

    match cli.command {
        Command::Checks { .. } => {}
        Command::List => {
            for (key, env) in cellar.environments().iter() {
                print_environment(&cellar, key, env);
            }
        }
        Command::Components => {
            let available = cellar.available();
            for store in [ComponentStore::Runners, ComponentStore::GraphicsShims] {
                for name in available.list(store) {
                    println!("{store:?}\t{name}");
                }
            }
        }
        Command::Updates => {
            let catalog = cellar.catalog();
            for update in catalog.runner_updates()?.into_iter().chain(catalog.dxvk_updates()?) {
                println!("{}\t{}\t{}", update.kind, update.tag, update.asset);
            }
        }
        Command::Install { kind, tag, asset } => {
            cellar
                .install_component(kind, &tag, &asset)?
                .join()??;
        }
        Command::Create {
            name,
            preset,
            path,
            runner,
        } => {
            let req = CreateRequest {
                path,
                runner,
                ..CreateRequest::new(name, preset)
            };
            let env = cellar.create_environment(req).join()??;
            println!("created `{}` at {}", env.name, cellar.store().storage_path(&env).display());
        }
        Command::Delete { name } => {
            let env = find(&cellar, &name)?;
            cellar.delete_environment(env).join()??;
        }
        Command::Repair { name } => {
            let env = find(&cellar, &name)?;
            cellar.repair_environment(&env)?;
        }
        Command::Set {
            name,
            key,
            value,
            param,
        } => {
            let env = find(&cellar, &name)?;
            let scope = if param { Scope::Parameters } else { Scope::Root };
            cellar.update_field(&env, &key, parse_value(&value), scope)?;
        }
        Command::Tool { name, tool } => {
            let env = find(&cellar, &name)?;
            cellar.runtime().run_tool(&env, tool)?.wait()?;
        }
        Command::Exec { name, file, args } => {
            let env = find(&cellar, &name)?;
            let file = file
                .canonicalize()
                .with_context(|| format!("cannot resolve {}", file.display()))?;
            cellar
                .runtime()
                .run_executable(&env, &file, args.as_deref())?
                .wait()?;
        }
        Command::Power { name, action } => {
            let env = find(&cellar, &name)?;
            cellar.runtime().send_status(&env, action.into())?;
        }
        Command::Dxvk { name, state } => {
            let env = find(&cellar, &name)?;
            match state {
                Toggle::On => cellar.install_dxvk(&env)?,
                Toggle::Off => cellar.remove_dxvk(&env)?,
            };
        }
        Command::Processes => {
            for p in cellar.runtime().running_processes()? {
                println!("{:>7} {:>5} {:>5} {:>6} {:>9}  {}", p.pid, p.pmem, p.pcpu, p.stime, p.time, p.cmd);
            }
        }
        Command::DllOverride {
            name,
            source,
            dlls,
            arch,
            revert,
        } => {
            let env = find(&cellar, &name)?;
            let dlls: Vec<&str> = dlls.iter().map(String::as_str).collect();
            cellar
                .runtime()
                .dll_override(&env, arch, &dlls, &source, revert)?;
        }
        Command::VirtualDesktop { name, state } => {
            let env = find(&cellar, &name)?;
            cellar.toggle_virtual_desktop(&env, matches!(state, Toggle::On))?;
        }
        Command::Deps => {
            for (id, info) in cellar.dependency_index()?.iter() {
                println!("{id:<28} {:<14} {}", info.category, info.description);
            }
        }
        Command::DepInstall { name, id } => {
            let env = find(&cellar, &name)?;
            let widget = Arc::new(CliWidget { id: id.clone() });
            cellar.install_dependency(env, &id, widget)?.join()??;
        }
        Command::DepRemove { name, id } => {
            let env = find(&cellar, &name)?;
            if !env.has_dependency(&id) {
                return Err(anyhow!("`{id}` is not installed in `{name}`"));
            }
            cellar.remove_dependency(&env, &id, &CliWidget { id: id.clone() })?;
        }
        Command::Programs { name } => {
            let env = find(&cellar, &name)?;
            for (program, exe) in cellar.programs(&env) {
                println!("{program:<32} {exe}");
            }
        }
        Command::Disk => {
            let info = cellar.disk_usage();
            let fmt = |v: Option<u64>| v.map(human_size).unwrap_or_else(|| "?".into());
            println!(
                "{}: {} used of {} ({} free)",
                info.data_root,
                fmt(info.used_bytes()),
                fmt(info.total_bytes),
                fmt(info.free_bytes)
            );
            for (key, env) in cellar.environments().iter() {
                print_environment(&cellar, key, env);
            }
        }
        Command::ClearTemp { force } => {
            let removed = cellar.clear_temp(force)?;
            println!("removed {removed} staged file(s)");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.trace, cli.verbose);
    run(cli)
}
