//! cellar-core
//!
//! Environments and everything that runs inside them.
//! - `environment`: persisted records, presets, the on-disk store.
//! - `command`: pure composition of runner invocations from a record.
//! - `runtime`: process spawning for tools, installers and dxvk setup.
//! - `dependencies`: the remote dependency index and manifest interpreter.
//! - `manager`: the [`Cellar`] facade front-ends talk to.

pub mod command;
pub mod dependencies;
pub mod environment;
pub mod errors;
pub mod manager;
pub mod runtime;

pub use command::{CommandComposer, HostGraphics, Invocation, InvocationEnvironment};
pub use dependencies::{
    DependencyCatalog, DependencyInfo, DependencyManifest, DependencyRepository, DependencyWidget,
    ManifestInterpreter, NullWidget, Step,
};
pub use environment::{
    CreateRequest, Environment, EnvironmentIndex, EnvironmentStore, Parameters, Preset, Scope,
};
pub use errors::{CoreError, Result};
pub use manager::{Cellar, CellarConfig};
pub use runtime::{
    DllArch, PowerAction, ProcessHandle, ProcessSpawner, Runtime, RunningProcess, RuntimeTool, Spawner,
};

#[cfg(any(test, feature = "testing"))]
pub use runtime::{RecordingSpawner, SpawnMode};
