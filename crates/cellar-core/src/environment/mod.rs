//! Environment records as persisted in each environment's `environment.json`.

mod programs;
mod store;

pub use programs::{discover_programs, lnk_target};
pub use store::{CreateRequest, EnvironmentIndex, EnvironmentStore, CONFIG_FILE, CUSTOM_PATHS_FILE};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::{CoreError, Result};

/// Named parameter overlays applied at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Preset {
    #[serde(rename = "gaming", alias = "Gaming")]
    Gaming,
    #[serde(rename = "software", alias = "Software")]
    Software,
    #[serde(rename = "custom", alias = "Custom")]
    Custom,
    /// Placeholder for records that could not be read.
    #[serde(rename = "Undefined", alias = "undefined")]
    Undefined,
}

impl Preset {
    pub fn overlay(self) -> ParameterOverlay {
        match self {
            Preset::Gaming => ParameterOverlay {
                dxvk: Some(true),
                esync: Some(true),
                discrete_gpu: Some(true),
                pulseaudio_latency: Some(true),
                ..ParameterOverlay::default()
            },
            Preset::Software => ParameterOverlay {
                dxvk: Some(true),
                ..ParameterOverlay::default()
            },
            Preset::Custom | Preset::Undefined => ParameterOverlay::default(),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Preset::Gaming => "gaming",
            Preset::Software => "software",
            Preset::Custom => "custom",
            Preset::Undefined => "Undefined",
        })
    }
}

impl FromStr for Preset {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gaming" => Ok(Preset::Gaming),
            "software" => Ok(Preset::Software),
            "custom" => Ok(Preset::Custom),
            _ => Err(CoreError::UnknownPreset(s.to_string())),
        }
    }
}

/// Runtime knobs of one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub dxvk: bool,
    pub dxvk_hud: bool,
    pub esync: bool,
    pub fsync: bool,
    pub aco_compiler: bool,
    pub discrete_gpu: bool,
    pub virtual_desktop: bool,
    pub virtual_desktop_res: String,
    pub pulseaudio_latency: bool,
    /// Whitespace separated `KEY=VALUE` pairs.
    pub environment_variables: String,
    pub dll_overrides: String,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            dxvk: false,
            dxvk_hud: false,
            esync: false,
            fsync: false,
            aco_compiler: false,
            discrete_gpu: false,
            virtual_desktop: false,
            virtual_desktop_res: "1280x720".to_string(),
            pulseaudio_latency: false,
            environment_variables: String::new(),
            dll_overrides: String::new(),
        }
    }
}

/// Partial [`Parameters`]. Only `Some` fields are written by [`apply`](Self::apply).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterOverlay {
    pub dxvk: Option<bool>,
    pub dxvk_hud: Option<bool>,
    pub esync: Option<bool>,
    pub fsync: Option<bool>,
    pub aco_compiler: Option<bool>,
    pub discrete_gpu: Option<bool>,
    pub virtual_desktop: Option<bool>,
    pub virtual_desktop_res: Option<String>,
    pub pulseaudio_latency: Option<bool>,
    pub environment_variables: Option<String>,
    pub dll_overrides: Option<String>,
}

impl ParameterOverlay {
    pub fn apply(&self, params: &mut Parameters) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }
        set(&mut params.dxvk, &self.dxvk);
        set(&mut params.dxvk_hud, &self.dxvk_hud);
        set(&mut params.esync, &self.esync);
        set(&mut params.fsync, &self.fsync);
        set(&mut params.aco_compiler, &self.aco_compiler);
        set(&mut params.discrete_gpu, &self.discrete_gpu);
        set(&mut params.virtual_desktop, &self.virtual_desktop);
        set(&mut params.virtual_desktop_res, &self.virtual_desktop_res);
        set(&mut params.pulseaudio_latency, &self.pulseaudio_latency);
        set(&mut params.environment_variables, &self.environment_variables);
        set(&mut params.dll_overrides, &self.dll_overrides);
    }
}

/// Where a field lives in the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    Root,
    Parameters,
}

impl Scope {
    fn key(self) -> Option<&'static str> {
        match self {
            Scope::Root => None,
            Scope::Parameters => Some("Parameters"),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Runner", default)]
    pub runner: String,
    /// Directory name under the store root, or an absolute path when
    /// `custom_path` is set.
    #[serde(rename = "Path", default)]
    pub path: String,
    #[serde(rename = "Custom_Path", default)]
    pub custom_path: bool,
    #[serde(rename = "Environment")]
    pub preset: Preset,
    #[serde(rename = "Creation_Date", default)]
    pub creation_date: String,
    #[serde(rename = "Update_Date", default)]
    pub update_date: String,
    #[serde(rename = "Parameters", default)]
    pub parameters: Parameters,
    #[serde(rename = "Installed_Dependencies", default)]
    pub installed_dependencies: Vec<String>,
    #[serde(rename = "Programs", default)]
    pub programs: BTreeMap<String, String>,
    #[serde(rename = "Broken", default, skip_serializing_if = "is_false")]
    pub broken: bool,
}

impl Environment {
    pub fn new(name: &str, runner: &str, path: &str, preset: Preset) -> Self {
        Self {
            name: name.to_string(),
            runner: runner.to_string(),
            path: path.to_string(),
            custom_path: false,
            preset,
            creation_date: String::new(),
            update_date: String::new(),
            parameters: Parameters::default(),
            installed_dependencies: Vec::new(),
            programs: BTreeMap::new(),
            broken: false,
        }
    }

    /// Stand-in for a directory whose record is missing or unreadable.
    pub fn broken_placeholder(dir_name: &str) -> Self {
        Self {
            broken: true,
            ..Self::new(dir_name, "", dir_name, Preset::Undefined)
        }
    }

    /// Absolute storage path. An empty `path` resolves to the store root
    /// itself, so destructive callers must check [`path`](Self::path) first.
    pub fn storage_path(&self, store_root: &Path) -> PathBuf {
        if self.custom_path {
            PathBuf::from(&self.path)
        } else {
            store_root.join(&self.path)
        }
    }

    pub fn has_dependency(&self, id: &str) -> bool {
        self.installed_dependencies.iter().any(|d| d == id)
    }

    /// Set one field by its persisted key. Unknown keys and values of the
    /// wrong shape are rejected and leave `self` untouched.
    pub fn set_field(&mut self, key: &str, value: Value, scope: Scope) -> Result<()> {
        let invalid = |reason: String| CoreError::InvalidField {
            key: key.to_string(),
            reason,
        };

        let mut doc = serde_json::to_value(&*self)?;
        let target = match scope.key() {
            Some(k) => doc.get_mut(k),
            None => Some(&mut doc),
        }
        .and_then(Value::as_object_mut)
        .ok_or_else(|| invalid("scope is not a record".into()))?;

        match target.get_mut(key) {
            Some(slot) => *slot = value,
            None if scope == Scope::Root && key == "Broken" => {
                target.insert(key.to_string(), value);
            }
            None => return Err(invalid("no such field".into())),
        }

        *self = serde_json::from_value(doc).map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }
}
