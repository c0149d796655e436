use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Installable component families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    /// Standard compatibility-layer runner build.
    Runner,
    /// Alternate runner distribution (ships its tree under `dist/`).
    CompatLayerVariant,
    /// Graphics translation shim (dxvk).
    GraphicsShim,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 3] = [
        ComponentKind::Runner,
        ComponentKind::CompatLayerVariant,
        ComponentKind::GraphicsShim,
    ];

    /// Which store directory a kind is extracted into.
    pub fn store(self) -> ComponentStore {
        match self {
            ComponentKind::Runner | ComponentKind::CompatLayerVariant => ComponentStore::Runners,
            ComponentKind::GraphicsShim => ComponentStore::GraphicsShims,
        }
    }

    /// Directory name an installed release of `tag` shows up under.
    pub fn install_identity(self, tag: &str) -> String {
        match self {
            ComponentKind::Runner => tag.to_string(),
            ComponentKind::CompatLayerVariant => format!("Proton-{tag}"),
            ComponentKind::GraphicsShim => {
                format!("dxvk-{}", tag.strip_prefix('v').unwrap_or(tag))
            }
        }
    }

    /// Label shown on progress entries.
    pub fn display_label(self, tag: &str) -> String {
        match self {
            ComponentKind::Runner => tag.to_string(),
            ComponentKind::CompatLayerVariant => format!("proton-{tag}"),
            ComponentKind::GraphicsShim => format!("dxvk-{tag}"),
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComponentKind::Runner => "runner",
            ComponentKind::CompatLayerVariant => "proton runner",
            ComponentKind::GraphicsShim => "dxvk",
        })
    }
}

impl std::str::FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "runner" | "wine" => Ok(ComponentKind::Runner),
            "proton" | "runner:proton" | "compat-layer-variant" => {
                Ok(ComponentKind::CompatLayerVariant)
            }
            "dxvk" | "graphics-shim" => Ok(ComponentKind::GraphicsShim),
            other => Err(format!("unknown component kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentStore {
    Runners,
    GraphicsShims,
}

/// Runner families recognised by name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerFamily {
    Wine,
    Proton,
}

impl RunnerFamily {
    pub fn prefix(self) -> &'static str {
        match self {
            RunnerFamily::Wine => "lutris",
            RunnerFamily::Proton => "proton",
        }
    }
}

/// One entry of a release-listing feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    pub fn first_asset(&self) -> Option<&str> {
        self.assets.first().map(|a| a.name.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
}

/// Where a staged file is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadSource {
    /// `<kind repository>/download/<tag>/<file_name>`
    Release { kind: ComponentKind, tag: String },
    /// Absolute URL (dependency installers).
    Direct(String),
}

/// Transient description of one staging download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub source: DownloadSource,
    pub file_name: String,
    pub rename: Option<String>,
    pub checksum: Option<String>,
}

impl DownloadRequest {
    pub fn release(kind: ComponentKind, tag: &str, asset: &str) -> Self {
        Self {
            source: DownloadSource::Release {
                kind,
                tag: tag.to_string(),
            },
            file_name: asset.to_string(),
            rename: None,
            checksum: None,
        }
    }

    /// Name the file ends up under in the staging area.
    pub fn staged_name(&self) -> &str {
        self.rename.as_deref().unwrap_or(&self.file_name)
    }
}

/// A file present in the staging area after a successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub name: String,
    pub path: PathBuf,
    /// False when the file was already present and no transfer happened.
    pub transferred: bool,
}
