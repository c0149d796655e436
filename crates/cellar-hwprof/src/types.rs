use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostProfile {
    pub schema: u32,

    pub os: String,
    pub arch: String,

    pub gpus: Vec<GpuInfo>,

    #[serde(default)]
    pub storage: Option<StorageInfo>,

    pub fingerprint: String,
    pub created_at: String,
    pub updated_at: String,

    #[serde(default)]
    pub probe_ms_total: Option<u64>,
    #[serde(default)]
    pub diagnostics: Option<Vec<String>>, // debug only
}

impl HostProfile {
    /// True when any non-software adapter reports the NVIDIA vendor.
    pub fn has_nvidia_adapter(&self) -> bool {
        self.gpus
            .iter()
            .any(|g| !g.software_renderer && g.vendor.to_ascii_lowercase().contains("nvidia"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuInfo {
    pub vendor_id: u32,
    pub device_id: u32,
    pub vendor: String,
    pub name: String,

    #[serde(default)]
    pub integrated: bool, // inferred
    #[serde(default)]
    pub software_renderer: bool, // llvmpipe/SwiftShader/etc
    #[serde(default)]
    pub source: ProbeSource,
}

/// Where an adapter entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeSource {
    #[default]
    Sysfs,
    Lspci,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageInfo {
    pub data_root: String,
    #[serde(default)]
    pub total_bytes: Option<u64>,
    #[serde(default)]
    pub free_bytes: Option<u64>,
}

impl StorageInfo {
    pub fn used_bytes(&self) -> Option<u64> {
        match (self.total_bytes, self.free_bytes) {
            (Some(total), Some(free)) => Some(total.saturating_sub(free)),
            _ => None,
        }
    }
}
