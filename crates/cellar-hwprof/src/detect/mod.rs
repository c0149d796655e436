use anyhow::Result;
use std::path::Path;

use crate::storage::storage_info;
use crate::types::{GpuInfo, HostProfile};

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
use linux::detect_platform;

#[cfg(not(target_os = "linux"))]
fn detect_platform() -> Result<PlatformDetect> {
    Ok(PlatformDetect {
        gpus: Vec::new(),
        probe_total_ms: 0,
        diagnostics: vec!["[gpu] no probe for this platform".into()],
    })
}

pub(crate) mod util;

/// Probe the host now. `data_root` is the directory whose filesystem is reported as storage.
pub fn detect_now(data_root: &Path) -> Result<HostProfile> {
    let os = std::env::consts::OS.to_string();
    let arch = std::env::consts::ARCH.to_string();

    let plat = detect_platform()?;
    for line in &plat.diagnostics {
        tracing::debug!(%line, "host probe");
    }

    Ok(HostProfile {
        schema: 0, // set in cache layer
        os,
        arch,
        gpus: plat.gpus,
        storage: Some(storage_info(data_root)),
        fingerprint: String::new(),
        created_at: String::new(),
        updated_at: String::new(),
        probe_ms_total: Some(plat.probe_total_ms),
        diagnostics: if util::hwprof_debug() {
            Some(plat.diagnostics)
        } else {
            None
        },
    })
}

/// OS layer returns this and mod.rs assembles the final profile.
pub struct PlatformDetect {
    pub gpus: Vec<GpuInfo>,
    pub probe_total_ms: u64,
    pub diagnostics: Vec<String>,
}
