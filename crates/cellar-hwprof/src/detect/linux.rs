use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use super::PlatformDetect;
use crate::detect::util;
use crate::types::{GpuInfo, ProbeSource};

const VENDOR_NVIDIA: u32 = 0x10DE;
const VENDOR_AMD: u32 = 0x1002;
const VENDOR_INTEL: u32 = 0x8086;
const VENDOR_APPLE: u32 = 0x106B;

const DRM_ROOT: &str = "/sys/class/drm";

fn vendor_name(id: u32) -> &'static str {
    match id {
        VENDOR_NVIDIA => "NVIDIA",
        VENDOR_AMD => "AMD",
        VENDOR_INTEL => "Intel",
        VENDOR_APPLE => "Apple",
        _ => "Unknown",
    }
}

pub fn detect_platform() -> Result<PlatformDetect> {
    let mut diags: Vec<String> = Vec::new();
    let to = Duration::from_millis(util::env_timeout_ms());

    let (mut gpus, sysfs_ms) = if util::disabled("sysfs") {
        diags.push("[sysfs] disabled by env".into());
        (Vec::new(), 0)
    } else {
        let (out, reason, ms) =
            util::with_timeout("sysfs", to, || enumerate_sysfs(Path::new(DRM_ROOT)));
        match out {
            Some(Ok(v)) => (v, ms),
            Some(Err(e)) => {
                diags.push(format!("[sysfs] error: {e}"));
                (Vec::new(), ms)
            }
            None => {
                diags.push(format!("[sysfs] {}", reason.unwrap_or_else(|| "timeout".into())));
                (Vec::new(), ms)
            }
        }
    };

    // lspci is only consulted when sysfs had nothing to say.
    let mut lspci_ms = 0;
    if gpus.is_empty() && !util::disabled("lspci") {
        let (out, reason, ms) = util::with_timeout("lspci", to, run_lspci);
        lspci_ms = ms;
        match out {
            Some(Ok(text)) => gpus = parse_lspci(&text),
            Some(Err(e)) => diags.push(format!("[lspci] error: {e}")),
            None => diags.push(format!("[lspci] {}", reason.unwrap_or_else(|| "timeout".into()))),
        }
    }

    Ok(PlatformDetect {
        gpus,
        probe_total_ms: sysfs_ms + lspci_ms,
        diagnostics: diags,
    })
}

/// Walk `<drm_root>/cardN/device/{vendor,device}`; connector entries (`card0-DP-1`) are skipped.
pub(crate) fn enumerate_sysfs(drm_root: &Path) -> Result<Vec<GpuInfo>> {
    let mut out = Vec::new();
    let entries =
        fs::read_dir(drm_root).with_context(|| format!("reading {}", drm_root.display()))?;

    let mut cards: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            name.starts_with("card") && !name.contains('-')
        })
        .map(|e| e.path())
        .collect();
    cards.sort();

    for card in cards {
        let device_dir = card.join("device");
        let Some(vendor_id) = read_hex_id(&device_dir.join("vendor")) else {
            continue;
        };
        let device_id = read_hex_id(&device_dir.join("device")).unwrap_or(0);
        let vendor = vendor_name(vendor_id).to_string();
        let name = format!("{vendor} device {device_id:04x}");

        out.push(GpuInfo {
            vendor_id,
            device_id,
            vendor,
            software_renderer: util::is_software_renderer(&name),
            name,
            integrated: vendor_id == VENDOR_INTEL,
            source: ProbeSource::Sysfs,
        });
    }
    Ok(out)
}

fn read_hex_id(path: &Path) -> Option<u32> {
    let raw = fs::read_to_string(path).ok()?;
    parse_hex_id(&raw)
}

pub(crate) fn parse_hex_id(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u32::from_str_radix(digits, 16).ok()
}

fn run_lspci() -> Result<String> {
    let out = Command::new("lspci").output().context("spawn lspci")?;
    if !out.status.success() {
        return Err(anyhow!("lspci exited with {}", out.status));
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

/// Pick display controllers out of plain `lspci` output.
pub(crate) fn parse_lspci(text: &str) -> Vec<GpuInfo> {
    const CLASSES: &[&str] = &[
        "VGA compatible controller:",
        "3D controller:",
        "Display controller:",
    ];

    text.lines()
        .filter_map(|line| {
            let class = CLASSES.iter().find(|c| line.contains(*c))?;
            let (_, desc) = line.split_once(class)?;
            let desc = desc.trim().to_string();
            let lower = desc.to_ascii_lowercase();
            let vendor_id = if lower.contains("nvidia") {
                VENDOR_NVIDIA
            } else if lower.contains("advanced micro devices") || lower.contains("amd") {
                VENDOR_AMD
            } else if lower.contains("intel") {
                VENDOR_INTEL
            } else {
                0
            };
            Some(GpuInfo {
                vendor_id,
                device_id: 0,
                vendor: vendor_name(vendor_id).to_string(),
                software_renderer: util::is_software_renderer(&desc),
                integrated: vendor_id == VENDOR_INTEL,
                name: desc,
                source: ProbeSource::Lspci,
            })
        })
        .collect()
}
