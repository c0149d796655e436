use crate::detect::detect_now;
use crate::types::HostProfile;
use anyhow::{Context, Result};
use chrono::Utc;
use serde_json as json;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

const PROFILE_FILE: &str = "host-profile.json";

pub fn profile_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(PROFILE_FILE)
}

pub fn load_cached(cache_dir: &Path) -> Option<HostProfile> {
    let buf = fs::read(profile_path(cache_dir)).ok()?;
    json::from_slice::<HostProfile>(&buf).ok()
}

pub fn save_profile(cache_dir: &Path, p: &HostProfile) -> Result<()> {
    fs::create_dir_all(cache_dir).with_context(|| format!("mkd {}", cache_dir.display()))?;
    let tmp = cache_dir.join(format!("{PROFILE_FILE}.tmp"));
    fs::write(&tmp, json::to_vec_pretty(p)?)?;
    fs::rename(&tmp, profile_path(cache_dir))?;
    Ok(())
}

/// Always returns a profile; if cache exists, returns it without re-detecting.
pub fn load_or_detect(cache_dir: &Path, data_root: &Path) -> Result<HostProfile> {
    if let Some(p) = load_cached(cache_dir) {
        return Ok(p);
    }
    detect_and_cache(cache_dir, data_root)
}

/// Runs detection now and caches the result, returning the fresh profile.
pub fn detect_and_cache(cache_dir: &Path, data_root: &Path) -> Result<HostProfile> {
    let mut p = detect_now(data_root)?;
    p.schema = 1;
    p.fingerprint = compute_fingerprint(&p);
    let now = Utc::now().to_rfc3339();
    p.created_at = now.clone();
    p.updated_at = now;
    save_profile(cache_dir, &p)?;
    tracing::debug!(gpus = p.gpus.len(), "host profile cached");
    Ok(p)
}

/// Stable identity of the adapter set. Storage numbers are excluded.
pub fn compute_fingerprint(p: &HostProfile) -> String {
    let mut hasher = Sha256::new();
    hasher.update(p.os.as_bytes());
    hasher.update(p.arch.as_bytes());
    for g in &p.gpus {
        hasher.update(g.vendor_id.to_le_bytes());
        hasher.update(g.device_id.to_le_bytes());
        hasher.update(g.vendor.as_bytes());
        hasher.update(g.name.as_bytes());
        hasher.update([g.integrated as u8, g.software_renderer as u8]);
    }
    hex::encode(hasher.finalize())
}

/// Re-detect, and rewrite the cache only when the fingerprint moved.
pub fn validate_or_redetect(cache_dir: &Path, data_root: &Path) -> Result<HostProfile> {
    let cached = load_cached(cache_dir);
    let mut fresh = detect_now(data_root)?;
    fresh.schema = 1;
    fresh.fingerprint = compute_fingerprint(&fresh);
    match cached {
        Some(c) if c.fingerprint == fresh.fingerprint => Ok(c),
        cached => {
            let now = Utc::now().to_rfc3339();
            fresh.created_at = cached.map(|c| c.created_at).unwrap_or_else(|| now.clone());
            fresh.updated_at = now;
            save_profile(cache_dir, &fresh)?;
            Ok(fresh)
        }
    }
}
