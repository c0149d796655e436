use crate::errors::{ComponentError, Result};
use anyhow::Context;
use reqwest::blocking::Client;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

const USER_AGENT: &str = concat!("cellar/", env!("CARGO_PKG_VERSION"));

/// Blocking HTTPS client with rustls. Release feeds reject requests without a user agent.
pub fn build_client() -> Result<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(600))
        .build()?)
}

/// Blocking download into `dest`. The body lands in a temp file next to
/// `dest` and is renamed into place only once complete.
pub fn download_to_path(client: &Client, url: &str, dest: &Path) -> Result<()> {
    let mut resp = client
        .get(url)
        .send()
        .with_context(|| format!("GET {url}"))?;
    if !resp.status().is_success() {
        return Err(ComponentError::Msg(format!(
            "download failed: {} ({url})",
            resp.status()
        )));
    }

    let parent = dest
        .parent()
        .ok_or_else(|| ComponentError::Msg(format!("no parent for {}", dest.display())))?;
    fs::create_dir_all(parent)?;

    let mut out = NamedTempFile::new_in(parent)?;
    resp.copy_to(out.as_file_mut())
        .with_context(|| format!("writing {}", dest.display()))?;
    out.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
