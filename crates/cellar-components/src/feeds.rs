use crate::errors::Result;
use crate::types::{ComponentKind, Release};
use anyhow::Context;
use once_cell::sync::Lazy;
use reqwest::blocking::Client;

/// One upstream repository: its release-listing API and its download base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub releases_api: String,
    pub downloads: String,
}

impl Repository {
    fn github(slug: &str) -> Self {
        Self {
            releases_api: format!("https://api.github.com/repos/{slug}/releases"),
            downloads: format!("https://github.com/{slug}/releases"),
        }
    }

    /// `<downloads>/download/<tag>/<file>`
    pub fn asset_url(&self, tag: &str, file: &str) -> String {
        format!("{}/download/{tag}/{file}", self.downloads.trim_end_matches('/'))
    }
}

/// Remote feeds consumed by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feeds {
    pub runner: Repository,
    pub proton: Repository,
    pub dxvk: Repository,
    /// Base URL holding `index.json` and `<dependency>.json` manifests.
    pub dependencies: String,
}

pub static DEFAULT_FEEDS: Lazy<Feeds> = Lazy::new(|| Feeds {
    runner: Repository::github("lutris/wine"),
    proton: Repository::github("GloriousEggroll/proton-ge-custom"),
    dxvk: Repository::github("doitsujin/dxvk"),
    dependencies: "https://raw.githubusercontent.com/bottlesdevs/dependencies/main".to_string(),
});

impl Feeds {
    /// Defaults, with `CELLAR_{RUNNER,PROTON,DXVK}_FEED` / `_DOWNLOADS` and
    /// `CELLAR_DEPENDENCIES_URL` overrides.
    pub fn from_env() -> Self {
        let mut feeds = DEFAULT_FEEDS.clone();
        for (prefix, repo) in [
            ("RUNNER", &mut feeds.runner),
            ("PROTON", &mut feeds.proton),
            ("DXVK", &mut feeds.dxvk),
        ] {
            if let Ok(v) = std::env::var(format!("CELLAR_{prefix}_FEED")) {
                repo.releases_api = v;
            }
            if let Ok(v) = std::env::var(format!("CELLAR_{prefix}_DOWNLOADS")) {
                repo.downloads = v;
            }
        }
        if let Ok(v) = std::env::var("CELLAR_DEPENDENCIES_URL") {
            feeds.dependencies = v;
        }
        feeds
    }

    pub fn repository(&self, kind: ComponentKind) -> &Repository {
        match kind {
            ComponentKind::Runner => &self.runner,
            ComponentKind::CompatLayerVariant => &self.proton,
            ComponentKind::GraphicsShim => &self.dxvk,
        }
    }

    pub fn dependency_index_url(&self) -> String {
        format!("{}/index.json", self.dependencies.trim_end_matches('/'))
    }

    pub fn dependency_manifest_url(&self, id: &str) -> String {
        format!("{}/{id}.json", self.dependencies.trim_end_matches('/'))
    }
}

/// Fetch a release listing (blocking), newest first as served upstream.
pub fn fetch_releases(client: &Client, repo: &Repository) -> Result<Vec<Release>> {
    let url = &repo.releases_api;
    let txt = client
        .get(url)
        .send()
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .with_context(|| format!("release listing request failed ({url})"))?
        .text()?;
    let releases: Vec<Release> =
        serde_json::from_str(&txt).with_context(|| format!("invalid release JSON from {url}"))?;
    Ok(releases)
}
