use anyhow::Context;
use cellar_components::{ComponentError, Connectivity, Feeds};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::manifest::DependencyManifest;
use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DependencyInfo {
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Category", default)]
    pub category: String,
}

/// Dependency id -> metadata, as served in `index.json`.
pub type DependencyCatalog = BTreeMap<String, DependencyInfo>;

/// Read-only client for the dependency repository.
pub struct DependencyRepository {
    client: Client,
    feeds: Feeds,
    connectivity: Arc<dyn Connectivity>,
    index: RwLock<Option<Arc<DependencyCatalog>>>,
}

impl DependencyRepository {
    pub fn new(client: Client, feeds: Feeds, connectivity: Arc<dyn Connectivity>) -> Self {
        Self {
            client,
            feeds,
            connectivity,
            index: RwLock::new(None),
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        if !self.connectivity.is_online() {
            tracing::warn!(%url, "offline, not fetching");
            return Err(ComponentError::ConnectivityUnavailable.into());
        }
        let txt = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("dependency repository request failed ({url})"))?
            .text()?;
        let value = serde_json::from_str(&txt).with_context(|| format!("invalid JSON from {url}"))?;
        Ok(value)
    }

    /// Fetch `index.json` and remember it.
    pub fn fetch_index(&self) -> Result<Arc<DependencyCatalog>> {
        let catalog: Arc<DependencyCatalog> = Arc::new(self.get_json(&self.feeds.dependency_index_url())?);
        tracing::info!(count = catalog.len(), "dependency index fetched");
        *self.index.write().unwrap_or_else(|e| e.into_inner()) = Some(catalog.clone());
        Ok(catalog)
    }

    /// Last index fetched, if any.
    pub fn cached_index(&self) -> Option<Arc<DependencyCatalog>> {
        self.index.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Manifests are fetched fresh on every call.
    pub fn fetch_manifest(&self, id: &str) -> Result<DependencyManifest> {
        let manifest: DependencyManifest = self.get_json(&self.feeds.dependency_manifest_url(id))?;
        tracing::debug!(dependency = id, steps = manifest.steps.len(), "manifest fetched");
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellar_components::{build_client, StaticConnectivity, DEFAULT_FEEDS};
    use crate::errors::CoreError;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;

    fn repository(server: &Server, online: bool) -> DependencyRepository {
        let feeds = Feeds {
            dependencies: server.url_str("/deps"),
            ..DEFAULT_FEEDS.clone()
        };
        DependencyRepository::new(
            build_client().expect("client"),
            feeds,
            Arc::new(StaticConnectivity(online)),
        )
    }

    #[test]
    fn index_maps_ids_to_metadata() -> Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/deps/index.json")).respond_with(
                json_encoded(json!({
                    "vcredist2019": {"Description": "Visual C++ 2019", "Category": "Essentials"},
                    "corefonts": {"Description": "Microsoft core fonts", "Category": "Fonts"}
                })),
            ),
        );
        let repo = repository(&server, true);
        assert!(repo.cached_index().is_none());

        let index = repo.fetch_index()?;
        assert_eq!(index.len(), 2);
        assert_eq!(index["corefonts"].category, "Fonts");
        assert_eq!(repo.cached_index().as_deref(), Some(&*index));
        Ok(())
    }

    #[test]
    fn offline_manifest_fetch_is_an_explicit_error() {
        let server = Server::run();
        let repo = repository(&server, false);
        let err = repo.fetch_manifest("vcredist2019").expect_err("offline");
        assert!(matches!(
            err,
            CoreError::Component(ComponentError::ConnectivityUnavailable)
        ));
    }

    #[test]
    fn http_failure_is_reported() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/deps/missing.json"))
                .respond_with(status_code(404)),
        );
        assert!(repository(&server, true).fetch_manifest("missing").is_err());
    }
}
