use reqwest::blocking::Client;
use std::time::Duration;

/// Pre-check run before any network operation.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// HEAD request against a probe URL; any HTTP answer counts as online.
pub struct HttpConnectivity {
    client: Client,
    probe_url: String,
}

impl HttpConnectivity {
    pub fn new(client: Client, probe_url: impl Into<String>) -> Self {
        Self {
            client,
            probe_url: probe_url.into(),
        }
    }
}

impl Connectivity for HttpConnectivity {
    fn is_online(&self) -> bool {
        match self
            .client
            .head(&self.probe_url)
            .timeout(Duration::from_secs(5))
            .send()
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(url = %self.probe_url, error = %e, "connectivity check failed");
                false
            }
        }
    }
}

/// Fixed answer, for offline mode and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticConnectivity(pub bool);

impl Connectivity for StaticConnectivity {
    fn is_online(&self) -> bool {
        self.0
    }
}
