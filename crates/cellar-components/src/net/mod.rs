mod connectivity;
mod download;

pub use connectivity::{Connectivity, HttpConnectivity, StaticConnectivity};
pub use download::{build_client, download_to_path};
