//! cellar-components
//!
//! Blocking I/O for Cellar's component store.
//! - Reads release feeds for runners, alternate runners and dxvk.
//! - Stages downloads in a shared temp area, verifies checksums, extracts.
//! - Keeps the installed-component index in sync with the filesystem.
//!
//! Long operations go through [`TaskRunner`] so the caller never blocks.

pub mod catalog;
pub mod errors;
pub mod feeds;
pub mod install;
pub mod net;
pub mod paths;
pub mod progress;
pub mod settings;
pub mod staging;
pub mod state;
pub mod task;
pub mod types;
pub mod ui;
pub mod verify;

pub use catalog::{ComponentCatalog, ComponentUpdate};
pub use errors::{ComponentError, Result};
pub use feeds::{fetch_releases, Feeds, Repository, DEFAULT_FEEDS};
pub use install::{extract_archive, ArchiveKind, ComponentInstaller};
pub use net::{build_client, download_to_path, Connectivity, HttpConnectivity, StaticConnectivity};
pub use paths::CellarPaths;
pub use progress::ProgressEntry;
pub use settings::{Settings, StaticSettings};
pub use staging::StagingArea;
pub use state::{Available, ComponentIndex};
pub use task::{TaskHandle, TaskRunner};
pub use types::*;
pub use ui::{icons, CreationStatus, Notifier, NullUi, ProgressId, Ui};
pub use verify::{md5_file, sha256_file, verify_checksum};

#[cfg(any(test, feature = "testing"))]
pub use ui::{RecordingUi, UiEvent};
