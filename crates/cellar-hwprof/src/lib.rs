//! Cellar host profiling crate.
//! Detects graphics adapters and storage, caches to `<cache>/host-profile.json`.

pub mod cache;
pub mod detect;
pub mod storage;
pub mod types;

pub use cache::{detect_and_cache, load_cached, load_or_detect, validate_or_redetect};
pub use detect::detect_now;
pub use storage::{human_size, storage_info};
pub use types::{GpuInfo, HostProfile, ProbeSource, StorageInfo};
