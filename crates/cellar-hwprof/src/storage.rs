use std::path::Path;

use crate::types::StorageInfo;

/// Total/free space of the filesystem holding `data_root`; unknown values stay `None`.
pub fn storage_info(data_root: &Path) -> StorageInfo {
    StorageInfo {
        data_root: data_root.display().to_string(),
        total_bytes: fs2::total_space(data_root).ok(),
        free_bytes: fs2::available_space(data_root).ok(),
    }
}

/// Binary-prefixed size, one decimal: `1.5KiB`, `3.0GiB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size.abs() < 1024.0 {
            return format!("{size:.1}{unit}B");
        }
        size /= 1024.0;
    }
    format!("{size:.1}YiB")
}
