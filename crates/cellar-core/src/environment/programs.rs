use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

static EXE_PATH: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?-u)C:.*\.exe").ok());

/// First `C:...exe` path embedded in a shortcut file.
pub fn lnk_target(bytes: &[u8]) -> Option<String> {
    EXE_PATH
        .as_ref()?
        .find(bytes)
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
}

fn start_menu_roots(prefix: &Path) -> Vec<PathBuf> {
    let drive_c = prefix.join("drive_c");
    let mut roots = Vec::new();
    if let Ok(users) = fs::read_dir(drive_c.join("users")) {
        for user in users.flatten() {
            roots.push(user.path().join("Start Menu").join("Programs"));
        }
    }
    roots.push(drive_c.join("ProgramData/Microsoft/Windows/Start Menu/Programs"));
    roots
}

/// Launchable programs of an environment: shortcut name -> executable path.
pub fn discover_programs(prefix: &Path) -> BTreeMap<String, String> {
    let mut programs = BTreeMap::new();
    for root in start_menu_roots(prefix) {
        for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("lnk")
                || entry.file_name() == "Uninstall.lnk"
            {
                continue;
            }
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            match fs::read(path).ok().as_deref().and_then(lnk_target) {
                Some(exe) if !exe.contains("ninstall") => {
                    programs.insert(name, exe);
                }
                Some(_) => {}
                None => tracing::error!(shortcut = %name, "cannot get executable"),
            }
        }
    }
    programs
}
