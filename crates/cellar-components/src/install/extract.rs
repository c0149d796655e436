use crate::errors::{ComponentError, Result};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::Path;
use tar::Archive;
use xz2::read::XzDecoder;
use zip::ZipArchive;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    TarXz,
    TarBz2,
    Tar,
    Zip,
}

impl ArchiveKind {
    pub fn from_name(name: &str) -> Result<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Ok(ArchiveKind::TarGz)
        } else if lower.ends_with(".tar.xz") || lower.ends_with(".txz") {
            Ok(ArchiveKind::TarXz)
        } else if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz2") {
            Ok(ArchiveKind::TarBz2)
        } else if lower.ends_with(".tar") {
            Ok(ArchiveKind::Tar)
        } else if lower.ends_with(".zip") {
            Ok(ArchiveKind::Zip)
        } else {
            Err(ComponentError::UnsupportedArchive(name.to_string()))
        }
    }
}

/// Extract `archive` into `dest`. There is no cleanup of a partially
/// extracted tree on failure.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let kind = ArchiveKind::from_name(&name)?;
    fs::create_dir_all(dest)?;

    let res = match kind {
        ArchiveKind::TarGz => untar(archive, dest, GzDecoder::new),
        ArchiveKind::TarXz => untar(archive, dest, XzDecoder::new),
        ArchiveKind::TarBz2 => untar(archive, dest, BzDecoder::new),
        ArchiveKind::Tar => untar(archive, dest, |f| f),
        ArchiveKind::Zip => unzip_into(archive, dest).map_err(|e| e.to_string()),
    };

    res.map_err(|reason| ComponentError::Extraction {
        archive: name,
        reason,
    })
}

fn untar<R, F>(archive: &Path, dest: &Path, decode: F) -> std::result::Result<(), String>
where
    R: Read,
    F: FnOnce(fs::File) -> R,
{
    fs::File::open(archive)
        .and_then(|f| Archive::new(decode(f)).unpack(dest))
        .map_err(|e| e.to_string())
}

fn unzip_into(zip_path: &Path, dest: &Path) -> Result<()> {
    let f = fs::File::open(zip_path)?;
    let mut archive = ZipArchive::new(f)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let outpath = dest.join(file.mangled_name());
        if file.name().ends_with('/') {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&outpath)?;
            std::io::copy(&mut file, &mut out)?;
        }
    }
    Ok(())
}
