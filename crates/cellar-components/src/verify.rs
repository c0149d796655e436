use crate::errors::{ComponentError, Result};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;

/// Compare the staged file's digest against `expected` (hex, any case).
///
/// Dependency manifests publish 32-digit MD5 sums; everything else is
/// treated as SHA-256.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    let want = expected.trim().to_lowercase();
    let got = if want.len() == 32 {
        md5_file(path)?
    } else {
        sha256_file(path)?
    };

    if got != want {
        return Err(ComponentError::ChecksumMismatch {
            file: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            expected: want,
            actual: got,
        });
    }
    Ok(())
}

pub fn sha256_file(path: &Path) -> Result<String> {
    digest_file::<Sha256>(path)
}

pub fn md5_file(path: &Path) -> Result<String> {
    digest_file::<Md5>(path)
}

fn digest_file<D: Digest>(path: &Path) -> Result<String> {
    let mut f = fs::File::open(path)?;
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
