mod extract;
mod installer;

pub use extract::{extract_archive, ArchiveKind};
pub use installer::ComponentInstaller;

#[cfg(test)]
pub(crate) use extract::tests as extract_tests;
