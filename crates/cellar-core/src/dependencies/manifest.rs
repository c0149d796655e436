use cellar_components::{DownloadRequest, DownloadSource};
use serde::Deserialize;

/// Installation recipe for one dependency package.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DependencyManifest {
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
    #[serde(rename = "Provider", default)]
    pub provider: Option<String>,
    #[serde(rename = "License", default)]
    pub license: Option<String>,
    #[serde(rename = "License_url", default)]
    pub license_url: Option<String>,
    #[serde(rename = "Steps", default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerKind {
    Exe,
    Msi,
}

/// One manifest step, executed strictly in order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawStep")]
pub enum Step {
    /// Delete DLLs from the environment's system directories.
    RemoveSystemFiles { files: Vec<String> },
    /// Stage an installer and run it inside the environment.
    RunInstaller {
        kind: InstallerKind,
        url: String,
        file_name: String,
        rename: Option<String>,
        checksum: Option<String>,
    },
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Step::RemoveSystemFiles { .. } => "delete_sys32_dlls",
            Step::RunInstaller {
                kind: InstallerKind::Exe,
                ..
            } => "install_exe",
            Step::RunInstaller {
                kind: InstallerKind::Msi,
                ..
            } => "install_msi",
        }
    }

    /// Staging request for installer steps.
    pub fn download_request(&self) -> Option<DownloadRequest> {
        match self {
            Step::RemoveSystemFiles { .. } => None,
            Step::RunInstaller {
                url,
                file_name,
                rename,
                checksum,
                ..
            } => Some(DownloadRequest {
                source: DownloadSource::Direct(url.clone()),
                file_name: file_name.clone(),
                rename: rename.clone(),
                checksum: checksum.clone(),
            }),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "action")]
enum RawStep {
    #[serde(rename = "delete_sys32_dlls")]
    DeleteSys32Dlls {
        #[serde(default)]
        dlls: Vec<String>,
    },
    #[serde(rename = "install_exe")]
    InstallExe(RawInstaller),
    #[serde(rename = "install_msi")]
    InstallMsi(RawInstaller),
}

#[derive(Deserialize)]
struct RawInstaller {
    url: String,
    file_name: String,
    #[serde(default)]
    rename: Option<String>,
    #[serde(default)]
    file_checksum: Option<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

impl From<RawStep> for Step {
    fn from(raw: RawStep) -> Self {
        let installer = |kind, r: RawInstaller| Step::RunInstaller {
            kind,
            url: r.url,
            file_name: r.file_name,
            rename: non_empty(r.rename),
            checksum: non_empty(r.file_checksum),
        };
        match raw {
            RawStep::DeleteSys32Dlls { dlls } => Step::RemoveSystemFiles { files: dlls },
            RawStep::InstallExe(r) => installer(InstallerKind::Exe, r),
            RawStep::InstallMsi(r) => installer(InstallerKind::Msi, r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_wire_step_names() -> serde_json::Result<()> {
        let manifest: DependencyManifest = serde_json::from_value(json!({
            "Name": "vcredist2019",
            "Provider": "Microsoft",
            "Steps": [
                {"action": "delete_sys32_dlls", "dlls": ["msvcp140.dll", "vcruntime140.dll"]},
                {
                    "action": "install_exe",
                    "url": "https://example.invalid/vc_redist.x86.exe",
                    "file_name": "vc_redist.x86.exe",
                    "rename": "vc_redist_2019.x86.exe",
                    "file_checksum": "ABCDEF"
                },
                {"action": "install_msi", "url": "https://example.invalid/a.msi", "file_name": "a.msi", "rename": ""}
            ]
        }))?;

        assert_eq!(manifest.name.as_deref(), Some("vcredist2019"));
        assert_eq!(manifest.license, None);
        assert_eq!(
            manifest.steps[0],
            Step::RemoveSystemFiles {
                files: vec!["msvcp140.dll".into(), "vcruntime140.dll".into()]
            }
        );
        assert_eq!(manifest.steps[1].label(), "install_exe");
        assert_eq!(manifest.steps[2].label(), "install_msi");

        let req = manifest.steps[1].download_request().expect("installer step");
        assert_eq!(req.staged_name(), "vc_redist_2019.x86.exe");
        assert_eq!(req.checksum.as_deref(), Some("ABCDEF"));
        assert_eq!(
            req.source,
            DownloadSource::Direct("https://example.invalid/vc_redist.x86.exe".into())
        );

        let msi = manifest.steps[2].download_request().expect("installer step");
        assert_eq!(msi.rename, None);
        assert_eq!(manifest.steps[0].download_request(), None);
        Ok(())
    }

    #[test]
    fn unknown_action_is_rejected() {
        let res: serde_json::Result<DependencyManifest> = serde_json::from_value(json!({
            "Steps": [{"action": "install_cab", "file_name": "x.cab"}]
        }));
        assert!(res.is_err());
    }

    #[test]
    fn missing_steps_is_empty() -> serde_json::Result<()> {
        let manifest: DependencyManifest = serde_json::from_value(json!({"Name": "empty"}))?;
        assert!(manifest.steps.is_empty());
        Ok(())
    }
}
