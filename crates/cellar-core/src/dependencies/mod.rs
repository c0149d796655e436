//! Dependency packages: the remote index, per-package manifests and the
//! interpreter that applies them to an environment.

mod index;
mod interpreter;
mod manifest;

pub use index::{DependencyCatalog, DependencyInfo, DependencyRepository};
pub use interpreter::ManifestInterpreter;
pub use manifest::{DependencyManifest, InstallerKind, Step};

/// Install/remove affordances for one dependency row.
pub trait DependencyWidget: Send + Sync {
    fn set_install_sensitive(&self, sensitive: bool);
    fn show_installed(&self, installed: bool);
}

/// Headless widget.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullWidget;

impl DependencyWidget for NullWidget {
    fn set_install_sensitive(&self, _sensitive: bool) {}
    fn show_installed(&self, _installed: bool) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::DependencyWidget;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum WidgetEvent {
        InstallSensitive(bool),
        Installed(bool),
    }

    #[derive(Default)]
    pub struct RecordingWidget {
        events: Mutex<Vec<WidgetEvent>>,
    }

    impl RecordingWidget {
        pub fn events(&self) -> Vec<WidgetEvent> {
            self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        fn push(&self, ev: WidgetEvent) {
            self.events.lock().unwrap_or_else(|e| e.into_inner()).push(ev);
        }
    }

    impl DependencyWidget for RecordingWidget {
        fn set_install_sensitive(&self, sensitive: bool) {
            self.push(WidgetEvent::InstallSensitive(sensitive));
        }

        fn show_installed(&self, installed: bool) {
            self.push(WidgetEvent::Installed(installed));
        }
    }
}
