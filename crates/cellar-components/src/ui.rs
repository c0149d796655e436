//! Interface to the front-end. Nothing in the core renders anything; it only
//! reports through these calls.

use std::sync::Arc;

use crate::settings::Settings;

/// Opaque id of a registered progress entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationStatus {
    Creating,
    Created,
    Failed,
}

pub trait Ui: Send + Sync {
    fn notify(&self, title: &str, body: &str, icon: &str);
    fn register_progress(&self, label: &str) -> ProgressId;
    fn pulse(&self, id: ProgressId);
    fn destroy_progress(&self, id: ProgressId);
    fn set_ui_enabled(&self, enabled: bool);
    fn refresh_environment_list(&self);
    fn refresh_component_lists(&self);

    /// Creation log buffer.
    fn append_output(&self, _text: &str) {}
    fn set_creation_status(&self, _status: CreationStatus) {}
    /// Point the user at component management (missing runner/dxvk).
    fn show_component_preferences(&self) {}
}

/// Headless front-end.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullUi;

impl Ui for NullUi {
    fn notify(&self, _title: &str, _body: &str, _icon: &str) {}
    fn register_progress(&self, _label: &str) -> ProgressId {
        ProgressId(0)
    }
    fn pulse(&self, _id: ProgressId) {}
    fn destroy_progress(&self, _id: ProgressId) {}
    fn set_ui_enabled(&self, _enabled: bool) {}
    fn refresh_environment_list(&self) {}
    fn refresh_component_lists(&self) {}
}

pub mod icons {
    pub const SAVE: &str = "document-save-symbolic";
    pub const INSTALLED: &str = "software-installed-symbolic";
    pub const ERROR: &str = "dialog-error-symbolic";
    pub const SYSTEM: &str = "applications-system-symbolic";
}

/// Notification helper gated by the user's notification setting.
/// Errors are always delivered.
#[derive(Clone)]
pub struct Notifier {
    ui: Arc<dyn Ui>,
    settings: Arc<dyn Settings>,
}

impl Notifier {
    pub fn new(ui: Arc<dyn Ui>, settings: Arc<dyn Settings>) -> Self {
        Self { ui, settings }
    }

    pub fn info(&self, title: &str, body: &str, icon: &str) {
        if self.settings.notifications_enabled() {
            self.ui.notify(title, body, icon);
        }
    }

    pub fn error(&self, title: &str, body: &str) {
        self.ui.notify(title, body, icons::ERROR);
    }

    pub fn settings(&self) -> &Arc<dyn Settings> {
        &self.settings
    }
}

#[cfg(any(test, feature = "testing"))]
pub use recording::{RecordingUi, UiEvent};

#[cfg(any(test, feature = "testing"))]
mod recording {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum UiEvent {
        Notify { title: String, body: String, icon: String },
        ProgressRegistered(String),
        ProgressDestroyed(ProgressId),
        UiEnabled(bool),
        EnvironmentListRefreshed,
        ComponentListsRefreshed,
        Output(String),
        CreationStatus(CreationStatus),
        ComponentPreferencesShown,
    }

    /// Front-end double that records every call.
    #[derive(Default)]
    pub struct RecordingUi {
        events: Mutex<Vec<UiEvent>>,
        next_id: AtomicU64,
        pulses: AtomicU64,
    }

    impl RecordingUi {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn events(&self) -> Vec<UiEvent> {
            self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        pub fn notifications(&self) -> Vec<(String, String)> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    UiEvent::Notify { title, body, .. } => Some((title, body)),
                    _ => None,
                })
                .collect()
        }

        pub fn pulses(&self) -> u64 {
            self.pulses.load(Ordering::SeqCst)
        }

        fn push(&self, event: UiEvent) {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(event);
        }
    }

    impl Ui for RecordingUi {
        fn notify(&self, title: &str, body: &str, icon: &str) {
            self.push(UiEvent::Notify {
                title: title.into(),
                body: body.into(),
                icon: icon.into(),
            });
        }
        fn register_progress(&self, label: &str) -> ProgressId {
            self.push(UiEvent::ProgressRegistered(label.into()));
            ProgressId(self.next_id.fetch_add(1, Ordering::SeqCst))
        }
        fn pulse(&self, _id: ProgressId) {
            self.pulses.fetch_add(1, Ordering::SeqCst);
        }
        fn destroy_progress(&self, id: ProgressId) {
            self.push(UiEvent::ProgressDestroyed(id));
        }
        fn set_ui_enabled(&self, enabled: bool) {
            self.push(UiEvent::UiEnabled(enabled));
        }
        fn refresh_environment_list(&self) {
            self.push(UiEvent::EnvironmentListRefreshed);
        }
        fn refresh_component_lists(&self) {
            self.push(UiEvent::ComponentListsRefreshed);
        }
        fn append_output(&self, text: &str) {
            self.push(UiEvent::Output(text.into()));
        }
        fn set_creation_status(&self, status: CreationStatus) {
            self.push(UiEvent::CreationStatus(status));
        }
        fn show_component_preferences(&self) {
            self.push(UiEvent::ComponentPreferencesShown);
        }
    }
}
