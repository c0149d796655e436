//! Terminal implementation of the front-end callbacks: spinners for progress
//! entries, plain lines for everything else.

use cellar_components::{CreationStatus, ProgressId, Ui};
use cellar_core::DependencyWidget;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub struct CliUi {
    bars: MultiProgress,
    entries: Mutex<HashMap<u64, ProgressBar>>,
    next_id: AtomicU64,
    quiet: bool,
}

impl CliUi {
    pub fn new(quiet: bool) -> Self {
        Self {
            bars: MultiProgress::new(),
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            quiet,
        }
    }

    fn line(&self, text: &str) {
        if self.bars.println(text).is_err() {
            eprintln!("{text}");
        }
    }
}

impl Ui for CliUi {
    fn notify(&self, title: &str, body: &str, _icon: &str) {
        self.line(&format!("[{title}] {body}"));
    }

    fn register_progress(&self, label: &str) -> ProgressId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let bar = self.bars.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            bar.set_style(style);
        }
        bar.set_message(label.to_string());
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, bar);
        ProgressId(id)
    }

    fn pulse(&self, id: ProgressId) {
        if let Some(bar) = self.entries.lock().unwrap_or_else(|e| e.into_inner()).get(&id.0) {
            bar.tick();
        }
    }

    fn destroy_progress(&self, id: ProgressId) {
        if let Some(bar) = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id.0)
        {
            bar.finish_and_clear();
            self.bars.remove(&bar);
        }
    }

    fn set_ui_enabled(&self, enabled: bool) {
        tracing::trace!(enabled, "ui sensitivity");
    }

    fn refresh_environment_list(&self) {
        tracing::trace!("environment list refresh requested");
    }

    fn refresh_component_lists(&self) {
        tracing::trace!("component list refresh requested");
    }

    fn append_output(&self, text: &str) {
        if !self.quiet {
            for l in text.lines().filter(|l| !l.trim().is_empty()) {
                self.line(l);
            }
        }
    }

    fn set_creation_status(&self, status: CreationStatus) {
        tracing::debug!(?status, "creation status");
    }

    fn show_component_preferences(&self) {
        self.line("Missing components; run `cellar checks --install-latest` or `cellar install`.");
    }
}

/// Prints the affordance flips a GUI row would show.
pub struct CliWidget {
    pub id: String,
}

impl DependencyWidget for CliWidget {
    fn set_install_sensitive(&self, sensitive: bool) {
        tracing::debug!(dependency = %self.id, sensitive, "install affordance");
    }

    fn show_installed(&self, installed: bool) {
        let state = if installed { "installed" } else { "not installed" };
        eprintln!("{}: {state}", self.id);
    }
}
