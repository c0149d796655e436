use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::task::TaskRunner;
use crate::ui::{ProgressId, Ui};

pub const PULSE_INTERVAL: Duration = Duration::from_millis(100);

/// A registered progress entry with its pulse task.
/// Dropping the entry stops the pulse and destroys the entry.
pub struct ProgressEntry {
    ui: Arc<dyn Ui>,
    id: ProgressId,
    alive: Arc<AtomicBool>,
}

impl ProgressEntry {
    pub fn start(ui: Arc<dyn Ui>, tasks: &TaskRunner, label: &str) -> Self {
        let id = ui.register_progress(label);
        let alive = Arc::new(AtomicBool::new(true));

        tasks
            .run("pulse", {
                let ui = ui.clone();
                let alive = alive.clone();
                move || {
                    while alive.load(Ordering::SeqCst) {
                        ui.pulse(id);
                        thread::sleep(PULSE_INTERVAL);
                    }
                }
            })
            .detach();

        Self { ui, id, alive }
    }

    pub fn id(&self) -> ProgressId {
        self.id
    }
}

impl Drop for ProgressEntry {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        self.ui.destroy_progress(self.id);
    }
}
