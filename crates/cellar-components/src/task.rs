//! Background task execution.
//!
//! Every long-running operation (install, create, delete, dependency apply)
//! starts on its own named thread and the caller continues immediately.
//! Dropping the [`TaskHandle`] detaches the task; joining it yields the
//! task's value, so callers and tests can observe completion without polling.

use std::thread::{self, JoinHandle};

use crate::errors::{ComponentError, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskRunner;

impl TaskRunner {
    pub fn new() -> Self {
        Self
    }

    /// Start `f` on a fresh thread and return without waiting.
    pub fn run<T, F>(&self, name: &str, f: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        tracing::debug!(task = name, "running async job");
        let inner = thread::Builder::new()
            .name(format!("cellar-{name}"))
            .spawn(f);
        if let Err(e) = &inner {
            tracing::error!(task = name, error = %e, "failed to start task");
        }
        TaskHandle {
            name: name.to_string(),
            inner,
        }
    }
}

#[must_use = "dropping a TaskHandle detaches the task"]
pub struct TaskHandle<T> {
    name: String,
    inner: std::io::Result<JoinHandle<T>>,
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        match &self.inner {
            Ok(h) => h.is_finished(),
            Err(_) => true,
        }
    }

    /// Block until the task finishes.
    pub fn join(self) -> Result<T> {
        match self.inner {
            Ok(h) => h.join().map_err(|_| ComponentError::TaskPanicked(self.name)),
            Err(e) => Err(ComponentError::TaskSpawn(self.name, e)),
        }
    }

    /// Let the task run on unobserved.
    pub fn detach(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn run_returns_before_task_finishes() {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = TaskRunner::new().run("gate", move || {
            rx.recv().ok();
            42
        });
        assert!(!handle.is_finished());
        tx.send(()).expect("send");
        assert_eq!(handle.join().expect("join"), 42);
    }

    #[test]
    fn panicking_task_is_reported_by_name() {
        let handle = TaskRunner::new().run("boom", || -> u8 { panic!("boom") });
        match handle.join() {
            Err(ComponentError::TaskPanicked(name)) => assert_eq!(name, "boom"),
            other => panic!("expected TaskPanicked, got {other:?}"),
        }
    }

    #[test]
    fn tasks_run_concurrently() {
        let runner = TaskRunner::new();
        let (tx, rx) = mpsc::channel();
        let a = runner.run("a", {
            let tx = tx.clone();
            move || tx.send("a").ok()
        });
        let b = runner.run("b", move || tx.send("b").ok());
        a.join().expect("a");
        b.join().expect("b");
        let mut got: Vec<_> = rx.try_iter().collect();
        got.sort();
        assert_eq!(got, vec!["a", "b"]);
    }
}
