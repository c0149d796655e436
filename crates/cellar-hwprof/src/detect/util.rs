use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

pub fn env_timeout_ms() -> u64 {
    std::env::var("CELLAR_HWPROF_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|&v| v >= 200)
        .unwrap_or(2000)
}

pub fn hwprof_debug() -> bool {
    std::env::var("CELLAR_HWPROF_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn disabled(name: &str) -> bool {
    let key = format!("CELLAR_HWPROF_DISABLE_{}", name.to_ascii_uppercase());
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Run a closure on a worker thread and join with timeout.
/// Returns (result, maybe_reason, elapsed_ms)
pub fn with_timeout<T: Send + 'static, F: FnOnce() -> T + Send + 'static>(
    label: &str,
    dur: Duration,
    f: F,
) -> (Option<T>, Option<String>, u64) {
    let (tx, rx) = mpsc::channel();
    let start = Instant::now();
    thread::spawn(move || {
        let out = f();
        let _ = tx.send(out);
    });
    let res = rx.recv_timeout(dur).ok();
    let ms = start.elapsed().as_millis() as u64;
    if res.is_none() {
        (None, Some(format!("{label}_timeout")), ms)
    } else {
        (res, None, ms)
    }
}

pub fn is_software_renderer(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ["llvmpipe", "softpipe", "swrast", "swiftshader"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_renderers_are_recognised() {
        assert!(is_software_renderer("llvmpipe (LLVM 15.0.7, 256 bits)"));
        assert!(is_software_renderer("SwiftShader Device"));
        assert!(!is_software_renderer("NVIDIA GeForce RTX 3060"));
    }

    #[test]
    fn with_timeout_reports_slow_probe() {
        let (out, reason, _) = with_timeout("slow", Duration::from_millis(20), || {
            thread::sleep(Duration::from_millis(500));
            1
        });
        assert!(out.is_none());
        assert_eq!(reason.as_deref(), Some("slow_timeout"));
    }

    #[test]
    fn with_timeout_returns_fast_result() {
        let (out, reason, _) = with_timeout("fast", Duration::from_secs(2), || 7);
        assert_eq!(out, Some(7));
        assert!(reason.is_none());
    }
}
