/// The two persisted user settings the core reads.
pub trait Settings: Send + Sync {
    fn notifications_enabled(&self) -> bool;
    fn temp_cleanup_enabled(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticSettings {
    pub notifications: bool,
    pub temp_cleanup: bool,
}

impl StaticSettings {
    /// `CELLAR_NOTIFICATIONS` / `CELLAR_CLEAR_TEMP` ("1" or "true").
    pub fn from_env() -> Self {
        Self {
            notifications: env_flag("CELLAR_NOTIFICATIONS"),
            temp_cleanup: env_flag("CELLAR_CLEAR_TEMP"),
        }
    }
}

impl Settings for StaticSettings {
    fn notifications_enabled(&self) -> bool {
        self.notifications
    }

    fn temp_cleanup_enabled(&self) -> bool {
        self.temp_cleanup
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
