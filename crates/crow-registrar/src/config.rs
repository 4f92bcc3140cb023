use std::time::Duration;

/// Tunables for one registrar process (spec §4.3).
#[derive(Debug, Clone)]
pub struct RegistrarConfig {
    pub renewal: Duration,
    pub watch_interval: Duration,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            renewal: Duration::from_millis(10_000),
            watch_interval: Duration::from_millis(2_000),
        }
    }
}
