use std::sync::Arc;
use std::time::Instant;

use shadow_analyzer::EngineContext;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct AppState {
    pub ctx: Arc<EngineContext>,
    pub started_at: Instant,
    /// "live" or "demo", fixed at startup.
    pub mode: &'static str,
}

impl AppState {
    pub fn new(ctx: Arc<EngineContext>, mode: &'static str) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            started_at: Instant::now(),
            mode,
        })
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
