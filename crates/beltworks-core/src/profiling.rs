//! Per-phase timing of the most recent logic tick.
//!
//! Only available when the `profiling` feature is enabled.

use std::time::Duration;

/// Per-phase timing from the most recent tick.
#[derive(Debug, Clone, Default)]
pub struct TickProfile {
    pub worldgen: Duration,
    pub deferral: Duration,
    pub transport: Duration,
    pub total: Duration,
    pub tick: u64,
}

impl TickProfile {
    /// Returns the name and duration of the slowest phase.
    pub fn bottleneck_phase(&self) -> (&'static str, Duration) {
        let phases = [
            ("worldgen", self.worldgen),
            ("deferral", self.deferral),
            ("transport", self.transport),
        ];
        phases
            .into_iter()
            .max_by_key(|(_, d)| *d)
            .unwrap_or(("worldgen", Duration::ZERO))
    }
}
