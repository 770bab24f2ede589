//! Simulation strategy and state types.
//!
//! The world is parameterized by a [`SimulationStrategy`] that determines how
//! time advances. Both strategies run the same logic tick (world generation,
//! deferred dispatch, transport); they differ only in how many ticks are run
//! per `advance()` call.

use crate::fixed::Ticks;

// ---------------------------------------------------------------------------
// Simulation strategy
// ---------------------------------------------------------------------------

/// How the world advances time. Chosen at world construction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SimulationStrategy {
    /// Single tick per call. The driver calls `world.step()` at a fixed rate.
    Tick,

    /// Real-time mode. The driver calls `world.advance(dt)` with elapsed
    /// time; whole steps are run and the remainder carried forward.
    Delta {
        /// Duration of one fixed simulation step, in ticks.
        fixed_timestep: Ticks,
    },
}

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

/// Mutable simulation clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimState {
    /// Last tick processed. 0 before the first tick.
    pub tick: Ticks,

    /// Accumulated time remainder for delta mode.
    pub accumulator: Ticks,
}

impl SimState {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Advance result
// ---------------------------------------------------------------------------

/// Result of a `World::advance()` call.
#[derive(Debug, Default)]
pub struct AdvanceResult {
    /// Number of logic ticks actually executed.
    pub steps_run: u64,
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash of simulation state for desync detection.
///
/// Uses FNV-1a (64-bit). Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_fixed64(&mut self, v: crate::fixed::Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_state_starts_at_zero() {
        let state = SimState::new();
        assert_eq!(state.tick, 0);
        assert_eq!(state.accumulator, 0);
    }

    #[test]
    fn state_hash_deterministic() {
        let mut h1 = StateHash::new();
        h1.write_u64(42);
        h1.write_i32(-7);

        let mut h2 = StateHash::new();
        h2.write_u64(42);
        h2.write_i32(-7);

        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn state_hash_order_matters() {
        let mut h1 = StateHash::new();
        h1.write_u32(1);
        h1.write_u32(2);

        let mut h2 = StateHash::new();
        h2.write_u32(2);
        h2.write_u32(1);

        assert_ne!(h1.finish(), h2.finish());
    }
}
