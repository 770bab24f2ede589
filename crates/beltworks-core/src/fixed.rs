use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
///
/// Used for every quantity the transport engine integrates per tick
/// (offsets, lengths, speeds, spacing) so that two worlds driven by the
/// same inputs stay bit-identical.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Logic ticks per second of game time.
pub const GAME_HERTZ: u32 = 60;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Convert a duration in seconds to whole ticks at [`GAME_HERTZ`], rounding
/// to the nearest tick.
#[inline]
pub fn seconds_to_ticks(seconds: f64) -> Ticks {
    let ticks = (seconds * f64::from(GAME_HERTZ)).round();
    if ticks.is_finite() && ticks > 0.0 {
        ticks as Ticks
    } else {
        0
    }
}
