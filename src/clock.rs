//! Clock domains and conversions.
//!
//! The generator works in two clock domains: the host reference clock at
//! 27 MHz, in which all collaborator timestamps (`cr_sys`, `pts_prog`,
//! durations, the repetition interval) are expressed, and the 33-bit
//! 90 kHz MPEG PTS clock used on the wire.

/// Host reference clock frequency (27 MHz).
pub const UCLOCK_FREQ: u64 = 27_000_000;

/// MPEG PTS/DTS clock frequency (90 kHz).
pub const MPEG_FREQ: u64 = 90_000;

/// Ratio between the host clock and the MPEG clock.
pub const CLOCK_SCALE: u64 = UCLOCK_FREQ / MPEG_FREQ;

/// 2^33, the wrap point of PCR, PTS and DTS values.
pub const PTS_WRAP: u64 = 1 << 33;

/// Converts a host-clock timestamp to a 33-bit 90 kHz PTS value.
///
/// The division truncates and the result wraps modulo 2^33, so arbitrarily
/// large host timestamps map onto the MPEG timeline.
#[inline]
pub fn host_to_pts(ticks: u64) -> u64 {
    (ticks / CLOCK_SCALE) % PTS_WRAP
}
