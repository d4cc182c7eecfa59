use std::{thread, time::Duration};

/// Backs off after failing to lock an object for the `collisions`-th time in a row.
///
/// The first few collisions only yield, later ones sleep for a growing amount of time
/// so the lock holder can make progress.
pub(crate) fn collision_pause(collisions: u32) {
    let pause = pause_duration(collisions);
    if pause.is_zero() {
        thread::yield_now();
    } else {
        thread::sleep(pause);
    }
}

/// How long to sleep after `collisions` failed attempts (zero means yield)
pub(crate) fn pause_duration(collisions: u32) -> Duration {
    const YIELD_ONLY: u32 = 8;
    const MAX_PAUSE_MICROS: u64 = 10_000;

    if collisions <= YIELD_ONLY {
        return Duration::ZERO;
    }

    let exponent = (collisions - YIELD_ONLY).min(16);
    Duration::from_micros((1u64 << exponent).min(MAX_PAUSE_MICROS))
}
