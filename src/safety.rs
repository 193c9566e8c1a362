//! Safety interlocks: the stale-sensor-data watchdog that forces a motor
//! shut-off when the IMU stops answering, matching the error-handling
//! policy that per-frame faults during flight are fatal once they exceed a
//! tolerance, not merely logged.

use crate::error::Error;

/// Counts consecutive SDL ticks that failed to produce a fresh sample. Once
/// `max_consecutive_faults` is reached, `tripped()` latches permanently —
/// the caller is expected to call `flight_ctrls::FlightController::
/// shut_off_motors` and never clear this watchdog without a fresh boot.
pub struct Watchdog {
    consecutive_faults: u8,
    max_consecutive_faults: u8,
    /// AE ticks since the last fresh SDL frame was consumed.
    stale_ticks: u16,
    max_stale_ticks: u16,
    tripped: bool,
}

impl Watchdog {
    pub const fn new(max_consecutive_faults: u8, max_stale_ticks: u16) -> Self {
        Self {
            consecutive_faults: 0,
            max_consecutive_faults,
            stale_ticks: 0,
            max_stale_ticks,
            tripped: false,
        }
    }

    /// Call once per SDL tick with the result of that tick's bus/IMU
    /// interaction.
    pub fn note(&mut self, result: Result<(), Error>) {
        if self.tripped {
            return;
        }
        match result {
            Ok(()) => self.consecutive_faults = 0,
            Err(e) if e.is_fatal() => {
                self.consecutive_faults += 1;
                if self.consecutive_faults >= self.max_consecutive_faults {
                    self.tripped = true;
                }
            }
            Err(_) => {
                // Non-fatal faults (zero-vector, bad JSON, etc.) don't count
                // against the watchdog; they're recoverable on the next tick.
            }
        }
    }

    /// Call once per AE tick with whether that tick consumed a fresh SDL
    /// frame. Staleness accumulates independently of `note`'s discrete
    /// fault count, so a bus that never errors but also never answers
    /// still trips the interlock once `max_stale_ticks` elapses (the
    /// mandated 1 s IMU timeout at `SAMPLE_FREQ_HZ`).
    pub fn note_freshness(&mut self, fresh: bool) {
        if self.tripped {
            return;
        }
        if fresh {
            self.stale_ticks = 0;
        } else {
            self.stale_ticks += 1;
            if self.stale_ticks >= self.max_stale_ticks {
                self.tripped = true;
            }
        }
    }

    pub fn tripped(&self) -> bool {
        self.tripped
    }
}
