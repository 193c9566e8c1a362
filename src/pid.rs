//! Per-axis PID regulator: trapezoidal-rule integration, derivative on the
//! measurement (not the error, to avoid derivative kick), symmetric
//! anti-windup clamp, and a small-error deadband.

use crate::consts::PID_ERROR_DEADBAND;

#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub i_limit: f32,
}

impl PidGains {
    pub const fn new(kp: f32, ki: f32, kd: f32, i_limit: f32) -> Self {
        Self { kp, ki, kd, i_limit }
    }
}

#[derive(Clone, Copy, Debug, Default, defmt::Format)]
pub struct Pid {
    gains: PidGainsRepr,
    integral: f32,
    prev_input: f32,
    prev_error: f32,
    pub out: f32,
}

/// `defmt::Format`/`Default` can't be derived through `PidGains` directly
/// since it has no `Default`; this newtype gives `Pid` a zero-valued
/// default while keeping `PidGains` a plain value type.
#[derive(Clone, Copy, Debug)]
struct PidGainsRepr(PidGains);

impl Default for PidGainsRepr {
    fn default() -> Self {
        Self(PidGains::new(0.0, 0.0, 0.0, 0.0))
    }
}

impl defmt::Format for PidGainsRepr {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "PidGains {{ kp: {}, ki: {}, kd: {}, i_limit: {} }}",
            self.0.kp,
            self.0.ki,
            self.0.kd,
            self.0.i_limit
        )
    }
}

impl Pid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains: PidGainsRepr(gains),
            integral: 0.0,
            prev_input: 0.0,
            prev_error: 0.0,
            out: 0.0,
        }
    }

    pub fn gains(&self) -> PidGains {
        self.gains.0
    }

    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains.0 = gains;
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_input = 0.0;
        self.prev_error = 0.0;
        self.out = 0.0;
    }

    /// Runs one update given the set-point and the current measurement,
    /// with `dt` seconds since the last call. Returns and stores the new
    /// output.
    pub fn update(&mut self, set_point: f32, measurement: f32, dt: f32) -> f32 {
        let gains = self.gains.0;
        let mut error = measurement - set_point;
        if error.abs() < PID_ERROR_DEADBAND {
            error = 0.0;
        }

        // Trapezoidal-rule integration of the error signal.
        self.integral += 0.5 * (error + self.prev_error) * dt * gains.ki;
        if gains.i_limit > 0.0 {
            self.integral = self.integral.clamp(-gains.i_limit, gains.i_limit);
        }

        let derivative = if dt > 0.0 {
            (measurement - self.prev_input) / dt * gains.kd
        } else {
            0.0
        };

        self.out = gains.kp * error + self.integral - derivative;

        self.prev_input = measurement;
        self.prev_error = error;
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_only_matches_hand_computed_value() {
        let mut pid = Pid::new(PidGains::new(0.16, 0.0, 0.0, 1.2));
        let out = pid.update(0.0, core::f32::consts::PI / 8.0, crate::consts::SAMPLE_PERIOD_S);
        assert!((out - 0.0628).abs() < 1e-3);
    }

    #[test]
    fn small_error_clamps_to_zero() {
        let mut pid = Pid::new(PidGains::new(1.0, 1.0, 1.0, 10.0));
        let out = pid.update(0.0, 1e-5, crate::consts::SAMPLE_PERIOD_S);
        assert_eq!(out, 0.0);
    }

    #[test]
    fn integral_clamps_to_i_limit() {
        let mut pid = Pid::new(PidGains::new(0.0, 10.0, 0.0, 0.5));
        for _ in 0..1000 {
            pid.update(0.0, 1.0, crate::consts::SAMPLE_PERIOD_S);
        }
        assert!(pid.out <= 0.5 + 1e-6);
    }

    #[test]
    fn derivative_uses_measurement_not_error_to_avoid_kick() {
        let mut pid = Pid::new(PidGains::new(0.0, 0.0, 1.0, 0.0));
        pid.update(0.0, 1.0, crate::consts::SAMPLE_PERIOD_S);
        // A set-point jump with unchanged measurement shouldn't spike the
        // derivative term, since it's computed from `measurement` alone.
        let out = pid.update(5.0, 1.0, crate::consts::SAMPLE_PERIOD_S);
        assert_eq!(out, 0.0);
    }
}
