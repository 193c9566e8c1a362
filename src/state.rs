//! User-configurable settings: PID gains, feature defaults and calibration
//! data, saved/loaded from internal flash so they survive a reboot without
//! a reflash. Resolves the three open design questions as named fields with
//! documented defaults rather than compile-time guesses.

use crate::consts::default_gains;
use crate::pid::PidGains;
use crate::sensors::mag::Calibration as MagCalibration;

#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct UserCfg {
    pub yaw_gains: PidGainsCfg,
    pub pitch_gains: PidGainsCfg,
    pub roll_gains: PidGainsCfg,
    pub altitude_gains: PidGainsCfg,
    pub motor_deadband_offsets: [f32; 4],
    /// Off by default: the newer of the two source firmware revisions never
    /// turned this on in flight.
    pub yaw_regulation_enabled: bool,
    /// Off by default: no barometer/altimeter input is in scope, so this
    /// only matters when an accelerometer-derived vertical loop is wanted.
    pub altitude_stabilization_enabled: bool,
    /// Off by default: the source firmware never enabled the magnetometer
    /// branch in production, and this core only builds it at all behind the
    /// `magnetometer` Cargo feature.
    pub magnetometer_enabled: bool,
    pub mag_calibration: MagCalibrationCfg,
}

/// Plain-data mirror of `PidGains`, so `UserCfg` doesn't need `PidGains` to
/// derive `defmt::Format` itself (kept minimal in `pid.rs`).
#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct PidGainsCfg {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub i_limit: f32,
}

impl From<PidGainsCfg> for PidGains {
    fn from(c: PidGainsCfg) -> Self {
        PidGains::new(c.kp, c.ki, c.kd, c.i_limit)
    }
}

impl From<PidGains> for PidGainsCfg {
    fn from(g: PidGains) -> Self {
        Self {
            kp: g.kp,
            ki: g.ki,
            kd: g.kd,
            i_limit: g.i_limit,
        }
    }
}

#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct MagCalibrationCfg {
    pub offset: [f32; 3],
    pub transform: [[f32; 3]; 3],
}

impl From<MagCalibrationCfg> for MagCalibration {
    fn from(c: MagCalibrationCfg) -> Self {
        MagCalibration {
            offset: c.offset,
            transform: c.transform,
        }
    }
}

impl Default for UserCfg {
    fn default() -> Self {
        let (kp, ki, kd, lim) = default_gains::YAW;
        let yaw_gains = PidGainsCfg { kp, ki, kd, i_limit: lim };
        let (kp, ki, kd, lim) = default_gains::PITCH_ROLL;
        let pitch_gains = PidGainsCfg { kp, ki, kd, i_limit: lim };
        let roll_gains = pitch_gains;
        let (kp, ki, kd, lim) = default_gains::ALTITUDE;
        let altitude_gains = PidGainsCfg { kp, ki, kd, i_limit: lim };

        Self {
            yaw_gains,
            pitch_gains,
            roll_gains,
            altitude_gains,
            motor_deadband_offsets: crate::consts::MOTOR_DEADBAND_OFFSETS,
            yaw_regulation_enabled: false,
            altitude_stabilization_enabled: false,
            magnetometer_enabled: false,
            mag_calibration: MagCalibrationCfg {
                offset: [0.0, 0.0, 0.0],
                transform: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_open_questions_conservatively() {
        let cfg = UserCfg::default();
        assert!(!cfg.yaw_regulation_enabled);
        assert!(!cfg.altitude_stabilization_enabled);
        assert!(!cfg.magnetometer_enabled);
    }

    #[test]
    fn pid_gains_cfg_round_trips_through_pid_gains() {
        let cfg = PidGainsCfg {
            kp: 0.16,
            ki: 0.48,
            kd: 0.0004,
            i_limit: 1.2,
        };
        let gains: PidGains = cfg.into();
        let back: PidGainsCfg = gains.into();
        assert_eq!(back.kp, cfg.kp);
        assert_eq!(back.i_limit, cfg.i_limit);
    }
}
