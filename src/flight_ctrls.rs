//! Flight controller: four PID regulators (pitch, roll, yaw, optional
//! altitude) mixed into four motor commands and pushed to PWM compare
//! registers.

use crate::consts::{default_gains, GRAVITY_MPS2, MAX_MATCH, MIN_MATCH, MOTOR_DEADBAND_OFFSETS, POWER_CEILING};
use crate::pid::{Pid, PidGains};

/// One motor's commanded power (post-mix, post-deadband-remap, pre-PWM) and
/// its derived timer-compare value.
#[derive(Clone, Copy, Debug, Default, defmt::Format)]
pub struct Motor {
    pub power: f32,
    pub compare: u16,
}

/// Inputs the mixer needs each tick: the three attitude PID outputs, the
/// operator throttle, and (if enabled) vertical acceleration for the
/// altitude loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct MixInputs {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
    pub throttle: f32,
    pub az: f32,
}

pub struct FlightController {
    pub pitch_pid: Pid,
    pub roll_pid: Pid,
    pub yaw_pid: Pid,
    pub altitude_pid: Pid,
    pub yaw_regulation_enabled: bool,
    pub altitude_stabilization_enabled: bool,
    pub motors: [Motor; 4],
    /// Per-motor measured deadband offsets, in mixer order. Defaults to
    /// `consts::MOTOR_DEADBAND_OFFSETS` but is meant to be overwritten from
    /// `UserCfg.motor_deadband_offsets` once loaded, so a saved calibration
    /// actually reaches the running mixer.
    motor_deadband_offsets: [f32; 4],
    shut_off: bool,
}

impl Default for FlightController {
    fn default() -> Self {
        Self::new()
    }
}

impl FlightController {
    pub fn new() -> Self {
        let (kp, ki, kd, lim) = default_gains::PITCH_ROLL;
        let pitch_pid = Pid::new(PidGains::new(kp, ki, kd, lim));
        let roll_pid = Pid::new(PidGains::new(kp, ki, kd, lim));
        let (kp, ki, kd, lim) = default_gains::YAW;
        let yaw_pid = Pid::new(PidGains::new(kp, ki, kd, lim));
        let (kp, ki, kd, lim) = default_gains::ALTITUDE;
        let altitude_pid = Pid::new(PidGains::new(kp, ki, kd, lim));

        Self {
            pitch_pid,
            roll_pid,
            yaw_pid,
            altitude_pid,
            // Open question resolved: yaw regulation off by default.
            yaw_regulation_enabled: false,
            altitude_stabilization_enabled: false,
            motors: [Motor::default(); 4],
            motor_deadband_offsets: MOTOR_DEADBAND_OFFSETS,
            shut_off: false,
        }
    }

    /// Overwrites the per-motor deadband offsets the mixer remaps into,
    /// normally called once at boot with `UserCfg.motor_deadband_offsets`
    /// and again whenever a new calibration is saved through the shell.
    pub fn set_motor_deadband_offsets(&mut self, offsets: [f32; 4]) {
        self.motor_deadband_offsets = offsets;
    }

    /// Asserts the motor shut-off latch. Every subsequent `run` writes
    /// `MIN_MATCH` to every motor and does nothing else; the latch never
    /// clears itself (a fresh `FlightController` is required to fly again).
    pub fn shut_off_motors(&mut self) {
        self.shut_off = true;
        for m in self.motors.iter_mut() {
            m.power = 0.0;
            m.compare = MIN_MATCH;
        }
    }

    pub fn is_shut_off(&self) -> bool {
        self.shut_off
    }

    /// Runs one control tick: attitude PIDs, the optional altitude branch,
    /// X-configuration mixing, deadband remap, and PWM compare derivation.
    /// No-ops (besides re-asserting `MIN_MATCH`) once shut off.
    pub fn run(&mut self, inputs: MixInputs, measured_pitch: f32, measured_roll: f32, measured_yaw: f32, dt: f32) {
        if self.shut_off {
            for m in self.motors.iter_mut() {
                m.power = 0.0;
                m.compare = MIN_MATCH;
            }
            return;
        }

        let pitch = self.pitch_pid.update(inputs.pitch, measured_pitch, dt);
        let roll = self.roll_pid.update(inputs.roll, measured_roll, dt);
        let yaw = if self.yaw_regulation_enabled {
            self.yaw_pid.update(inputs.yaw, measured_yaw, dt)
        } else {
            0.0
        };

        let mut throttle = inputs.throttle;
        if self.altitude_stabilization_enabled {
            let altitude_error = inputs.az - GRAVITY_MPS2;
            let correction = self.altitude_pid.update(0.0, altitude_error, dt);
            throttle -= correction;
        }

        let raw = if self.yaw_regulation_enabled {
            [
                pitch + roll + throttle - yaw,
                -pitch + roll + throttle + yaw,
                -pitch - roll + throttle - yaw,
                pitch - roll + throttle + yaw,
            ]
        } else {
            [
                pitch + roll + throttle,
                -pitch + roll + throttle,
                -pitch - roll + throttle,
                pitch - roll + throttle,
            ]
        };

        for (i, &m) in raw.iter().enumerate() {
            let clamped = m.clamp(0.0, POWER_CEILING);
            let offset = self.motor_deadband_offsets[i];
            let remapped = clamped * (1.0 - offset) + offset;
            let compare = remapped * (MAX_MATCH - MIN_MATCH) as f32 + MIN_MATCH as f32;
            self.motors[i].power = remapped;
            self.motors[i].compare = compare as u16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pwm_compare_always_within_bounds() {
        let mut fc = FlightController::new();
        let inputs = MixInputs {
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
            throttle: 10.0, // deliberately absurd to exercise the clamp
            az: GRAVITY_MPS2,
        };
        fc.run(inputs, 0.0, 0.0, 0.0, crate::consts::SAMPLE_PERIOD_S);
        for m in fc.motors.iter() {
            assert!(m.compare >= MIN_MATCH && m.compare <= MAX_MATCH);
        }
    }

    #[test]
    fn shut_off_sets_every_motor_to_min_match_and_latches() {
        let mut fc = FlightController::new();
        let inputs = MixInputs {
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
            throttle: 0.5,
            az: GRAVITY_MPS2,
        };
        fc.run(inputs, 0.0, 0.0, 0.0, crate::consts::SAMPLE_PERIOD_S);
        fc.shut_off_motors();
        for m in fc.motors.iter() {
            assert_eq!(m.compare, MIN_MATCH);
        }
        // Further ticks must not move off MIN_MATCH.
        fc.run(inputs, 1.0, 1.0, 1.0, crate::consts::SAMPLE_PERIOD_S);
        for m in fc.motors.iter() {
            assert_eq!(m.compare, MIN_MATCH);
        }
        assert!(fc.is_shut_off());
    }

    #[test]
    fn pitch_step_moves_front_and_back_motors_oppositely() {
        let mut fc = FlightController::new();
        let inputs = MixInputs {
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
            throttle: 0.3,
            az: GRAVITY_MPS2,
        };
        // Pitch measured positive (nose up relative to set-point 0) should
        // push m0/m3 (+pitch terms) one way and m1/m2 the other, before the
        // deadband remap skews the raw symmetry.
        fc.run(inputs, core::f32::consts::PI / 8.0, 0.0, 0.0, crate::consts::SAMPLE_PERIOD_S);
        assert!(fc.motors[0].power > fc.motors[1].power);
        assert!(fc.motors[3].power > fc.motors[2].power);
    }

    #[test]
    fn custom_deadband_offsets_reach_the_mixer() {
        let mut fc = FlightController::new();
        fc.set_motor_deadband_offsets([0.5, 0.5, 0.5, 0.5]);
        let inputs = MixInputs {
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
            throttle: 0.0,
            az: GRAVITY_MPS2,
        };
        fc.run(inputs, 0.0, 0.0, 0.0, crate::consts::SAMPLE_PERIOD_S);
        // A fully-raised deadband offset of 0.5 floors every motor's
        // remapped power at 0.5 regardless of a zero raw command.
        for m in fc.motors.iter() {
            assert!((m.power - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn yaw_regulation_off_by_default() {
        let fc = FlightController::new();
        assert!(!fc.yaw_regulation_enabled);
    }

    #[test]
    fn altitude_branch_subtracts_before_mixing() {
        let mut fc = FlightController::new();
        fc.altitude_stabilization_enabled = true;
        let inputs_climbing = MixInputs {
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
            throttle: 0.5,
            az: GRAVITY_MPS2 + 2.0,
        };
        fc.run(inputs_climbing, 0.0, 0.0, 0.0, crate::consts::SAMPLE_PERIOD_S);
        let throttled_power = fc.motors[0].power;

        let mut fc2 = FlightController::new();
        fc2.altitude_stabilization_enabled = true;
        let inputs_level = MixInputs {
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
            throttle: 0.5,
            az: GRAVITY_MPS2,
        };
        fc2.run(inputs_level, 0.0, 0.0, 0.0, crate::consts::SAMPLE_PERIOD_S);
        let level_power = fc2.motors[0].power;

        // Positive vertical acceleration error should reduce commanded power.
        assert!(throttled_power < level_power);
    }
}
