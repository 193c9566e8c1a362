//! Attitude estimator: a Madgwick gradient-descent complementary filter
//! fusing gyroscope integration with an accelerometer correction step (and,
//! behind the `magnetometer` feature, a magnetic-heading correction).

use lin_alg::f32::Quaternion;
use micromath::F32Ext;

use crate::consts::FILTER_BETA;
use crate::numeric::invsqrt;
use crate::sensors::SensorSample;

/// Running count of how many ticks fell back to gyro-only integration
/// because the accelerometer (or, with the feature on, the magnetometer)
/// reported a zero vector. Exposed to telemetry for field diagnosis.
#[derive(Clone, Copy, Default, Debug, defmt::Format)]
pub struct AeStats {
    pub fused_ticks: u32,
    pub gyro_only_ticks: u32,
}

/// Orientation estimator state: the current quaternion plus the derived
/// Euler angles from the last update.
pub struct AttitudeEstimator {
    q: Quaternion,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub stats: AeStats,
    /// Use the classic fast inverse square root instead of `micromath`'s
    /// `sqrt`, to match the source firmware's rounding. Off by default.
    pub use_fast_invsqrt: bool,
}

impl Default for AttitudeEstimator {
    fn default() -> Self {
        Self {
            q: Quaternion {
                w: 1.0,
                x: 0.0,
                y: 0.0,
                z: 0.0,
            },
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            stats: AeStats::default(),
            use_fast_invsqrt: false,
        }
    }
}

impl AttitudeEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quaternion(&self) -> Quaternion {
        self.q
    }

    fn recip_sqrt(&self, x: f32) -> f32 {
        if self.use_fast_invsqrt {
            invsqrt(x)
        } else {
            1.0 / x.sqrt()
        }
    }

    /// Advances the filter by one tick of period `dt` seconds, given a
    /// sensor sample. Falls back to gyro-only integration when the
    /// accelerometer vector is zero; never produces NaN.
    pub fn update(&mut self, sample: &SensorSample, dt: f32) {
        let (q0, q1, q2, q3) = (self.q.w, self.q.x, self.q.y, self.q.z);
        let (gx, gy, gz) = (sample.gyro[0], sample.gyro[1], sample.gyro[2]);
        let (mut ax, mut ay, mut az) = (sample.accel[0], sample.accel[1], sample.accel[2]);

        let mut q_dot1 = 0.5 * (-q1 * gx - q2 * gy - q3 * gz);
        let mut q_dot2 = 0.5 * (q0 * gx + q2 * gz - q3 * gy);
        let mut q_dot3 = 0.5 * (q0 * gy - q1 * gz + q3 * gx);
        let mut q_dot4 = 0.5 * (q0 * gz + q1 * gy - q2 * gx);

        if ax != 0.0 || ay != 0.0 || az != 0.0 {
            let recip_norm = self.recip_sqrt(ax * ax + ay * ay + az * az);
            ax *= recip_norm;
            ay *= recip_norm;
            az *= recip_norm;

            let _2q0 = 2.0 * q0;
            let _2q1 = 2.0 * q1;
            let _2q2 = 2.0 * q2;
            let _2q3 = 2.0 * q3;
            let _2q0q2 = 2.0 * q0 * q2;
            let _2q2q3 = 2.0 * q2 * q3;
            let q0q0 = q0 * q0;
            let q1q1 = q1 * q1;
            let q2q2 = q2 * q2;
            let q3q3 = q3 * q3;

            #[cfg(feature = "magnetometer")]
            let grad = sample.mag.filter(|m| m[0] != 0.0 || m[1] != 0.0 || m[2] != 0.0).map(
                |m| self.gradient_with_mag(q0, q1, q2, q3, ax, ay, az, m, _2q0q2, _2q2q3),
            );
            #[cfg(not(feature = "magnetometer"))]
            let grad: Option<[f32; 4]> = None;

            let mut s = grad.unwrap_or_else(|| {
                let _4q0 = 4.0 * q0;
                let _4q1 = 4.0 * q1;
                let _4q2 = 4.0 * q2;
                let _8q1 = 8.0 * q1;
                let _8q2 = 8.0 * q2;
                [
                    _4q0 * q2q2 + _2q2 * ax + _4q0 * q1q1 - _2q1 * ay,
                    _4q1 * q3q3 - _2q3 * ax + 4.0 * q0q0 * q1 - _2q0 * ay - _4q1
                        + _8q1 * q1q1
                        + _8q1 * q2q2
                        + _4q1 * az,
                    4.0 * q0q0 * q2 + _2q0 * ax + _4q2 * q3q3 - _2q3 * ay - _4q2
                        + _8q2 * q1q1
                        + _8q2 * q2q2
                        + _4q2 * az,
                    4.0 * q1q1 * q3 - _2q1 * ax + 4.0 * q2q2 * q3 - _2q2 * ay,
                ]
            });

            let recip_norm = self.recip_sqrt(s[0] * s[0] + s[1] * s[1] + s[2] * s[2] + s[3] * s[3]);
            for v in s.iter_mut() {
                *v *= recip_norm;
            }

            q_dot1 -= FILTER_BETA * s[0];
            q_dot2 -= FILTER_BETA * s[1];
            q_dot3 -= FILTER_BETA * s[2];
            q_dot4 -= FILTER_BETA * s[3];

            self.stats.fused_ticks += 1;
        } else {
            self.stats.gyro_only_ticks += 1;
        }

        let mut q0 = q0 + q_dot1 * dt;
        let mut q1 = q1 + q_dot2 * dt;
        let mut q2 = q2 + q_dot3 * dt;
        let mut q3 = q3 + q_dot4 * dt;

        let recip_norm = self.recip_sqrt(q0 * q0 + q1 * q1 + q2 * q2 + q3 * q3);
        q0 *= recip_norm;
        q1 *= recip_norm;
        q2 *= recip_norm;
        q3 *= recip_norm;

        self.q = Quaternion {
            w: q0,
            x: q1,
            y: q2,
            z: q3,
        };

        self.yaw = (2.0 * (q0 * q3 + q1 * q2)).atan2(1.0 - 2.0 * (q2 * q2 + q3 * q3));
        self.pitch = (2.0 * (q0 * q2 - q3 * q1)).asin();
        self.roll = (2.0 * (q0 * q1 + q2 * q3)).atan2(1.0 - 2.0 * (q1 * q1 + q2 * q2));
    }

    #[cfg(feature = "magnetometer")]
    #[allow(clippy::too_many_arguments)]
    fn gradient_with_mag(
        &self,
        q0: f32,
        q1: f32,
        q2: f32,
        q3: f32,
        ax: f32,
        ay: f32,
        az: f32,
        m: [f32; 3],
        _2q0q2: f32,
        _2q2q3: f32,
    ) -> [f32; 4] {
        let recip_norm = self.recip_sqrt(m[0] * m[0] + m[1] * m[1] + m[2] * m[2]);
        let (mx, my, mz) = (m[0] * recip_norm, m[1] * recip_norm, m[2] * recip_norm);

        let _2q0 = 2.0 * q0;
        let _2q1 = 2.0 * q1;
        let _2q2 = 2.0 * q2;
        let _2q3 = 2.0 * q3;
        let q0q0 = q0 * q0;
        let q0q1 = q0 * q1;
        let q0q2 = q0 * q2;
        let q0q3 = q0 * q3;
        let q1q1 = q1 * q1;
        let q1q2 = q1 * q2;
        let q1q3 = q1 * q3;
        let q2q2 = q2 * q2;
        let q2q3 = q2 * q3;
        let q3q3 = q3 * q3;

        let _2q0mx = _2q0 * mx;
        let _2q0my = _2q0 * my;
        let _2q0mz = _2q0 * mz;
        let _2q1mx = _2q1 * mx;

        let hx = mx * q0q0 - _2q0my * q3 + _2q0mz * q2 + mx * q1q1 + _2q1 * my * q2 + _2q1 * mz * q3
            - mx * q2q2
            - mx * q3q3;
        let hy = _2q0mx * q3 + my * q0q0 - _2q0mz * q1 + _2q1mx * q2 - my * q1q1 + my * q2q2
            + _2q2 * mz * q3
            - my * q3q3;
        let _2bx = self.recip_sqrt_pos(hx * hx + hy * hy);
        let _2bz = -_2q0mx * q2 + _2q0my * q1 + mz * q0q0 + _2q1mx * q3 - mz * q1q1 + _2q2 * my * q3
            - mz * q2q2
            + mz * q3q3;
        let _4bx = 2.0 * _2bx;
        let _4bz = 2.0 * _2bz;

        let s0 = -_2q2 * (2.0 * q1q3 - _2q0q2 - ax) + _2q1 * (2.0 * q0q1 + _2q2q3 - ay)
            - _2bz * q2 * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
            + (-_2bx * q3 + _2bz * q1) * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
            + _2bx * q2 * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);
        let s1 = _2q3 * (2.0 * q1q3 - _2q0q2 - ax) + _2q0 * (2.0 * q0q1 + _2q2q3 - ay)
            - 4.0 * q1 * (1.0 - 2.0 * q1q1 - 2.0 * q2q2 - az)
            + _2bz * q3 * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
            + (_2bx * q2 + _2bz * q0) * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
            + (_2bx * q3 - _4bz * q1) * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);
        let s2 = -_2q0 * (2.0 * q1q3 - _2q0q2 - ax) + _2q3 * (2.0 * q0q1 + _2q2q3 - ay)
            - 4.0 * q2 * (1.0 - 2.0 * q1q1 - 2.0 * q2q2 - az)
            + (-_4bx * q2 - _2bz * q0) * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
            + (_2bx * q1 + _2bz * q3) * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
            + (_2bx * q0 - _4bz * q2) * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);
        let s3 = _2q1 * (2.0 * q1q3 - _2q0q2 - ax) + _2q2 * (2.0 * q0q1 + _2q2q3 - ay)
            + (-_4bx * q3 + _2bz * q1) * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
            + (-_2bx * q0 + _2bz * q2) * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
            + _2bx * q1 * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);

        [s0, s1, s2, s3]
    }

    #[cfg(feature = "magnetometer")]
    fn recip_sqrt_pos(&self, x: f32) -> f32 {
        // `_2bx` in the source is `sqrt(hx^2+hy^2)`, not its reciprocal.
        1.0 / self.recip_sqrt(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_identity_orientation() {
        let ae = AttitudeEstimator::new();
        let q = ae.quaternion();
        assert_eq!((q.w, q.x, q.y, q.z), (1.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn quaternion_stays_unit_norm_after_update() {
        let mut ae = AttitudeEstimator::new();
        let sample = SensorSample {
            accel: [0.0, 0.0, 9.80665],
            gyro: [0.01, -0.02, 0.03],
            mag: None,
        };
        for _ in 0..100 {
            ae.update(&sample, crate::consts::SAMPLE_PERIOD_S);
        }
        let q = ae.quaternion();
        let norm_sq = q.w * q.w + q.x * q.x + q.y * q.y + q.z * q.z;
        assert!((norm_sq - 1.0).abs() < 1e-3);
        assert!(!q.w.is_nan() && !q.x.is_nan() && !q.y.is_nan() && !q.z.is_nan());
    }

    #[test]
    fn zero_accel_falls_back_to_gyro_only_integration() {
        let mut ae = AttitudeEstimator::new();
        let sample = SensorSample {
            accel: [0.0, 0.0, 0.0],
            gyro: [0.1, 0.0, 0.0],
            mag: None,
        };
        ae.update(&sample, crate::consts::SAMPLE_PERIOD_S);
        assert_eq!(ae.stats.gyro_only_ticks, 1);
        assert_eq!(ae.stats.fused_ticks, 0);
        let q = ae.quaternion();
        assert!(!q.w.is_nan());
        // Small rotation approximately matching q_dot_gyro * dt from identity.
        let expected_x = 0.5 * 0.1 * crate::consts::SAMPLE_PERIOD_S;
        assert!((q.x - expected_x).abs() < 1e-4);
    }

    #[test]
    fn nonzero_accel_counts_as_fused() {
        let mut ae = AttitudeEstimator::new();
        let sample = SensorSample {
            accel: [0.0, 0.0, 9.81],
            gyro: [0.0, 0.0, 0.0],
            mag: None,
        };
        ae.update(&sample, crate::consts::SAMPLE_PERIOD_S);
        assert_eq!(ae.stats.fused_ticks, 1);
    }
}
