//! Sensor driver layer: accelerometer+gyroscope and magnetometer drivers,
//! register conventions, and the raw-count to physical-unit conversions.

pub mod imu;
pub mod mag;

/// One tick's worth of converted sensor data, the hand-off point between SDL
/// and AE.
#[derive(Clone, Copy, Debug, Default, defmt::Format)]
pub struct SensorSample {
    /// Accelerometer reading, m/s^2, body frame.
    pub accel: [f32; 3],
    /// Gyroscope reading, rad/s, body frame, bias-corrected.
    pub gyro: [f32; 3],
    /// Magnetometer reading, Gauss, remapped to the accel/gyro frame and
    /// hard/soft-iron compensated. `None` until the magnetometer feature is
    /// enabled and a reading has been taken.
    pub mag: Option<[f32; 3]>,
}
