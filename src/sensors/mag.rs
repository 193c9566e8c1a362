//! Magnetometer driver (register map matches the HMC5883L family).

use crate::error::Error;
use crate::i2c_txn::{I2cBus, TransactionQueue};

#[repr(u8)]
#[derive(Clone, Copy, Debug)]
pub enum Reg {
    ConfigA = 0x00,
    ConfigB = 0x01,
    Mode = 0x02,
    DataXMsb = 0x03,
}

/// Full-scale range, selects the gain register field and the Gauss/LSB
/// conversion factor.
#[derive(Clone, Copy, Debug)]
pub enum Range {
    Ga088 = 0,
    Ga130 = 1,
    Ga190 = 2,
    Ga250 = 3,
    Ga400 = 4,
    Ga470 = 5,
    Ga560 = 6,
    Ga810 = 7,
}

/// Gauss per LSB, indexed by `Range`.
const MAG_FACTORS: [f32; 8] = [
    7.2992701e-4,
    9.1743119e-4,
    1.2195121e-3,
    1.5151515e-3,
    2.2727273e-3,
    2.5641026e-3,
    3.0303030e-3,
    4.3478261e-3,
];

/// Hard-iron offset (Gauss) and soft-iron 3x3 transform, applied after the
/// axis remap and before normalization. Loaded from user configuration
/// rather than compiled in, so the shell's `sendCSVMagn` calibration
/// workflow can update them without a reflash.
#[derive(Clone, Copy, Debug)]
pub struct Calibration {
    pub offset: [f32; 3],
    pub transform: [[f32; 3]; 3],
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0, 0.0],
            transform: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }
}

impl Calibration {
    fn apply(&self, v: [f32; 3]) -> [f32; 3] {
        let c = [v[0] - self.offset[0], v[1] - self.offset[1], v[2] - self.offset[2]];
        let m = &self.transform;
        [
            m[0][0] * c[0] + m[0][1] * c[1] + m[0][2] * c[2],
            m[1][0] * c[0] + m[1][1] * c[1] + m[1][2] * c[2],
            m[2][0] * c[0] + m[2][1] * c[1] + m[2][2] * c[2],
        ]
    }
}

pub struct Magnetometer {
    pub addr: u8,
    pub range: Range,
    pub calibration: Calibration,
}

impl Magnetometer {
    pub fn new(addr: u8, range: Range) -> Self {
        Self {
            addr,
            range,
            calibration: Calibration::default(),
        }
    }

    /// 75 Hz output rate, 1-sample averaging, configured gain, continuous
    /// measurement mode.
    pub fn configure(
        &self,
        queue: &mut TransactionQueue,
        bus: &mut impl I2cBus,
        max_wait_ticks: u32,
    ) -> Result<(), Error> {
        // CRA: 1-sample average (00), 75 Hz (110), normal measurement (00).
        queue.async_reg_write(bus, self.addr, Reg::ConfigA as u8, &[0b0001_1000], None);
        queue.wait(max_wait_ticks, || queue.on_interrupt(bus))?;

        let gain = (self.range as u8) << 5;
        queue.async_reg_write(bus, self.addr, Reg::ConfigB as u8, &[gain], None);
        queue.wait(max_wait_ticks, || queue.on_interrupt(bus))?;

        queue.async_reg_write(bus, self.addr, Reg::Mode as u8, &[0x00], None);
        queue.wait(max_wait_ticks, || queue.on_interrupt(bus))?;

        Ok(())
    }

    /// Converts a 6-byte burst read (raw X, Z, Y, each big-endian i16 in the
    /// HMC5883L's native ordering) into the accel/gyro body frame, with
    /// hard/soft-iron compensation applied after the remap.
    ///
    /// Axis convention: `mag_x <- +raw_y`, `mag_y <- -raw_x`, `mag_z <- +raw_z`.
    pub fn convert(&self, raw: &[u8; 6]) -> [f32; 3] {
        let f = MAG_FACTORS[self.range as usize];
        let raw_x = be_i16(raw[0], raw[1]) as f32 * f;
        let raw_z = be_i16(raw[2], raw[3]) as f32 * f;
        let raw_y = be_i16(raw[4], raw[5]) as f32 * f;
        let remapped = [raw_y, -raw_x, raw_z];
        self.calibration.apply(remapped)
    }
}

fn be_i16(hi: u8, lo: u8) -> i16 {
    (((hi as u16) << 8) | lo as u16) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_remap_matches_contract() {
        let mag = Magnetometer::new(0x1e, Range::Ga130);
        let mut raw = [0u8; 6];
        // raw_x = 100 counts
        raw[1] = 100;
        let out = mag.convert(&raw);
        // mag_y <- -raw_x
        assert!(out[1] < 0.0);
    }

    #[test]
    fn calibration_centers_and_transforms() {
        let mut mag = Magnetometer::new(0x1e, Range::Ga130);
        mag.calibration.offset = [1.0, 2.0, 3.0];
        let out = mag.calibration.apply([1.0, 2.0, 3.0]);
        assert_eq!(out, [0.0, 0.0, 0.0]);
    }
}
