//! Saving and loading `UserCfg` to internal flash, so PID tuning and
//! magnetometer calibration survive a reboot without a reflash.

use hal::flash::{Bank, Flash};

use crate::state::{MagCalibrationCfg, PidGainsCfg, UserCfg};

#[cfg(feature = "g4")]
use crate::FLASH_CFG_PAGE;
#[cfg(feature = "h7")]
use crate::FLASH_CFG_SECTOR;

/// Byte length of the flattened `UserCfg` record. Four `PidGainsCfg` (4
/// floats each) + 4 deadband floats + 3 bools + a 3+9-float mag calibration.
const CFG_RECORD_LEN: usize = (4 * 4 + 4 + 3 + 9) * 4 + 3;

impl UserCfg {
    fn to_bytes(self) -> [u8; CFG_RECORD_LEN] {
        let mut out = [0u8; CFG_RECORD_LEN];
        let mut pos = 0;
        let mut put_f32 = |out: &mut [u8; CFG_RECORD_LEN], pos: &mut usize, v: f32| {
            out[*pos..*pos + 4].copy_from_slice(&v.to_le_bytes());
            *pos += 4;
        };
        for gains in [self.yaw_gains, self.pitch_gains, self.roll_gains, self.altitude_gains] {
            put_f32(&mut out, &mut pos, gains.kp);
            put_f32(&mut out, &mut pos, gains.ki);
            put_f32(&mut out, &mut pos, gains.kd);
            put_f32(&mut out, &mut pos, gains.i_limit);
        }
        for v in self.motor_deadband_offsets {
            put_f32(&mut out, &mut pos, v);
        }
        out[pos] = self.yaw_regulation_enabled as u8;
        pos += 1;
        out[pos] = self.altitude_stabilization_enabled as u8;
        pos += 1;
        out[pos] = self.magnetometer_enabled as u8;
        pos += 1;
        for v in self.mag_calibration.offset {
            put_f32(&mut out, &mut pos, v);
        }
        for row in self.mag_calibration.transform {
            for v in row {
                put_f32(&mut out, &mut pos, v);
            }
        }
        out
    }

    fn from_bytes(data: &[u8; CFG_RECORD_LEN]) -> Self {
        let mut pos = 0;
        let mut get_f32 = |data: &[u8; CFG_RECORD_LEN], pos: &mut usize| -> f32 {
            let v = f32::from_le_bytes(data[*pos..*pos + 4].try_into().unwrap());
            *pos += 4;
            v
        };
        let mut read_gains = |data: &[u8; CFG_RECORD_LEN], pos: &mut usize| PidGainsCfg {
            kp: get_f32(data, pos),
            ki: get_f32(data, pos),
            kd: get_f32(data, pos),
            i_limit: get_f32(data, pos),
        };
        let yaw_gains = read_gains(data, &mut pos);
        let pitch_gains = read_gains(data, &mut pos);
        let roll_gains = read_gains(data, &mut pos);
        let altitude_gains = read_gains(data, &mut pos);
        let mut motor_deadband_offsets = [0.0f32; 4];
        for v in motor_deadband_offsets.iter_mut() {
            *v = get_f32(data, &mut pos);
        }
        let yaw_regulation_enabled = data[pos] != 0;
        pos += 1;
        let altitude_stabilization_enabled = data[pos] != 0;
        pos += 1;
        let magnetometer_enabled = data[pos] != 0;
        pos += 1;
        let mut offset = [0.0f32; 3];
        for v in offset.iter_mut() {
            *v = get_f32(data, &mut pos);
        }
        let mut transform = [[0.0f32; 3]; 3];
        for row in transform.iter_mut() {
            for v in row.iter_mut() {
                *v = get_f32(data, &mut pos);
            }
        }

        Self {
            yaw_gains,
            pitch_gains,
            roll_gains,
            altitude_gains,
            motor_deadband_offsets,
            yaw_regulation_enabled,
            altitude_stabilization_enabled,
            magnetometer_enabled,
            mag_calibration: MagCalibrationCfg { offset, transform },
        }
    }

    /// Saves to internal flash, overwriting the dedicated config
    /// sector/page.
    pub fn save(&self, flash: &mut Flash) {
        let data = self.to_bytes();

        #[cfg(feature = "h7")]
        flash.erase_write_sector(Bank::B1, FLASH_CFG_SECTOR, &data).ok();
        #[cfg(feature = "g4")]
        flash.erase_write_page(Bank::B1, FLASH_CFG_PAGE, &data).ok();
    }

    /// Loads from internal flash. Callers should fall back to
    /// `UserCfg::default()` if the record looks uninitialized (all-0xFF, the
    /// erased-flash pattern).
    pub fn load(flash: &Flash) -> Self {
        let mut data = [0u8; CFG_RECORD_LEN];
        #[cfg(feature = "h7")]
        flash.read(Bank::B1, FLASH_CFG_SECTOR, 0, &mut data);
        #[cfg(feature = "g4")]
        flash.read(Bank::B1, FLASH_CFG_PAGE, 0, &mut data);

        if data.iter().all(|&b| b == 0xff) {
            return Self::default();
        }
        Self::from_bytes(&data)
    }
}
