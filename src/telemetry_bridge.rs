//! Glue between live flight-controller state and the telemetry registry's
//! bare function-pointer `Accessor`/`Setter` types (see `telemetry::sources`
//! — neither carries a captured environment, for the same reason
//! `i2c_txn::TxnCallback` doesn't), so the four mandatory telemetry sources
//! (`sensors`, `IMU`, `PID`, `radio`) and the `RemoteControl` input read and
//! write free-standing atomics instead of closure state. Whatever task owns
//! the live data calls the matching `note_*` function once per tick; the
//! registry calls the accessor/setter independently on its own schedule.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use heapless::String;

use crate::numeric::ftoa;
use crate::telemetry::sources::{MAX_KEYS, MAX_VALUE};

fn load_f32(cell: &AtomicU32) -> f32 {
    f32::from_bits(cell.load(Ordering::Relaxed))
}

fn store_f32(cell: &AtomicU32, value: f32) {
    cell.store(value.to_bits(), Ordering::Relaxed);
}

fn push_f32(out: &mut [String<MAX_VALUE>; MAX_KEYS], idx: usize, value: f32) {
    let rendered = ftoa(value, 4);
    out[idx] = String::try_from(rendered.as_str()).unwrap_or_default();
}

fn push_bool(out: &mut [String<MAX_VALUE>; MAX_KEYS], idx: usize, value: bool) {
    out[idx] = String::try_from(if value { "true" } else { "false" }).unwrap_or_default();
}

// --- sensors: raw accelerometer + gyroscope ---------------------------

static ACCEL: [AtomicU32; 3] = [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)];
static GYRO: [AtomicU32; 3] = [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)];

pub fn note_sensors(accel: [f32; 3], gyro: [f32; 3]) {
    for (cell, v) in ACCEL.iter().zip(accel.iter()) {
        store_f32(cell, *v);
    }
    for (cell, v) in GYRO.iter().zip(gyro.iter()) {
        store_f32(cell, *v);
    }
}

pub fn sensors_accessor(out: &mut [String<MAX_VALUE>; MAX_KEYS]) -> usize {
    for (i, cell) in ACCEL.iter().enumerate() {
        push_f32(out, i, load_f32(cell));
    }
    for (i, cell) in GYRO.iter().enumerate() {
        push_f32(out, 3 + i, load_f32(cell));
    }
    6
}

pub const SENSORS_KEYS: [&str; 6] = ["ax", "ay", "az", "gx", "gy", "gz"];

// --- IMU: fused attitude ------------------------------------------------

static YAW: AtomicU32 = AtomicU32::new(0);
static PITCH: AtomicU32 = AtomicU32::new(0);
static ROLL: AtomicU32 = AtomicU32::new(0);

pub fn note_imu(yaw: f32, pitch: f32, roll: f32) {
    store_f32(&YAW, yaw);
    store_f32(&PITCH, pitch);
    store_f32(&ROLL, roll);
}

pub fn imu_accessor(out: &mut [String<MAX_VALUE>; MAX_KEYS]) -> usize {
    push_f32(out, 0, load_f32(&YAW));
    push_f32(out, 1, load_f32(&PITCH));
    push_f32(out, 2, load_f32(&ROLL));
    3
}

pub const IMU_KEYS: [&str; 3] = ["yaw", "pitch", "roll"];

// --- PID: per-axis controller output ------------------------------------

static PID_PITCH: AtomicU32 = AtomicU32::new(0);
static PID_ROLL: AtomicU32 = AtomicU32::new(0);
static PID_YAW: AtomicU32 = AtomicU32::new(0);
static PID_ALTITUDE: AtomicU32 = AtomicU32::new(0);

pub fn note_pid(pitch_out: f32, roll_out: f32, yaw_out: f32, altitude_out: f32) {
    store_f32(&PID_PITCH, pitch_out);
    store_f32(&PID_ROLL, roll_out);
    store_f32(&PID_YAW, yaw_out);
    store_f32(&PID_ALTITUDE, altitude_out);
}

pub fn pid_accessor(out: &mut [String<MAX_VALUE>; MAX_KEYS]) -> usize {
    push_f32(out, 0, load_f32(&PID_PITCH));
    push_f32(out, 1, load_f32(&PID_ROLL));
    push_f32(out, 2, load_f32(&PID_YAW));
    push_f32(out, 3, load_f32(&PID_ALTITUDE));
    4
}

pub const PID_KEYS: [&str; 4] = ["pitch", "roll", "yaw", "altitude"];

// --- radio: raw channel levels ------------------------------------------

static RADIO: [AtomicBool; 5] = [
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
];

pub fn note_radio(channels: [bool; 5]) {
    for (cell, v) in RADIO.iter().zip(channels.iter()) {
        cell.store(*v, Ordering::Relaxed);
    }
}

pub fn radio_accessor(out: &mut [String<MAX_VALUE>; MAX_KEYS]) -> usize {
    for (i, cell) in RADIO.iter().enumerate() {
        push_bool(out, i, cell.load(Ordering::Relaxed));
    }
    5
}

pub const RADIO_KEYS: [&str; 5] = ["ch0", "ch1", "ch2", "ch3", "ch4"];

// --- RemoteControl: JSON push input --------------------------------------

/// Declaration order mirrors the wire contract's fixed key order:
/// `throttle, directionX, directionY, yaw, beep, shutOffMotors`.
static RC_THROTTLE: AtomicU32 = AtomicU32::new(0);
static RC_DIRECTION_X: AtomicU32 = AtomicU32::new(0);
static RC_DIRECTION_Y: AtomicU32 = AtomicU32::new(0);
static RC_YAW: AtomicU32 = AtomicU32::new(0);
static RC_BEEP: AtomicBool = AtomicBool::new(false);
static RC_SHUT_OFF_MOTORS: AtomicBool = AtomicBool::new(false);
static RC_PENDING: AtomicBool = AtomicBool::new(false);

pub const REMOTE_CONTROL_KEYS: [&str; 6] = ["throttle", "directionX", "directionY", "yaw", "beep", "shutOffMotors"];

fn parse_bool(s: &str) -> bool {
    matches!(s, "true" | "1")
}

/// Registered as the `RemoteControl` input's setter. Parses every value as a
/// string (the wire format never carries bare numeric/boolean JSON tokens)
/// and stashes the result for the next flight-control tick to drain.
pub fn remote_control_setter(values: &[&str]) {
    if values.len() < 6 {
        return;
    }
    let throttle: f32 = values[0].parse().unwrap_or(0.0);
    let direction_x: f32 = values[1].parse().unwrap_or(0.0);
    let direction_y: f32 = values[2].parse().unwrap_or(0.0);
    let yaw: f32 = values[3].parse().unwrap_or(0.0);
    let beep = parse_bool(values[4]);
    let shut_off_motors = parse_bool(values[5]);

    store_f32(&RC_THROTTLE, throttle);
    store_f32(&RC_DIRECTION_X, direction_x);
    store_f32(&RC_DIRECTION_Y, direction_y);
    store_f32(&RC_YAW, yaw);
    RC_BEEP.store(beep, Ordering::Relaxed);
    RC_SHUT_OFF_MOTORS.store(shut_off_motors, Ordering::Relaxed);
    RC_PENDING.store(true, Ordering::Release);
}

/// One drained `RemoteControl` update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RemoteControlUpdate {
    pub throttle: f32,
    pub direction: [f32; 2],
    pub yaw: f32,
    pub beep: bool,
    pub shut_off_motors: bool,
}

/// Takes the pending `RemoteControl` update, if one arrived since the last
/// call. Meant to be called once per flight-control tick and applied onto
/// `QuadControl`, with `Oim::note_json_update` called alongside it so the
/// radio mapper yields precedence this tick.
pub fn take_remote_control_update() -> Option<RemoteControlUpdate> {
    if !RC_PENDING.swap(false, Ordering::Acquire) {
        return None;
    }
    Some(RemoteControlUpdate {
        throttle: load_f32(&RC_THROTTLE),
        direction: [load_f32(&RC_DIRECTION_X), load_f32(&RC_DIRECTION_Y)],
        yaw: load_f32(&RC_YAW),
        beep: RC_BEEP.load(Ordering::Relaxed),
        shut_off_motors: RC_SHUT_OFF_MOTORS.load(Ordering::Relaxed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensors_accessor_reports_last_noted_values() {
        note_sensors([1.0, 2.0, 3.0], [4.0, 5.0, 6.0]);
        let mut out: [String<MAX_VALUE>; MAX_KEYS] = core::array::from_fn(|_| String::new());
        let n = sensors_accessor(&mut out);
        assert_eq!(n, 6);
        assert!(out[0].starts_with("1.0"));
        assert!(out[5].starts_with("6.0"));
    }

    #[test]
    fn imu_accessor_reports_last_noted_attitude() {
        note_imu(0.1, 0.2, 0.3);
        let mut out: [String<MAX_VALUE>; MAX_KEYS] = core::array::from_fn(|_| String::new());
        let n = imu_accessor(&mut out);
        assert_eq!(n, 3);
        assert!(out[0].starts_with("0.1"));
    }

    #[test]
    fn pid_accessor_reports_all_four_axes() {
        note_pid(1.0, 2.0, 3.0, 4.0);
        let mut out: [String<MAX_VALUE>; MAX_KEYS] = core::array::from_fn(|_| String::new());
        let n = pid_accessor(&mut out);
        assert_eq!(n, 4);
        assert!(out[3].starts_with("4.0"));
    }

    #[test]
    fn radio_accessor_reports_booleans_as_strings() {
        note_radio([true, false, true, false, true]);
        let mut out: [String<MAX_VALUE>; MAX_KEYS] = core::array::from_fn(|_| String::new());
        let n = radio_accessor(&mut out);
        assert_eq!(n, 5);
        assert_eq!(out[0].as_str(), "true");
        assert_eq!(out[1].as_str(), "false");
    }

    #[test]
    fn remote_control_setter_populates_a_pending_update_in_declared_order() {
        let _ = take_remote_control_update();
        remote_control_setter(&["0.5", "1.0", "-1.0", "0.2", "true", "false"]);
        let update = take_remote_control_update().expect("should be pending");
        assert_eq!(update.throttle, 0.5);
        assert_eq!(update.direction, [1.0, -1.0]);
        assert_eq!(update.yaw, 0.2);
        assert!(update.beep);
        assert!(!update.shut_off_motors);
        // Draining clears the pending flag.
        assert!(take_remote_control_update().is_none());
    }
}
