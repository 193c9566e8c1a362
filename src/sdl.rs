//! Sensor data link bridge: hands raw I2C frames from the bus ISR to the
//! attitude-estimation task.
//!
//! `i2c_txn::TxnCallback` is a bare function pointer with no captured
//! environment, and the transaction queue that invokes it is itself locked
//! inside the bus interrupt at the highest priority in the system — a
//! callback running there can't reach other RTIC `Shared` resources. These
//! free-standing atomics are the hand-off point instead, the same pattern
//! `safety.rs` uses for `RECEIVED_INITIAL_DISARM`/`ARM_COMMANDED_WITHOUT_IDLE`
//! and `drivers/gnss_can.rs` uses for `TRANSFER_ID_FIX`.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::error::Error;

const ACCEL_GYRO_LEN: usize = 14;
const MAG_LEN: usize = 6;

static ACCEL_GYRO_FRAME: [AtomicU8; ACCEL_GYRO_LEN] = [AtomicU8::new(0); ACCEL_GYRO_LEN];
static ACCEL_GYRO_FRESH: AtomicBool = AtomicBool::new(false);
static ACCEL_GYRO_FAULT: AtomicBool = AtomicBool::new(false);

static MAG_FRAME: [AtomicU8; MAG_LEN] = [AtomicU8::new(0); MAG_LEN];
static MAG_FRESH: AtomicBool = AtomicBool::new(false);
static MAG_FAULT: AtomicBool = AtomicBool::new(false);

/// Callback handed to `TransactionQueue::async_reg_read` for the accel+gyro
/// burst read. Stores the frame and spawns `ae_task` so fusion runs as soon
/// as the freshest sample is available, rather than waiting for the next
/// independently-timed tick.
pub fn on_accel_gyro_done(status: Result<(), Error>, data: &[u8]) {
    match status {
        Ok(()) if data.len() >= ACCEL_GYRO_LEN => {
            for (slot, byte) in ACCEL_GYRO_FRAME.iter().zip(data.iter()) {
                slot.store(*byte, Ordering::Relaxed);
            }
            ACCEL_GYRO_FAULT.store(false, Ordering::Relaxed);
            ACCEL_GYRO_FRESH.store(true, Ordering::Release);
        }
        _ => {
            ACCEL_GYRO_FAULT.store(true, Ordering::Relaxed);
        }
    }
    crate::app::ae_task::spawn().ok();
}

/// Callback handed to `TransactionQueue::async_reg_read` for the
/// magnetometer burst read.
pub fn on_mag_done(status: Result<(), Error>, data: &[u8]) {
    match status {
        Ok(()) if data.len() >= MAG_LEN => {
            for (slot, byte) in MAG_FRAME.iter().zip(data.iter()) {
                slot.store(*byte, Ordering::Relaxed);
            }
            MAG_FAULT.store(false, Ordering::Relaxed);
            MAG_FRESH.store(true, Ordering::Release);
        }
        _ => {
            MAG_FAULT.store(true, Ordering::Relaxed);
        }
    }
}

/// Takes the most recent accel+gyro frame, if one has arrived since the last
/// call, clearing the fresh flag. `Err` when the last attempt faulted and no
/// fresh frame has arrived since.
pub fn take_accel_gyro() -> Option<Result<[u8; ACCEL_GYRO_LEN], Error>> {
    if ACCEL_GYRO_FRESH.swap(false, Ordering::Acquire) {
        let mut raw = [0u8; ACCEL_GYRO_LEN];
        for (slot, byte) in ACCEL_GYRO_FRAME.iter().zip(raw.iter_mut()) {
            *byte = slot.load(Ordering::Relaxed);
        }
        return Some(Ok(raw));
    }
    if ACCEL_GYRO_FAULT.swap(false, Ordering::Relaxed) {
        return Some(Err(Error::ImuTimeout));
    }
    None
}

/// Takes the most recent magnetometer frame, if one has arrived since the
/// last call.
pub fn take_mag() -> Option<Result<[u8; MAG_LEN], Error>> {
    if MAG_FRESH.swap(false, Ordering::Acquire) {
        let mut raw = [0u8; MAG_LEN];
        for (slot, byte) in MAG_FRAME.iter().zip(raw.iter_mut()) {
            *byte = slot.load(Ordering::Relaxed);
        }
        return Some(Ok(raw));
    }
    if MAG_FAULT.swap(false, Ordering::Relaxed) {
        return Some(Err(Error::BusTimeout));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test drains the statics first since they're process-global.
    fn drain() {
        let _ = take_accel_gyro();
        let _ = take_mag();
    }

    #[test]
    fn accel_gyro_frame_round_trips_through_the_callback() {
        drain();
        let data = [7u8; ACCEL_GYRO_LEN];
        on_accel_gyro_done(Ok(()), &data);
        let frame = take_accel_gyro().expect("frame should be fresh").expect("should be ok");
        assert_eq!(frame, data);
        // Second take with no new frame returns None.
        assert!(take_accel_gyro().is_none());
    }

    #[test]
    fn accel_gyro_fault_surfaces_once_then_clears() {
        drain();
        on_accel_gyro_done(Err(Error::BusTimeout), &[]);
        assert_eq!(take_accel_gyro(), Some(Err(Error::ImuTimeout)));
        assert!(take_accel_gyro().is_none());
    }

    #[test]
    fn mag_frame_round_trips_through_the_callback() {
        drain();
        let data = [1u8, 2, 3, 4, 5, 6];
        on_mag_done(Ok(()), &data);
        let frame = take_mag().expect("frame should be fresh").expect("should be ok");
        assert_eq!(frame, data);
    }
}
