//! Timing, gain and hardware constants, gathered in one place the way the
//! teacher's `main.rs` keeps its top-level `const` block.

/// Sensor sample frequency, in Hz. Drives the periodic timer that kicks SDL.
pub const SAMPLE_FREQ_HZ: f32 = 400.0;

/// Sample period `T`, in seconds. `1 / SAMPLE_FREQ_HZ`.
pub const SAMPLE_PERIOD_S: f32 = 1.0 / SAMPLE_FREQ_HZ;

/// Madgwick gradient-descent filter gain.
pub const FILTER_BETA: f32 = 0.1;

/// Standard gravity, in m/s^2, used by the altitude PID's `az - g` error term.
pub const GRAVITY_MPS2: f32 = 9.80665;

/// Motors are clamped to this fraction of full power regardless of what the
/// mixer computes, as a hard safety ceiling.
pub const POWER_CEILING: f32 = 0.70;

/// Per-motor measured deadband offsets, in mixer order (m0, m1, m2, m3).
/// Below this fraction of command the ESC doesn't spin the motor at all.
pub const MOTOR_DEADBAND_OFFSETS: [f32; 4] = [0.1845, 0.1075, 0.2330, 0.1080];

/// Timer-compare value corresponding to a 1.0 ms pulse (minimum throttle).
pub const MIN_MATCH: u16 = (PIOSC_FREQ_HZ * 0.001) as u16;

/// Timer-compare value corresponding to a 2.0 ms pulse (maximum throttle).
pub const MAX_MATCH: u16 = (PIOSC_FREQ_HZ * 0.002) as u16;

/// Reference oscillator frequency backing the motor PWM timers, in Hz.
/// Matches the precision internal oscillator the source firmware clocked its
/// timer peripheral from.
pub const PIOSC_FREQ_HZ: f32 = 16_000_000.0;

/// Upper bound on simultaneously queued I2C transactions. Exceeding this
/// flushes both FIFOs with a `MAX_QUEUEING_REACHED` callback per spec.
pub const MAX_QUEUEING_TRANSACTIONS: usize = 10;

/// Number of gyro samples averaged at boot to compute bias.
pub const GYRO_CALIBRATION_SAMPLES: usize = 512;

/// Maximum number of concurrently registered telemetry data sources.
pub const MAX_DATA_SOURCES: usize = 16;

/// Maximum number of concurrently registered telemetry data inputs.
pub const MAX_DATA_INPUTS: usize = 16;

/// Default gains for each PID axis: `(Kp, Ki, Kd, ILimit)`.
pub mod default_gains {
    /// `(Kp, Ki, Kd, ILimit)`
    pub const YAW: (f32, f32, f32, f32) = (0.035, 0.035, 0.0, 0.30);
    /// `(Kp, Ki, Kd, ILimit)`, shared by pitch and roll.
    pub const PITCH_ROLL: (f32, f32, f32, f32) = (0.16, 0.48, 0.0004, 1.20);
    /// `(Kp, Ki, Kd, ILimit)`
    pub const ALTITUDE: (f32, f32, f32, f32) = (0.035, 0.035, 0.0, 0.30);
}

/// Errors smaller in magnitude than this clamp to exactly zero before PID
/// integration, matching the deadband in the source firmware's `PID.c`.
pub const PID_ERROR_DEADBAND: f32 = 1e-4;

/// Consecutive fatal (bus/IMU timeout) faults the watchdog tolerates before
/// latching a motor shut-off.
pub const MAX_CONSECUTIVE_FAULTS: u8 = 5;

/// Baud rate for the console UART the shell and telemetry adapter share.
pub const CONSOLE_BAUD: u32 = 115_200;

/// Longest shell command line accepted before the accumulator buffer resets.
pub const SHELL_LINE_LEN: usize = 64;

/// Per-tick increment/decrement the radio slow-drift mapping applies to a
/// held throttle/direction channel.
pub const RADIO_AXIS_STEP: f32 = 0.0005;

/// AE ticks a frame may go stale before the watchdog latches a shut-off,
/// matching the 1 s IMU timeout at `SAMPLE_FREQ_HZ`.
pub const IMU_STALE_TIMEOUT_TICKS: u16 = SAMPLE_FREQ_HZ as u16;

/// Telemetry-tick count between successive emissions of each of the four
/// mandatory periodic sources (`sensors`, `IMU`, `PID`, `radio`).
pub const TELEMETRY_PERIOD_TICKS: u32 = 20;
