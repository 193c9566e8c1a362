//! Crate-wide error kinds.
//!
//! `no_std` with no `alloc`, so errors are a closed enum rather than a boxed
//! trait object. Each variant corresponds to one of the fault conditions
//! named in the bus, sensor, control-input and telemetry layers.

/// Something went wrong somewhere in the system. Carried by ITE callbacks as
/// the transaction status, and returned from fallible telemetry/shell calls.
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum Error {
    /// The transaction pool has no free slots; the caller's request was
    /// rejected rather than queued.
    BusQueueFull,
    /// A queued transaction did not complete within its allotted time.
    BusTimeout,
    /// The bus peripheral reported a condition this driver doesn't decode.
    BusUnknown,
    /// A synchronous `wait()` on the IMU did not resolve before its deadline.
    ImuTimeout,
    /// The accelerometer vector was (0, 0, 0); normalizing it would divide by
    /// zero, so the estimator fell back to gyro-only integration this tick.
    AccelZero,
    /// The magnetometer vector was (0, 0, 0); the same fallback applies to
    /// the tilt-compensated heading term.
    MagZero,
    /// The data-source or data-input registry has no free slot for a new
    /// subscription.
    SubscribeFull,
    /// Inbound JSON did not parse as a well-formed single-line object.
    BadJson,
    /// A shell command was given fewer arguments than it requires.
    TooFewArgs,
    /// A shell command was given more arguments than it accepts.
    TooManyArgs,
    /// The shell did not recognize the command name.
    UnknownCommand,
}

impl Error {
    /// True for kinds that should halt the affected subsystem rather than be
    /// logged and skipped. See the error-handling design: bus and IMU
    /// timeouts are fatal to the current transaction chain, everything else
    /// is recoverable on the next tick.
    pub fn is_fatal(self) -> bool {
        matches!(self, Error::BusTimeout | Error::ImuTimeout)
    }
}
