//! Telemetry adapter: periodic/one-shot pull data sources, push data
//! inputs, and the JSON wire format tying them to the outside world.

pub mod json;
pub mod sources;

pub use sources::Registry;
