//! Fixed-capacity registry of telemetry data sources (periodic/one-shot
//! pull) and data inputs (push), replacing the source firmware's
//! `malloc`-backed registry with the same fixed-capacity semantics.

use heapless::{String, Vec};

use crate::consts::{MAX_DATA_INPUTS, MAX_DATA_SOURCES};
use crate::error::Error;
use crate::telemetry::json::{self, MAX_LINE};

pub const MAX_NAME: usize = 16;
pub const MAX_KEYS: usize = 9;
pub const MAX_VALUE: usize = 16;
/// Longest key name a source/input can declare. Wide enough for
/// `"shutOffMotors"` (13 characters), the longest key in the `RemoteControl`
/// wire contract; the previous 8-byte cap silently truncated it and
/// collided `"directionX"`/`"directionY"` onto the same `"directio"` prefix.
pub const MAX_KEY: usize = 16;

/// Renders the current values for a data source's keys, in declaration
/// order, into fixed-capacity strings. Returns the number of keys filled.
pub type Accessor = fn(out: &mut [String<MAX_VALUE>; MAX_KEYS]) -> usize;

/// Receives parsed string values for a data input's keys, in declaration
/// order.
pub type Setter = fn(values: &[&str]);

struct DataSource {
    name: String<MAX_NAME>,
    keys: Vec<String<MAX_KEY>, MAX_KEYS>,
    accessor: Accessor,
    /// `None` for one-shot sources (fired once via `fire_oneshot` then
    /// removed); `Some(period_ticks)` for periodic ones.
    period_ticks: Option<u32>,
    ticks_remaining: u32,
    enabled: bool,
}

struct DataInput {
    name: String<MAX_NAME>,
    keys: Vec<String<MAX_KEY>, MAX_KEYS>,
    setter: Setter,
}

#[derive(Default)]
pub struct Registry {
    sources: Vec<DataSource, MAX_DATA_SOURCES>,
    inputs: Vec<DataInput, MAX_DATA_INPUTS>,
}

fn make_name(name: &str) -> String<MAX_NAME> {
    let mut s = String::new();
    let _ = s.push_str(&name[..name.len().min(MAX_NAME)]);
    s
}

fn make_keys(keys: &[&str]) -> Vec<String<MAX_KEY>, MAX_KEYS> {
    let mut v = Vec::new();
    for k in keys.iter().take(MAX_KEYS) {
        let mut s: String<MAX_KEY> = String::new();
        let _ = s.push_str(&k[..k.len().min(MAX_KEY)]);
        let _ = v.push(s);
    }
    v
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_periodic(
        &mut self,
        name: &str,
        keys: &[&str],
        period_ticks: u32,
        accessor: Accessor,
    ) -> Result<(), Error> {
        self.sources
            .push(DataSource {
                name: make_name(name),
                keys: make_keys(keys),
                accessor,
                period_ticks: Some(period_ticks),
                ticks_remaining: period_ticks,
                enabled: true,
            })
            .map_err(|_| Error::SubscribeFull)
    }

    pub fn subscribe_oneshot(&mut self, name: &str, keys: &[&str], accessor: Accessor) -> Result<(), Error> {
        self.sources
            .push(DataSource {
                name: make_name(name),
                keys: make_keys(keys),
                accessor,
                period_ticks: None,
                ticks_remaining: 0,
                enabled: true,
            })
            .map_err(|_| Error::SubscribeFull)
    }

    pub fn subscribe_input(&mut self, name: &str, keys: &[&str], setter: Setter) -> Result<(), Error> {
        self.inputs
            .push(DataInput {
                name: make_name(name),
                keys: make_keys(keys),
                setter,
            })
            .map_err(|_| Error::SubscribeFull)
    }

    /// Removes a source or input by name (releasing its backing clock, for
    /// a periodic source).
    pub fn unsubscribe(&mut self, name: &str) {
        self.sources.retain(|s| s.name.as_str() != name);
        self.inputs.retain(|i| i.name.as_str() != name);
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) {
        for s in self.sources.iter_mut() {
            if s.name.as_str() == name {
                s.enabled = enabled;
            }
        }
    }

    pub fn list_names(&self) -> Vec<String<MAX_NAME>, MAX_DATA_SOURCES> {
        self.sources.iter().map(|s| s.name.clone()).collect()
    }

    /// Advances every periodic source's countdown by `elapsed_ticks` and
    /// renders a JSON line for each source that comes due (or every
    /// still-present one-shot source, which is then dropped). `out` is
    /// filled up to its capacity; returns the number of lines written.
    pub fn poll(&mut self, elapsed_ticks: u32, human: bool, out: &mut [String<MAX_LINE>]) -> usize {
        let mut n = 0;
        let mut fired_oneshots: Vec<String<MAX_NAME>, MAX_DATA_SOURCES> = Vec::new();

        for s in self.sources.iter_mut() {
            if !s.enabled {
                continue;
            }
            let due = match s.period_ticks {
                Some(period) => {
                    if s.ticks_remaining <= elapsed_ticks {
                        s.ticks_remaining = period;
                        true
                    } else {
                        s.ticks_remaining -= elapsed_ticks;
                        false
                    }
                }
                None => true,
            };
            if !due || n >= out.len() {
                continue;
            }
            let mut values: [String<MAX_VALUE>; MAX_KEYS] = core::array::from_fn(|_| String::new());
            let count = (s.accessor)(&mut values).min(s.keys.len());
            let key_refs: Vec<&str, MAX_KEYS> = s.keys.iter().take(count).map(|k| k.as_str()).collect();
            let val_refs: Vec<&str, MAX_KEYS> = values.iter().take(count).map(|v| v.as_str()).collect();
            out[n] = json::encode(&key_refs, &val_refs, human);
            n += 1;
            if s.period_ticks.is_none() {
                fired_oneshots.push(s.name.clone()).ok();
            }
        }

        for name in fired_oneshots.iter() {
            self.sources.retain(|s| s.name.as_str() != name.as_str());
        }
        n
    }

    /// Parses one inbound JSON line and, on a key-set match against a
    /// registered input, calls its setter with values in declaration order.
    pub fn handle_input(&self, line: &str) -> Result<(), Error> {
        let pairs = json::tokenize(line).ok_or(Error::BadJson)?;
        for input in self.inputs.iter() {
            if input.keys.len() != pairs.len() {
                continue;
            }
            let mut ordered: Vec<&str, MAX_KEYS> = Vec::new();
            let mut matched = true;
            for key in input.keys.iter() {
                match pairs.iter().find(|p| p.key == key.as_str()) {
                    Some(p) => {
                        ordered.push(p.value).ok();
                    }
                    None => {
                        matched = false;
                        break;
                    }
                }
            }
            if matched {
                (input.setter)(&ordered);
                return Ok(());
            }
        }
        Err(Error::BadJson)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    fn fake_accessor(out: &mut [String<MAX_VALUE>; MAX_KEYS]) -> usize {
        out[0] = String::try_from("1.0").unwrap();
        out[1] = String::try_from("2.0").unwrap();
        2
    }

    static LAST_SET: AtomicU32 = AtomicU32::new(0);
    fn fake_setter(values: &[&str]) {
        if let Ok(v) = values[0].parse::<u32>() {
            LAST_SET.store(v, Ordering::SeqCst);
        }
    }

    #[test]
    fn periodic_source_fires_after_its_period_and_reloads() {
        let mut reg = Registry::new();
        reg.subscribe_periodic("s", &["a", "b"], 5, fake_accessor).unwrap();
        let mut out: [String<MAX_LINE>; 4] = core::array::from_fn(|_| String::new());
        assert_eq!(reg.poll(4, false, &mut out), 0);
        assert_eq!(reg.poll(1, false, &mut out), 1);
        assert!(out[0].contains("1.0"));
    }

    #[test]
    fn oneshot_source_fires_once_then_is_removed() {
        let mut reg = Registry::new();
        reg.subscribe_oneshot("once", &["a", "b"], fake_accessor).unwrap();
        let mut out: [String<MAX_LINE>; 4] = core::array::from_fn(|_| String::new());
        assert_eq!(reg.poll(0, false, &mut out), 1);
        assert_eq!(reg.poll(0, false, &mut out), 0);
    }

    #[test]
    fn disabled_source_does_not_fire() {
        let mut reg = Registry::new();
        reg.subscribe_periodic("s", &["a", "b"], 1, fake_accessor).unwrap();
        reg.set_enabled("s", false);
        let mut out: [String<MAX_LINE>; 4] = core::array::from_fn(|_| String::new());
        assert_eq!(reg.poll(10, false, &mut out), 0);
    }

    #[test]
    fn subscribe_full_once_capacity_exhausted() {
        let mut reg = Registry::new();
        for _ in 0..MAX_DATA_SOURCES {
            reg.subscribe_periodic("dup", &["a"], 1, fake_accessor).unwrap();
        }
        assert_eq!(
            reg.subscribe_periodic("overflow", &["a"], 1, fake_accessor),
            Err(Error::SubscribeFull)
        );
    }

    #[test]
    fn unsubscribe_removes_source_by_name() {
        let mut reg = Registry::new();
        reg.subscribe_periodic("s", &["a"], 1, fake_accessor).unwrap();
        reg.unsubscribe("s");
        let mut out: [String<MAX_LINE>; 4] = core::array::from_fn(|_| String::new());
        assert_eq!(reg.poll(10, false, &mut out), 0);
    }

    #[test]
    fn handle_input_dispatches_to_matching_setter_in_key_order() {
        let mut reg = Registry::new();
        reg.subscribe_input("ctrl", &["v"], fake_setter).unwrap();
        reg.handle_input("{ \"v\": \"42\" }").unwrap();
        assert_eq!(LAST_SET.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn handle_input_rejects_malformed_json() {
        let reg = Registry::new();
        assert_eq!(reg.handle_input("not json"), Err(Error::BadJson));
    }
}
