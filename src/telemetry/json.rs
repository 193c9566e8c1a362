//! A minimal single-line JSON object encoder/tokenizer. Hand-rolled rather
//! than vendored, the same tradeoff the source firmware made with `jsmn`:
//! telemetry frames are always flat, single-line `{ "key": "value", ... }`
//! objects, never nested or arrayed, so a general-purpose parser buys
//! nothing.

use heapless::{String, Vec};

pub const MAX_PAIRS: usize = 9;
pub const MAX_LINE: usize = 160;

/// Encodes `keys`/`values` (parallel slices) as a single-line JSON object,
/// newline-terminated. In `human` mode each pair gets its own
/// tab-indented line instead.
pub fn encode(keys: &[&str], values: &[&str], human: bool) -> String<MAX_LINE> {
    let mut out: String<MAX_LINE> = String::new();
    if human {
        for (k, v) in keys.iter().zip(values.iter()) {
            out.push('\t').ok();
            out.push('"').ok();
            out.push_str(k).ok();
            out.push_str("\": \"").ok();
            out.push_str(v).ok();
            out.push_str("\"\n").ok();
        }
        return out;
    }

    out.push_str("{ ").ok();
    for (i, (k, v)) in keys.iter().zip(values.iter()).enumerate() {
        if i > 0 {
            out.push_str(", ").ok();
        }
        out.push('"').ok();
        out.push_str(k).ok();
        out.push_str("\": \"").ok();
        out.push_str(v).ok();
        out.push('"').ok();
    }
    out.push_str(" }\n").ok();
    out
}

/// A parsed `"key": "value"` pair, borrowed from the input line.
pub struct Pair<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

/// Tokenizes one single-line JSON object of string-valued keys. Returns
/// `None` if the line isn't well-formed (missing braces, unterminated
/// strings, more pairs than `MAX_PAIRS`).
pub fn tokenize(line: &str) -> Option<Vec<Pair<'_>, MAX_PAIRS>> {
    let line = line.trim();
    let inner = line.strip_prefix('{')?.strip_suffix('}')?.trim();
    if inner.is_empty() {
        return Some(Vec::new());
    }

    let mut pairs: Vec<Pair, MAX_PAIRS> = Vec::new();
    for entry in inner.split(',') {
        let entry = entry.trim();
        let mut halves = entry.splitn(2, ':');
        let raw_key = halves.next()?.trim();
        let raw_value = halves.next()?.trim();
        let key = unquote(raw_key)?;
        let value = unquote(raw_value)?;
        pairs.push(Pair { key, value }).ok()?;
    }
    Some(pairs)
}

fn unquote(s: &str) -> Option<&str> {
    s.strip_prefix('"')?.strip_suffix('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_single_line_object() {
        let line = encode(&["ax", "ay"], &["0.1234", "-1.0"], false);
        assert_eq!(line.as_str(), "{ \"ax\": \"0.1234\", \"ay\": \"-1.0\" }\n");
    }

    #[test]
    fn encode_human_mode_indents_each_key() {
        let line = encode(&["ax"], &["0.1"], true);
        assert_eq!(line.as_str(), "\t\"ax\": \"0.1\"\n");
    }

    #[test]
    fn tokenize_round_trips_an_encoded_line() {
        let line = encode(&["k1", "k2"], &["v1", "v2"], false);
        let pairs = tokenize(line.trim()).expect("should parse");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].key, "k1");
        assert_eq!(pairs[0].value, "v1");
        assert_eq!(pairs[1].key, "k2");
        assert_eq!(pairs[1].value, "v2");
    }

    #[test]
    fn tokenize_rejects_missing_braces() {
        assert!(tokenize("\"k1\": \"v1\"").is_none());
    }

    #[test]
    fn tokenize_handles_empty_object() {
        let pairs = tokenize("{}").unwrap();
        assert!(pairs.is_empty());
    }
}
