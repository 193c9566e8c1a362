//! Number/string conversions and the classic fast inverse square root.
//!
//! Host-testable (see the crate root's `cfg_attr(not(test), no_std)`), since
//! none of this touches hardware.

use heapless::String;

/// Fast inverse square root, the quarter's worth of trick the original IMU
/// code used before anyone had an FPU hot enough for a hardware `sqrt`.
/// Kept as a selectable fallback alongside `micromath`'s `sqrt` so the filter
/// can match the source firmware's rounding when a `UserCfg` flag asks for
/// it.
pub fn invsqrt(x: f32) -> f32 {
    let halfx = 0.5 * x;
    let i = x.to_bits();
    let i = 0x5f3759df - (i >> 1);
    let y = f32::from_bits(i);
    y * (1.5 - (halfx * y * y))
}

/// Signed-integer to decimal string, matching the source firmware's `itoa`:
/// no leading zeros, a leading `-` for negative values, `"0"` for zero.
pub fn itoa(value: i32) -> String<12> {
    let mut out: String<12> = String::new();
    let mut v = value;
    if v < 0 {
        out.push('-').ok();
        // `i32::MIN` has no positive counterpart; the source firmware never
        // fed this path a value that extreme, and motor/attitude magnitudes
        // never approach it either.
        v = -v;
    }
    let mut digits: [u8; 10] = [0; 10];
    let mut n = 0;
    if v == 0 {
        out.push('0').ok();
        return out;
    }
    while v != 0 {
        digits[n] = (v % 10) as u8;
        v /= 10;
        n += 1;
    }
    while n > 0 {
        n -= 1;
        out.push((b'0' + digits[n]) as char).ok();
    }
    out
}

/// Float to decimal string with `decimal_count` fractional digits, matching
/// the source firmware's `ftoa`: the fractional part is rounded
/// half-up and dropped entirely (no trailing `.000`) when it rounds to zero.
pub fn ftoa(value: f32, decimal_count: u8) -> String<24> {
    let mut out: String<24> = String::new();
    let mut v = value;
    if v < 0.0 {
        out.push('-').ok();
        v = -v;
    }

    let int_value = if decimal_count != 0 {
        v as u32
    } else {
        (v + 0.5) as u32
    };

    let int_str = itoa(int_value as i32);
    out.push_str(&int_str).ok();

    if decimal_count != 0 {
        let mut factor = 1.0f32;
        for _ in 0..decimal_count {
            factor *= 10.0;
        }
        let dec_value = ((v - int_value as f32) * factor + 0.5) as u32;
        if dec_value != 0 {
            out.push('.').ok();
            let dec_str = itoa(dec_value as i32);
            // Pad with leading zeros to `decimal_count` width.
            for _ in 0..(decimal_count as usize).saturating_sub(dec_str.len()) {
                out.push('0').ok();
            }
            out.push_str(&dec_str).ok();
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn itoa_zero() {
        assert_eq!(itoa(0).as_str(), "0");
    }

    #[test]
    fn itoa_positive() {
        assert_eq!(itoa(1234).as_str(), "1234");
    }

    #[test]
    fn itoa_negative() {
        assert_eq!(itoa(-42).as_str(), "-42");
    }

    #[test]
    fn ftoa_whole_rounds_to_int() {
        assert_eq!(ftoa(3.6, 0).as_str(), "4");
    }

    #[test]
    fn ftoa_with_fraction() {
        assert_eq!(ftoa(3.14159, 2).as_str(), "3.14");
    }

    #[test]
    fn ftoa_zero_fraction_has_no_dot() {
        assert_eq!(ftoa(5.0, 3).as_str(), "5");
    }

    #[test]
    fn ftoa_negative_with_fraction() {
        assert_eq!(ftoa(-2.5, 1).as_str(), "-2.5");
    }

    #[test]
    fn ftoa_pads_leading_zero_in_fraction() {
        assert_eq!(ftoa(1.05, 2).as_str(), "1.05");
    }

    #[test]
    fn ftoa_round_trip_within_tolerance() {
        let samples = [0.0f32, 1.0, -1.0, 3.14159, -2.71828, 123.456, 0.0001];
        for &s in &samples {
            let rendered = ftoa(s, 4);
            let parsed: f32 = rendered.as_str().parse().unwrap_or(0.0);
            assert!((parsed - s).abs() < 5e-5 || (parsed - s).abs() / s.abs().max(1.0) < 5e-4);
        }
    }

    #[test]
    fn invsqrt_is_approximately_correct() {
        let x = 4.0f32;
        let approx = invsqrt(x);
        // Magic-number approximation, not exact; within a few percent.
        assert!((approx - 0.5).abs() < 0.01);
    }
}
