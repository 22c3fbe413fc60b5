//! Duration strings in the `300ms` / `1h30m` / `1.5h` style.
//!
//! Accepted units: `ns`, `us` (or `µs`/`μs`), `ms`, `s`, `m`, `h`. A bare `0`
//! is accepted without a unit, and so is a leading `+`. A leading `-` is
//! rejected: a negative TTL has no meaning for the cache.

use std::time::Duration;

const UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("us", 1e3),
    ("µs", 1e3),
    ("μs", 1e3),
    ("ms", 1e6),
    ("s", 1e9),
    ("m", 60e9),
    ("h", 3600e9),
];

/// Parse a duration string, returning `None` if it is malformed.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let trimmed = input.trim();
    let s = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if s.is_empty() {
        return None;
    }
    if s == "0" {
        return Some(Duration::ZERO);
    }

    let mut rest = s;
    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..num_len];
        if number.is_empty() || number == "." || number.matches('.').count() > 1 {
            return None;
        }
        let value: f64 = number.parse().ok()?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        let scale = UNITS.iter().find(|(name, _)| *name == unit)?.1;
        rest = &rest[unit_len..];

        total_nanos += value * scale;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total_nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_units() {
        assert_eq!(parse_duration("10m"), Some(Duration::from_secs(600)));
        assert_eq!(parse_duration("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("300ms"), Some(Duration::from_millis(300)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("15us"), Some(Duration::from_micros(15)));
        assert_eq!(parse_duration("15µs"), Some(Duration::from_micros(15)));
    }

    #[test]
    fn test_compound_and_fractional() {
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::from_secs(5400)));
        assert_eq!(
            parse_duration("2m3.5s"),
            Some(Duration::from_millis(123_500))
        );
    }

    #[test]
    fn test_zero_forms() {
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration("0s"), Some(Duration::ZERO));
        assert_eq!(parse_duration("0h0m"), Some(Duration::ZERO));
    }

    #[test]
    fn test_leading_plus_accepted() {
        assert_eq!(parse_duration("+5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("+0"), Some(Duration::ZERO));
        assert_eq!(parse_duration(" +1h30m"), Some(Duration::from_secs(5400)));
    }

    #[test]
    fn test_rejects_garbage() {
        for bad in ["", "   ", "10", "m", "10x", "ten minutes", "-5m", "+", "++5m", "1..5s", "5m-"] {
            assert_eq!(parse_duration(bad), None, "{bad:?} should not parse");
        }
    }
}
