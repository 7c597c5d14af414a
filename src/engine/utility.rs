/// Rounds to a fixed number of decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Parses a decimal number, returning `None` for blanks, garbage, and
/// non-finite values.
pub fn parse_decimal(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses an integer the forgiving way crash feeds need: `"12"`, `" 12 "`,
/// and `"12.0"` all give 12, fractional values truncate toward zero.
pub fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(v) = text.parse::<i64>() {
        return Some(v);
    }
    parse_decimal(text).map(|v| v.trunc() as i64)
}

/// Parses a non-negative count. Anything unparseable or negative is 0.
pub fn parse_count(text: &str) -> u32 {
    parse_integer(text)
        .filter(|v| *v > 0)
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(2.254, 2), 2.25);
        assert_eq!(round_to(2.256, 2), 2.26);
        assert_eq!(round_to(-1.5, 0), -2.0);
    }

    #[test]
    fn test_parse_decimal_rejects_garbage() {
        assert_eq!(parse_decimal("41.88"), Some(41.88));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("north"), None);
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal("inf"), None);
    }

    #[test]
    fn test_parse_integer_truncates() {
        assert_eq!(parse_integer(" 1200 "), Some(1200));
        assert_eq!(parse_integer("12.9"), Some(12));
        assert_eq!(parse_integer("x"), None);
    }

    #[test]
    fn test_parse_count_never_negative() {
        assert_eq!(parse_count("2"), 2);
        assert_eq!(parse_count("-1"), 0);
        assert_eq!(parse_count("two"), 0);
        assert_eq!(parse_count(""), 0);
    }
}
