//! Normalises the model's self-assessed confidence.

/// Score used when the self-assessment is unusable.
///
/// Mid-range so that an unreadable answer lands below the auto-send
/// threshold and goes to human review.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Parse a raw confidence string into a score in `[0, 1]`.
///
/// Never fails: unparseable, non-finite or out-of-range values all map to
/// [`FALLBACK_CONFIDENCE`].
pub fn parse_confidence(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && (0.0..=1.0).contains(&value) => value,
        _ => FALLBACK_CONFIDENCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_scores() {
        assert_eq!(parse_confidence("0.85"), 0.85);
        assert_eq!(parse_confidence("  1.0\n"), 1.0);
        assert_eq!(parse_confidence("0"), 0.0);
    }

    #[test]
    fn malformed_input_falls_back() {
        assert_eq!(parse_confidence("not a number"), FALLBACK_CONFIDENCE);
        assert_eq!(parse_confidence(""), FALLBACK_CONFIDENCE);
        assert_eq!(parse_confidence("Confidence: 0.9"), FALLBACK_CONFIDENCE);
    }

    #[test]
    fn out_of_range_falls_back() {
        assert_eq!(parse_confidence("1.5"), FALLBACK_CONFIDENCE);
        assert_eq!(parse_confidence("-0.1"), FALLBACK_CONFIDENCE);
        assert_eq!(parse_confidence("NaN"), FALLBACK_CONFIDENCE);
        assert_eq!(parse_confidence("inf"), FALLBACK_CONFIDENCE);
    }
}
