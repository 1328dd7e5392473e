//! Pure field normalizers. None of these fail: unusable input becomes `None`.

/// Shorten `value` to at most `max_len` characters.
///
/// Absent, empty and whitespace-only input is `None`.
pub fn truncate(value: Option<&str>, max_len: usize) -> Option<String> {
    let value = value?;
    if value.trim().is_empty() {
        return None;
    }
    match value.char_indices().nth(max_len) {
        Some((byte_idx, _)) => Some(value[..byte_idx].to_string()),
        None => Some(value.to_string()),
    }
}

/// Parse a loosely formatted number such as `"$1,299.50"` or `"40%"`.
///
/// Currency, percent and thousands separators are removed, then the longest
/// leading decimal prefix is read, so `"12.50 USD"` yields `12.5`. An
/// exponent counts only when it has digits: `"1e3"` is `1000`, `"1e"` is `1`.
pub fn parse_number(value: Option<&str>) -> Option<f64> {
    let cleaned: String = value?
        .chars()
        .filter(|c| !matches!(c, '$' | '%' | ','))
        .collect();
    let prefix = leading_decimal(cleaned.trim_start())?;
    prefix.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Drop negative magnitudes; prices and percentages are never below zero.
pub fn non_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v >= 0.0)
}

/// `"<magnitude><unit>"`, e.g. `"750ml"`, when a magnitude is present.
pub fn format_size(magnitude: Option<&str>, unit: &str) -> Option<String> {
    let magnitude = magnitude?.trim();
    if magnitude.is_empty() {
        return None;
    }
    Some(format!("{magnitude}{unit}"))
}

fn leading_decimal(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let mut digits = 0;
    let mut seen_dot = false;
    while let Some(&b) = bytes.get(end) {
        if b.is_ascii_digit() {
            digits += 1;
        } else if b == b'.' && !seen_dot {
            seen_dot = true;
        } else {
            break;
        }
        end += 1;
    }
    if digits == 0 {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e') | Some(b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        let exp_digits = bytes[exp_end.min(bytes.len())..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }
    Some(&text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_caps_length_exactly() {
        let long = "x".repeat(300);
        assert_eq!(truncate(Some(&long), 255).map(|s| s.len()), Some(255));
        assert_eq!(truncate(Some("short"), 255).as_deref(), Some("short"));
    }

    #[test]
    fn truncate_treats_empty_as_absent() {
        assert_eq!(truncate(None, 255), None);
        assert_eq!(truncate(Some(""), 255), None);
        assert_eq!(truncate(Some("   "), 255), None);
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        assert_eq!(truncate(Some("crème brûlée"), 5).as_deref(), Some("crème"));
    }

    #[test]
    fn parse_number_strips_symbols() {
        assert_eq!(parse_number(Some("$12.50")), Some(12.5));
        assert_eq!(parse_number(Some("1,299")), Some(1299.0));
        assert_eq!(parse_number(Some("40%")), Some(40.0));
        assert_eq!(parse_number(Some(" 80 ")), Some(80.0));
        assert_eq!(parse_number(Some("12.50 USD")), Some(12.5));
        assert_eq!(parse_number(Some("-3")), Some(-3.0));
        assert_eq!(parse_number(Some(".5")), Some(0.5));
    }

    #[test]
    fn parse_number_reads_exponents() {
        assert_eq!(parse_number(Some("1e3")), Some(1000.0));
        assert_eq!(parse_number(Some("2.5E-1 abv")), Some(0.25));
        assert_eq!(parse_number(Some("4e+2")), Some(400.0));
        assert_eq!(parse_number(Some("1e")), Some(1.0));
        assert_eq!(parse_number(Some("7e-")), Some(7.0));
        assert_eq!(parse_number(Some("1e999")), None);
    }

    #[test]
    fn parse_number_yields_none_for_non_numeric() {
        assert_eq!(parse_number(Some("N/A")), None);
        assert_eq!(parse_number(Some("")), None);
        assert_eq!(parse_number(Some("inf")), None);
        assert_eq!(parse_number(Some("$")), None);
        assert_eq!(parse_number(None), None);
    }

    #[test]
    fn non_negative_drops_negatives() {
        assert_eq!(non_negative(Some(-1.0)), None);
        assert_eq!(non_negative(Some(0.0)), Some(0.0));
        assert_eq!(non_negative(None), None);
    }

    #[test]
    fn size_is_unit_stamped_only_when_present() {
        assert_eq!(format_size(Some("750"), "ml").as_deref(), Some("750ml"));
        assert_eq!(format_size(Some(""), "ml"), None);
        assert_eq!(format_size(None, "ml"), None);
    }
}
