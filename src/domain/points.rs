use std::fmt;

/// Points are whole, indivisible units. Balances never go below zero, but
/// request amounts are signed so that bad input can be classified instead of
/// wrapping around.
pub type Points = i64;

/// Format points with thousands separators.
/// Example: 1500 -> "1,500", -1234567 -> "-1,234,567"
pub fn format_points(points: Points) -> String {
    let digits = points.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);

    if points < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Parse a points amount typed by a human.
/// Accepts an optional sign and `,` or `_` as digit separators.
/// Example: "1,000" -> 1000, "-5" -> -5, "2_500" -> 2500
pub fn parse_points(input: &str) -> Result<Points, ParsePointsError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParsePointsError::Empty);
    }

    let (negative, digits) = match input.as_bytes()[0] {
        b'-' => (true, &input[1..]),
        b'+' => (false, &input[1..]),
        _ => (false, input),
    };

    let cleaned: String = digits.chars().filter(|c| *c != ',' && *c != '_').collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParsePointsError::InvalidFormat);
    }

    let magnitude: i64 = cleaned.parse().map_err(|_| ParsePointsError::OutOfRange)?;
    Ok(if negative { -magnitude } else { magnitude })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsePointsError {
    Empty,
    InvalidFormat,
    OutOfRange,
}

impl fmt::Display for ParsePointsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsePointsError::Empty => write!(f, "empty points amount"),
            ParsePointsError::InvalidFormat => write!(f, "invalid points format"),
            ParsePointsError::OutOfRange => write!(f, "points amount out of range"),
        }
    }
}

impl std::error::Error for ParsePointsError {}
