//! Duration values as they appear in connection URI query parameters.
//!
//! A bare integer is a number of seconds (`"5"` is five seconds, `"-1"` is
//! minus one second). Anything else follows the Go duration grammar: an
//! optional sign followed by one or more decimal numbers, each with an
//! optional fraction and a mandatory unit, e.g. `"250ms"`, `"1.5s"`,
//! `"1h2m3s"`.

use chrono::Duration;

const NANOS_PER_MICRO: i128 = 1_000;
const NANOS_PER_MILLI: i128 = 1_000_000;
const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Parses a query parameter duration into a signed [`Duration`].
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    if let Ok(seconds) = input.parse::<i64>() {
        return Duration::try_seconds(seconds).ok_or_else(|| "duration out of range".to_string());
    }
    parse_go_duration(input)
}

fn parse_go_duration(input: &str) -> Result<Duration, String> {
    let invalid = || format!("invalid duration {input:?}");

    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };

    if rest == "0" {
        return Ok(Duration::zero());
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: i128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after_int) = rest.split_at(int_len);

        let (frac_part, after_number) = match after_int.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
                after_dot.split_at(frac_len)
            }
            None => ("", after_int),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_len = after_number
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map_or(after_number.len(), |(idx, _)| idx);
        let (unit, remaining) = after_number.split_at(unit_len);
        let scale = unit_scale(unit).ok_or_else(|| {
            if unit.is_empty() {
                format!("missing unit in duration {input:?}")
            } else {
                format!("unknown unit {unit:?} in duration {input:?}")
            }
        })?;

        let whole: i128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(invalid)?;

        // Fractional digits past nanosecond precision are dropped.
        let mut divisor: i128 = 1;
        let mut fraction: i128 = 0;
        for digit in frac_part.bytes().take(18) {
            fraction = fraction * 10 + i128::from(digit - b'0');
            divisor *= 10;
        }
        nanos += fraction * scale / divisor;

        total = total.checked_add(nanos).ok_or_else(invalid)?;
        rest = remaining;
    }

    if negative {
        total = -total;
    }
    let nanos = i64::try_from(total).map_err(|_| format!("duration {input:?} out of range"))?;
    Ok(Duration::nanoseconds(nanos))
}

fn unit_scale(unit: &str) -> Option<i128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SECOND),
        "m" => Some(60 * NANOS_PER_SECOND),
        "h" => Some(3_600 * NANOS_PER_SECOND),
        _ => None,
    }
}
