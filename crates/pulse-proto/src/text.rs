//! Text parsing and canonical rendering of metric values.

use crate::error::ProtoError;

/// Renders a gauge value in the canonical form.
///
/// The value is rounded to 15 fractional digits, printed in fixed notation
/// and stripped of trailing zeros (and a trailing dot), so `42.0` renders
/// as `42` and `2.500` as `2.5`.
#[must_use]
pub fn format_gauge(value: f64) -> String {
    let rounded = {
        let scaled = value * 1e15;
        if scaled.is_finite() {
            scaled.round() / 1e15
        } else {
            value
        }
    };

    let mut text = format!("{rounded:.15}");
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    text
}

/// Parses gauge text, accepting only finite doubles.
///
/// # Errors
///
/// Returns `ProtoError::InvalidGauge` when the text does not parse or
/// parses to an infinity or NaN.
pub fn parse_gauge_text(raw: &str) -> Result<f64, ProtoError> {
    let value: f64 = raw.trim().parse().map_err(|_| ProtoError::InvalidGauge {
        raw: raw.to_string(),
    })?;
    if !value.is_finite() {
        return Err(ProtoError::InvalidGauge {
            raw: raw.to_string(),
        });
    }
    Ok(value)
}

/// Parses counter text as a signed 64-bit integer.
///
/// # Errors
///
/// Returns `ProtoError::InvalidCounter` when the text does not parse.
pub fn parse_counter_text(raw: &str) -> Result<i64, ProtoError> {
    raw.trim().parse().map_err(|_| ProtoError::InvalidCounter {
        raw: raw.to_string(),
    })
}
