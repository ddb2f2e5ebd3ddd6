//! Text formatting for statistics, pixel readouts and plot ticks.

use crate::dtype::Dtype;

/// Exponential notation with `digits` decimals and an explicitly signed
/// exponent (`1.235e+6`).
fn to_exponential(value: f64, digits: usize) -> String {
    let s = format!("{value:.digits$e}");
    match s.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
        _ => s,
    }
}

/// Format a summary statistic. Non-finite values show as `-`.
#[must_use]
pub fn format_stat(value: f64) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    let abs = value.abs();
    if abs >= 1e6 || (abs > 0.0 && abs < 1e-3) {
        return to_exponential(value, 3);
    }
    if value.fract() == 0.0 {
        return format!("{value}");
    }
    format!("{value:.3}")
}

/// Format a pixel value for the readout of a frame of `dtype`.
///
/// Non-finite values produce an empty string.
#[must_use]
pub fn format_value(value: f64, dtype: Dtype) -> String {
    if !value.is_finite() {
        return String::new();
    }
    if dtype.is_integer() {
        format!("{}", value.round())
    } else {
        format!("{value:.3}")
    }
}

/// Format a profile plot tick label.
#[must_use]
pub fn format_roi_tick(value: f64) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    let abs = value.abs();
    if abs >= 1e5 || (abs > 0.0 && abs < 1e-3) {
        return to_exponential(value, 2);
    }
    if abs >= 1000.0 {
        return format!("{value:.0}");
    }
    if abs >= 100.0 {
        return format!("{value:.1}");
    }
    if abs >= 10.0 {
        return format!("{value:.2}");
    }
    let s = format!("{value:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
