// SPDX-License-Identifier: MIT
//! printf-compatible number formatting for bank dumps
//!
//! Dump output is compared line by line against existing tooling, so the
//! `%g`, `%e` and `%f` conversions have to match C exactly: two-digit signed
//! exponents, trailing-zero stripping for `%g`, and lower-case `nan`/`inf`.

fn non_finite(v: f64) -> Option<&'static str> {
    if v.is_nan() {
        Some(if v.is_sign_negative() { "-nan" } else { "nan" })
    } else if v.is_infinite() {
        Some(if v > 0.0 { "inf" } else { "-inf" })
    } else {
        None
    }
}

fn pad(body: &str, width: usize) -> String {
    format!("{:>width$}", body, width = width)
}

/// Split Rust's `{:e}` output into mantissa and decimal exponent
fn split_exp(formatted: &str) -> (&str, i32) {
    match formatted.split_once('e') {
        Some((mantissa, exp)) => (mantissa, exp.parse().unwrap_or(0)),
        None => (formatted, 0),
    }
}

fn c_exponent(exp: i32) -> String {
    let sign = if exp < 0 { '-' } else { '+' };
    format!("e{}{:02}", sign, exp.unsigned_abs())
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// `%{width}.{prec}e`
pub fn exp(v: f64, width: usize, prec: usize) -> String {
    if let Some(s) = non_finite(v) {
        return pad(s, width);
    }
    let formatted = format!("{:.*e}", prec, v);
    let (mantissa, exp) = split_exp(&formatted);
    pad(&format!("{}{}", mantissa, c_exponent(exp)), width)
}

/// `%{width}.{prec}f`
pub fn fixed(v: f64, width: usize, prec: usize) -> String {
    if let Some(s) = non_finite(v) {
        return pad(s, width);
    }
    format!("{:>width$.prec$}", v, width = width, prec = prec)
}

/// `%{width}.{prec}g`
pub fn general(v: f64, width: usize, prec: usize) -> String {
    if let Some(s) = non_finite(v) {
        return pad(s, width);
    }
    let p = prec.max(1);
    // The exponent after rounding to `p` significant digits decides the style
    let scientific = format!("{:.*e}", p - 1, v);
    let (mantissa, x) = split_exp(&scientific);
    let p = p as i32;

    let body = if x < -4 || x >= p {
        format!("{}{}", strip_zeros(mantissa), c_exponent(x))
    } else {
        let decimals = (p - 1 - x) as usize;
        strip_zeros(&format!("{:.*}", decimals, v)).to_string()
    };
    pad(&body, width)
}
