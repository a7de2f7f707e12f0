//! Integer-cent helpers. Prices never travel as floats.

/// Multiply `cents` by `factor`, rounding half away from zero.
pub fn scale_cents(cents: i64, factor: f64) -> i64 {
    (cents as f64 * factor).round() as i64
}

/// Basis-point percentage of an amount (`rate` of 0.0825 is 8.25%).
pub fn percent_of(cents: i64, rate: f64) -> i64 {
    scale_cents(cents, rate)
}

/// Human-readable amount, e.g. `USD 1,250.00`.
pub fn format_cents(cents: i64, currency: &str) -> String {
    let negative = cents < 0;
    let abs = cents.unsigned_abs();
    let whole = abs / 100;
    let frac = abs % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!(
        "{}{} {}.{:02}",
        if negative { "-" } else { "" },
        currency,
        grouped,
        frac
    )
}
