//! Money arithmetic in integer minor units.
//!
//! Catalog prices arrive as decimal major units. They are converted to minor
//! units exactly once, with rounding, and every total after that is integer
//! math.

/// Currencies whose minor unit is the major unit.
const ZERO_DECIMAL: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

const THREE_DECIMAL: &[&str] = &["BHD", "JOD", "KWD", "OMR", "TND"];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PricingError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u32),

    #[error("Amount overflow")]
    Overflow,
}

/// Number of decimal places in the currency's minor unit.
pub fn currency_exponent(currency: &str) -> u32 {
    let code = currency.trim().to_ascii_uppercase();
    if ZERO_DECIMAL.contains(&code.as_str()) {
        0
    } else if THREE_DECIMAL.contains(&code.as_str()) {
        3
    } else {
        2
    }
}

/// Convert a major-unit price to minor units, rounding half away from zero.
pub fn to_minor_units(amount: f64, currency: &str) -> Result<i64, PricingError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(PricingError::InvalidPrice(amount.to_string()));
    }

    let scale = 10_f64.powi(currency_exponent(currency) as i32);
    let minor = (amount * scale).round();
    if minor > i64::MAX as f64 {
        return Err(PricingError::Overflow);
    }

    Ok(minor as i64)
}

/// `unit_amount * quantity` with overflow checking.
pub fn line_total(unit_amount: i64, quantity: u32) -> Result<i64, PricingError> {
    if quantity == 0 {
        return Err(PricingError::InvalidQuantity(quantity));
    }
    unit_amount
        .checked_mul(i64::from(quantity))
        .ok_or(PricingError::Overflow)
}
