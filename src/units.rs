/// Exact base-unit arithmetic for token amounts
///
/// All stored amounts are base-10 integer strings ("base units", e.g. wei) and
/// all scaling is done on 256-bit integers. Floating point only ever appears
/// in the display-oriented USD value; the whale-threshold comparison itself is
/// integer-exact so a one-wei shortfall is never rounded into inclusion.
use crate::errors::NormalizeError;
use primitive_types::U256;

/// Price resolution used for the exact threshold comparison: picodollars
/// (10^-12 USD) per whole token. Prices below 1e-12 USD flush to zero.
const PRICE_PICO_SCALE: f64 = 1e12;

/// Largest |exponent| accepted in scientific notation before rejecting the
/// value outright; anything larger is provider garbage.
const MAX_EXPONENT: i64 = 100;

pub fn pow10(n: u32) -> U256 {
    U256::from(10u64).pow(U256::from(n))
}

/// Convert a provider value literal into an exact base-10 integer string.
///
/// Accepts plain integers ("123"), decimal strings ("123.000") and scientific
/// notation ("1.23e21") and expands them by digit shifting - no floating-point
/// intermediate. Values that are not whole numbers (or are negative) are
/// rejected, not coerced.
pub fn parse_base_units(text: &str) -> Result<String, NormalizeError> {
    let invalid = |reason: &str| NormalizeError::InvalidValue {
        value: text.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty value"));
    }
    if trimmed.starts_with('-') {
        return Err(invalid("negative value"));
    }
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);

    // Split off a scientific-notation exponent if present
    let (mantissa, exponent) = match trimmed.find(['e', 'E']) {
        Some(pos) => {
            let exp: i64 = trimmed[pos + 1..]
                .parse()
                .map_err(|_| invalid("unparseable exponent"))?;
            (&trimmed[..pos], exp)
        }
        None => (trimmed, 0),
    };
    if exponent.abs() > MAX_EXPONENT {
        return Err(invalid("exponent out of range"));
    }

    // Split the mantissa around the decimal point
    let (int_part, frac_part) = match mantissa.find('.') {
        Some(pos) => (&mantissa[..pos], &mantissa[pos + 1..]),
        None => (mantissa, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid("no digits"));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid("non-digit characters"));
    }

    // Fold the fractional digits into the exponent, then shift
    let digits: String = format!("{}{}", int_part, frac_part);
    let digits = digits.trim_start_matches('0');
    let shift = exponent - frac_part.len() as i64;

    if digits.is_empty() {
        return Ok("0".to_string());
    }

    if shift >= 0 {
        let mut out = String::with_capacity(digits.len() + shift as usize);
        out.push_str(digits);
        for _ in 0..shift {
            out.push('0');
        }
        Ok(out)
    } else {
        // Negative shift: the dropped tail must be all zeros or the value
        // is not a whole number of base units
        let drop = (-shift) as usize;
        if digits.len() <= drop {
            return Err(invalid("not a whole number"));
        }
        let (kept, dropped) = digits.split_at(digits.len() - drop);
        if dropped.chars().any(|c| c != '0') {
            return Err(invalid("not a whole number"));
        }
        let kept = kept.trim_start_matches('0');
        Ok(if kept.is_empty() {
            "0".to_string()
        } else {
            kept.to_string()
        })
    }
}

/// Scale a raw base-unit amount to the canonical 18-decimal ("wei") scale.
///
/// Tokens with fewer than 18 decimals are multiplied up; tokens with more (up
/// to 36) take the inverse-scale branch and are divided down, truncating any
/// sub-wei dust.
pub fn scale_to_wei(raw_value: &str, decimals: u32) -> Result<U256, NormalizeError> {
    if decimals > 36 {
        return Err(NormalizeError::UnsupportedDecimals(decimals));
    }
    let value = U256::from_dec_str(raw_value).map_err(|e| NormalizeError::InvalidValue {
        value: raw_value.to_string(),
        reason: format!("{:?}", e),
    })?;

    if decimals <= 18 {
        value
            .checked_mul(pow10(18 - decimals))
            .ok_or_else(|| NormalizeError::ValueOutOfRange(raw_value.to_string()))
    } else {
        Ok(value / pow10(decimals - 18))
    }
}

/// Approximate whole-token amount for display; never used for filtering
pub fn wei_to_f64(value: U256) -> f64 {
    let divisor = pow10(18);
    let whole = value / divisor;
    let frac = value % divisor;
    if whole.bits() <= 128 {
        whole.low_u128() as f64 + frac.low_u128() as f64 / 1e18
    } else {
        // Beyond ~3.4e38 whole tokens; precision is moot
        value.to_string().parse::<f64>().unwrap_or(f64::MAX) / 1e18
    }
}

/// Quantize a USD price to picodollars for the exact threshold comparison
pub fn price_to_pico_usd(price_usd: f64) -> u128 {
    if !price_usd.is_finite() || price_usd <= 0.0 {
        return 0;
    }
    let scaled = (price_usd * PRICE_PICO_SCALE).round();
    if scaled >= u128::MAX as f64 {
        u128::MAX
    } else {
        scaled as u128
    }
}

/// Exact threshold test: value_wei * price_pico >= threshold_wei * 10^12.
///
/// Equivalent to (value_wei / 1e18) * price >= threshold_wei / 1e18 without
/// the float rounding that would pull a one-wei shortfall over the line.
pub fn meets_threshold(value_wei: U256, price_pico_usd: u128, threshold_wei: U256) -> bool {
    let lhs = value_wei.checked_mul(U256::from(price_pico_usd));
    let rhs = threshold_wei.checked_mul(pow10(12));
    match (lhs, rhs) {
        (Some(l), Some(r)) => l >= r,
        // LHS overflowing 256 bits means an astronomically large transfer
        (None, Some(_)) => true,
        (_, None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_integer() {
        assert_eq!(parse_base_units("1230000000000000000").unwrap(), "1230000000000000000");
        assert_eq!(parse_base_units("0").unwrap(), "0");
        assert_eq!(parse_base_units("007").unwrap(), "7");
    }

    #[test]
    fn test_parse_decimal_string() {
        assert_eq!(parse_base_units("123.000").unwrap(), "123");
        assert_eq!(parse_base_units("0.0").unwrap(), "0");
    }

    #[test]
    fn test_parse_scientific_notation() {
        assert_eq!(parse_base_units("1.23e21").unwrap(), "1230000000000000000000");
        assert_eq!(parse_base_units("1e18").unwrap(), "1000000000000000000");
        assert_eq!(parse_base_units("5E3").unwrap(), "5000");
        assert_eq!(parse_base_units("12300e-2").unwrap(), "123");
    }

    #[test]
    fn test_parse_rejects_non_integral() {
        assert!(parse_base_units("1.5").is_err());
        assert!(parse_base_units("1.23e1").is_err());
        assert!(parse_base_units("0.5e-3").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_base_units("").is_err());
        assert!(parse_base_units("-5").is_err());
        assert!(parse_base_units("12a3").is_err());
        assert!(parse_base_units("1e9999").is_err());
        assert!(parse_base_units("NaN").is_err());
    }

    #[test]
    fn test_scale_18_decimals_is_identity() {
        // 1.23 tokens at 18 decimals stays bit-exact
        let wei = scale_to_wei("1230000000000000000", 18).unwrap();
        assert_eq!(wei, U256::from_dec_str("1230000000000000000").unwrap());
    }

    #[test]
    fn test_scale_exact_to_ten_pow_thirty() {
        let raw = "1000000000000000000000000000000"; // 10^30
        let wei = scale_to_wei(raw, 18).unwrap();
        assert_eq!(wei.to_string(), raw);

        // 6-decimal token: multiplied up without drift
        let wei = scale_to_wei(raw, 6).unwrap();
        assert_eq!(wei.to_string(), format!("{}{}", raw, "0".repeat(12)));
    }

    #[test]
    fn test_scale_inverse_branch_above_18_decimals() {
        // 24-decimal token: divided down by 10^6
        let wei = scale_to_wei("5000000000000000000000000", 24).unwrap();
        assert_eq!(wei.to_string(), "5000000000000000000");
        // sub-wei dust truncates
        let wei = scale_to_wei("1999999", 24).unwrap();
        assert_eq!(wei.to_string(), "1");
    }

    #[test]
    fn test_scale_rejects_unsupported_decimals() {
        assert!(matches!(
            scale_to_wei("1", 37),
            Err(NormalizeError::UnsupportedDecimals(37))
        ));
    }

    #[test]
    fn test_threshold_boundary_is_wei_exact() {
        // $10,000 threshold at $1/token: exactly 10000 * 10^18 wei is in,
        // one wei below is out - this is where f64 would round up
        let threshold = U256::from_dec_str("10000000000000000000000").unwrap();
        let price_pico = price_to_pico_usd(1.0);

        assert!(meets_threshold(threshold, price_pico, threshold));
        assert!(!meets_threshold(threshold - U256::one(), price_pico, threshold));
    }

    #[test]
    fn test_threshold_zero_price_never_passes() {
        let threshold = U256::from_dec_str("1000000000000000000").unwrap();
        let huge = U256::from_dec_str("1000000000000000000000000000000").unwrap();
        assert!(!meets_threshold(huge, price_to_pico_usd(0.0), threshold));
        assert!(!meets_threshold(huge, price_to_pico_usd(-1.0), threshold));
    }

    #[test]
    fn test_wei_to_f64_display_value() {
        let wei = U256::from_dec_str("1230000000000000000").unwrap();
        assert!((wei_to_f64(wei) - 1.23).abs() < 1e-12);
        assert_eq!(wei_to_f64(U256::zero()), 0.0);
    }
}
