use crate::models::Currency;

/// Format an amount in minor units for display, e.g. `52440` in euros
/// becomes `"524.40 EUR"`.
pub fn format_minor_units(amount: i64, currency: Currency) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!(
        "{}{}.{:02} {}",
        sign,
        abs / 100,
        abs % 100,
        currency.code().to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minor_units_with_two_decimals() {
        assert_eq!(format_minor_units(52_440, Currency::Eur), "524.40 EUR");
        assert_eq!(format_minor_units(5, Currency::Usd), "0.05 USD");
        assert_eq!(format_minor_units(0, Currency::Usd), "0.00 USD");
        assert_eq!(format_minor_units(-150, Currency::Eur), "-1.50 EUR");
    }
}
