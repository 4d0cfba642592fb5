//! Per-country tax policy.
//!
//! One canonical table of EU VAT standard rates with locale-appropriate
//! display labels. Quoting never fails: unrecognized or missing
//! countries degrade to a zero-tax quote so the charged amount stays
//! correct even for unknown jurisdictions.

/// A tax quote for a single sale. Recomputed per request, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxQuote {
    /// Normalized alpha-2 code the quote was computed for, if any.
    pub country_code: Option<String>,
    /// Rate in [0, 1].
    pub rate: f64,
    pub label: &'static str,
}

const NO_TAX_LABEL: &str = "No VAT/Tax";
const US_LABEL: &str = "No Sales Tax";

/// EU standard VAT rates, one entry per member state.
const EU_VAT_RATES: &[(&str, f64, &str)] = &[
    ("AT", 0.20, "USt. 20%"),
    ("BE", 0.21, "TVA 21%"),
    ("BG", 0.20, "DDS 20%"),
    ("HR", 0.25, "PDV 25%"),
    ("CY", 0.19, "VAT 19%"),
    ("CZ", 0.21, "DPH 21%"),
    ("DK", 0.25, "Moms 25%"),
    ("EE", 0.20, "KM 20%"),
    ("FI", 0.24, "ALV 24%"),
    ("FR", 0.20, "TVA 20%"),
    ("DE", 0.19, "MwSt. 19%"),
    ("GR", 0.24, "FPA 24%"),
    ("HU", 0.27, "AFA 27%"),
    ("IE", 0.23, "VAT 23%"),
    ("IT", 0.22, "IVA 22%"),
    ("LV", 0.21, "PVN 21%"),
    ("LT", 0.21, "PVM 21%"),
    ("LU", 0.17, "TVA 17%"),
    ("MT", 0.18, "VAT 18%"),
    ("NL", 0.21, "BTW 21%"),
    ("PL", 0.23, "VAT 23%"),
    ("PT", 0.23, "IVA 23%"),
    ("RO", 0.19, "TVA 19%"),
    ("SK", 0.20, "DPH 20%"),
    ("SI", 0.22, "DDV 22%"),
    ("ES", 0.21, "IVA 21%"),
    ("SE", 0.25, "Moms 25%"),
];

/// Quote the tax for a country code (ISO-3166 alpha-2, case-insensitive).
///
/// `None`, empty, and unrecognized codes all quote zero tax. The US is
/// quoted at zero as well: state-level sales tax is not computed here.
pub fn quote(country_code: Option<&str>) -> TaxQuote {
    let normalized = match country_code.map(str::trim) {
        Some(code) if !code.is_empty() => code.to_ascii_uppercase(),
        _ => {
            return TaxQuote {
                country_code: None,
                rate: 0.0,
                label: NO_TAX_LABEL,
            }
        }
    };

    if normalized == "US" {
        return TaxQuote {
            country_code: Some(normalized),
            rate: 0.0,
            label: US_LABEL,
        };
    }

    match EU_VAT_RATES
        .iter()
        .find(|(code, _, _)| *code == normalized)
    {
        Some(&(_, rate, label)) => TaxQuote {
            country_code: Some(normalized),
            rate,
            label,
        },
        None => TaxQuote {
            country_code: Some(normalized),
            rate: 0.0,
            label: NO_TAX_LABEL,
        },
    }
}

/// Tax on a base amount in minor units, rounded to the nearest unit.
pub fn tax_amount(base: i64, rate: f64) -> i64 {
    (base as f64 * rate).round() as i64
}
