//! Small built-in lookups for ISO country and currency codes.

use super::string_ops::{leading_chars, uppercase};

const COUNTRY_CODES: &[(&str, &str)] = &[
    ("UNITED STATES", "USA"),
    ("UNITED STATES OF AMERICA", "USA"),
    ("US", "USA"),
    ("USA", "USA"),
    ("UNITED KINGDOM", "GBR"),
    ("GREAT BRITAIN", "GBR"),
    ("UK", "GBR"),
    ("CANADA", "CAN"),
    ("CA", "CAN"),
    ("GERMANY", "DEU"),
    ("DE", "DEU"),
    ("FRANCE", "FRA"),
    ("FR", "FRA"),
    ("AUSTRALIA", "AUS"),
    ("AU", "AUS"),
    ("JAPAN", "JPN"),
    ("JP", "JPN"),
    ("CHINA", "CHN"),
    ("CN", "CHN"),
    ("INDIA", "IND"),
    ("IN", "IND"),
];

const CURRENCY_CODES: &[(&str, &str)] = &[
    ("USD", "USD"),
    ("US$", "USD"),
    ("$", "USD"),
    ("US DOLLAR", "USD"),
    ("EUR", "EUR"),
    ("EURO", "EUR"),
    ("€", "EUR"),
    ("GBP", "GBP"),
    ("POUND", "GBP"),
    ("BRITISH POUND", "GBP"),
    ("£", "GBP"),
    ("JPY", "JPY"),
    ("YEN", "JPY"),
    ("¥", "JPY"),
    ("CAD", "CAD"),
    ("CA$", "CAD"),
    ("CANADIAN DOLLAR", "CAD"),
    ("AUD", "AUD"),
    ("AUSTRALIAN DOLLAR", "AUD"),
    ("INR", "INR"),
    ("RUPEE", "INR"),
    ("₹", "INR"),
];

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, code)| *code)
}

/// Maps a country name or 2/3-letter code to ISO 3166-1 alpha-3. Unknown names fall
/// back to their first three characters, uppercased.
pub fn country_alpha3(value: &str) -> String {
    let key = uppercase(value.trim()).into_owned();
    match lookup(COUNTRY_CODES, &key) {
        Some(code) => code.to_string(),
        None if key.chars().count() >= 3 => leading_chars(&key, 3).to_string(),
        None => key,
    }
}

/// Maps a currency name or symbol to ISO 4217. Unknown values come back uppercased.
pub fn currency_iso4217(value: &str) -> String {
    let key = uppercase(value.trim()).into_owned();
    lookup(CURRENCY_CODES, &key)
        .map(str::to_string)
        .unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_names_and_codes_resolve() {
        assert_eq!(country_alpha3("United Kingdom"), "GBR");
        assert_eq!(country_alpha3(" us "), "USA");
        assert_eq!(country_alpha3("Netherlands"), "NET");
        assert_eq!(country_alpha3("nz"), "NZ");
    }

    #[test]
    fn currencies_resolve_symbols() {
        assert_eq!(currency_iso4217("€"), "EUR");
        assert_eq!(currency_iso4217("british pound"), "GBP");
        assert_eq!(currency_iso4217("chf"), "CHF");
    }
}
