//! Table of commonly traded currencies.

use crate::Currency;

/// Currency codes with their display names, in the order they are listed.
pub const COMMON_CURRENCIES: &[(&str, &str)] = &[
    ("USD", "United States Dollar"),
    ("EUR", "Euro"),
    ("GBP", "British Pound Sterling"),
    ("JPY", "Japanese Yen"),
    ("CAD", "Canadian Dollar"),
    ("AUD", "Australian Dollar"),
    ("CHF", "Swiss Franc"),
    ("CNY", "Chinese Yuan"),
    ("INR", "Indian Rupee"),
    ("BRL", "Brazilian Real"),
    ("RUB", "Russian Ruble"),
    ("MXN", "Mexican Peso"),
    ("SGD", "Singapore Dollar"),
    ("HKD", "Hong Kong Dollar"),
    ("NZD", "New Zealand Dollar"),
    ("KRW", "South Korean Won"),
    ("TRY", "Turkish Lira"),
    ("ZAR", "South African Rand"),
    ("SEK", "Swedish Krona"),
    ("NOK", "Norwegian Krone"),
    ("DKK", "Danish Krone"),
    ("PLN", "Polish Zloty"),
    ("THB", "Thai Baht"),
    ("IDR", "Indonesian Rupiah"),
    ("MYR", "Malaysian Ringgit"),
    ("PHP", "Philippine Peso"),
    ("CZK", "Czech Koruna"),
    ("HUF", "Hungarian Forint"),
];

/// Look up the display name of a well-known currency.
pub fn currency_name(currency: &Currency) -> Option<&'static str> {
    COMMON_CURRENCIES
        .iter()
        .find(|(code, _)| *code == currency.code())
        .map(|(_, name)| *name)
}

/// All well-known currencies as validated codes.
pub fn common_currencies() -> Vec<Currency> {
    COMMON_CURRENCIES
        .iter()
        .filter_map(|(code, _)| Currency::parse(code).ok())
        .collect()
}
