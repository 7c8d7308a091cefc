//! Monetary value extraction from receipt bodies.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::pipeline::senders::KnownSender;

/// Uber's dedicated total cell.
static UBER_TOTAL_CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<td class="Uber18_p3 total_head"[^>]*>R\$\s*([\d,]+)</td>"#).unwrap()
});

/// Any `R$ 12,34` amount.
static GENERIC_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"R\$\s*(\d+,\d{2})").unwrap());

/// Amount text normalized to `"R$ 12,34"`, or `None` for unknown senders
/// and bodies without a recognizable amount.
pub fn extract_value_text(sender: &str, body: &str) -> Option<String> {
    let digits = match KnownSender::from_address(sender)? {
        KnownSender::Uber => capture(&UBER_TOTAL_CELL, body).or_else(|| capture(&GENERIC_AMOUNT, body)),
        KnownSender::NinetyNine => capture(&GENERIC_AMOUNT, body),
    }?;
    Some(format!("R$ {digits}"))
}

/// Amount as a decimal. Unparsable text is `None`, never zero.
pub fn extract_amount(sender: &str, body: &str) -> Option<Decimal> {
    extract_value_text(sender, body).and_then(|text| parse_amount(&text))
}

/// `"R$ 12,34"` → `12.34`.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let normalized = text.replace("R$", "").replace(',', ".");
    Decimal::from_str(normalized.trim()).ok()
}

fn capture<'a>(regex: &Regex, body: &'a str) -> Option<&'a str> {
    regex.captures(body).and_then(|c| c.get(1)).map(|m| m.as_str())
}
