//! Payment-method inference from receipt bodies.
//!
//! Brand rules run in table order and the first brand with a matching
//! pattern wins. When no brand matches, a generic card phrase yields the
//! generic card label; otherwise the method is unknown.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::mail::{BodyKind, strip_html};
use crate::pipeline::senders::KnownSender;
use crate::pipeline::types::PaymentInference;

/// Label used when a card is mentioned but no brand is recognized.
pub const GENERIC_CARD_LABEL: &str = "Cartão de Crédito/Débito";
/// Label used when nothing payment-related is recognized.
pub const UNKNOWN_LABEL: &str = "Desconhecido";
/// Card digits reported when the receipt does not show them.
pub const DEFAULT_CARD_DIGITS: &str = "0000";

const GENERIC_CARD_PHRASES: &[&str] = &[
    "cartão de crédito",
    "cartao de credito",
    "credit card",
    "cartão de débito",
    "cartao de debito",
    "debit card",
];

/// Masked card number such as `••••1234` or `****1234`.
static MASKED_CARD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[•*]{4}(\d{4})").unwrap());

/// Brand table in priority order.
const DEFAULT_BRANDS: &[(&str, &[(&str, Surface)])] = &[
    (
        "Visa",
        &[
            (r"visa\b", Surface::Text),
            (r"visa credit", Surface::Text),
            (r"visa_3x\.png", Surface::Raw),
        ],
    ),
    (
        "Mastercard",
        &[(r"mastercard", Surface::Text), (r"master\scard", Surface::Text)],
    ),
    (
        "American Express",
        &[(r"american express", Surface::Text), (r"\bamex\b", Surface::Text)],
    ),
    ("Elo", &[(r"\belo\b", Surface::Text)]),
    ("Hipercard", &[(r"hipercard", Surface::Text)]),
];

/// Which representation of the body a pattern is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// The body exactly as received (markup included). Used for image
    /// filename markers.
    Raw,
    /// Lowercased visible text.
    Text,
}

/// One case-insensitive brand marker.
#[derive(Debug, Clone)]
pub struct BrandPattern {
    regex: Regex,
    surface: Surface,
}

impl BrandPattern {
    pub fn new(pattern: &str, surface: Surface) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(&format!("(?i){pattern}"))?,
            surface,
        })
    }

    fn is_match(&self, raw: &str, text: &str) -> bool {
        match self.surface {
            Surface::Raw => self.regex.is_match(raw),
            Surface::Text => self.regex.is_match(text),
        }
    }
}

/// A card brand and the markers that identify it.
#[derive(Debug, Clone)]
pub struct BrandRule {
    pub label: String,
    pub patterns: Vec<BrandPattern>,
}

impl BrandRule {
    fn matches(&self, raw: &str, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(raw, text))
    }
}

/// Ordered brand table plus the generic-card fallback.
#[derive(Debug, Clone)]
pub struct PaymentClassifier {
    brands: Vec<BrandRule>,
}

impl Default for PaymentClassifier {
    fn default() -> Self {
        Self::default_rules()
    }
}

impl PaymentClassifier {
    /// Built-in brand table: Visa, Mastercard, American Express, Elo, Hipercard.
    pub fn default_rules() -> Self {
        let mut classifier = Self::empty();
        for (label, patterns) in DEFAULT_BRANDS {
            classifier.add_brand_rule(label, patterns).unwrap();
        }
        classifier
    }

    /// Classifier with no brand rules; only the generic fallback applies.
    pub fn empty() -> Self {
        Self { brands: Vec::new() }
    }

    /// Append a brand after the existing ones (lowest priority).
    pub fn add_brand_rule(
        &mut self,
        label: &str,
        patterns: &[(&str, Surface)],
    ) -> Result<(), regex::Error> {
        let patterns = patterns
            .iter()
            .map(|(p, surface)| BrandPattern::new(p, *surface))
            .collect::<Result<Vec<_>, _>>()?;
        self.brands.push(BrandRule {
            label: label.into(),
            patterns,
        });
        Ok(())
    }

    /// Infer the payment label and card digits for one receipt body.
    pub fn classify(&self, sender: &str, body: &str, kind: BodyKind) -> PaymentInference {
        let text = match kind {
            BodyKind::Html => strip_html(body).to_lowercase(),
            BodyKind::Text | BodyKind::None => body.to_lowercase(),
        };

        let label = self.label_for(body, &text);
        let card_last4 = card_last4(sender, body);
        debug!(sender, label, card_last4 = %card_last4, "Payment method inferred");

        PaymentInference {
            label: label.to_string(),
            card_last4,
        }
    }

    fn label_for<'a>(&'a self, raw: &str, text: &str) -> &'a str {
        if let Some(rule) = self.brands.iter().find(|r| r.matches(raw, text)) {
            return &rule.label;
        }
        if GENERIC_CARD_PHRASES.iter().any(|p| text.contains(p)) {
            return GENERIC_CARD_LABEL;
        }
        UNKNOWN_LABEL
    }
}

/// Last four card digits. Only Uber receipts show them.
pub fn card_last4(sender: &str, raw_body: &str) -> String {
    match KnownSender::from_address(sender) {
        Some(KnownSender::Uber) => MASKED_CARD
            .captures(raw_body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| DEFAULT_CARD_DIGITS.to_string()),
        _ => DEFAULT_CARD_DIGITS.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UBER: &str = "noreply@uber.com";
    const NINETY_NINE: &str = "voude99@99app.com";

    fn classify(sender: &str, body: &str, kind: BodyKind) -> PaymentInference {
        PaymentClassifier::default_rules().classify(sender, body, kind)
    }

    #[test]
    fn visa_in_text() {
        let result = classify(UBER, "Paid with VISA ••••4242", BodyKind::Text);
        assert_eq!(result.label, "Visa");
        assert_eq!(result.card_last4, "4242");
    }

    #[test]
    fn visa_image_marker_matched_on_raw_html() {
        let html = r#"<table><tr><td><img src="https://cdn.example/visa_3x.png" alt=""></td>
            <td>****1111</td></tr></table>"#;
        let result = classify(UBER, html, BodyKind::Html);
        assert_eq!(result.label, "Visa");
        assert_eq!(result.card_last4, "1111");
    }

    #[test]
    fn image_marker_not_matched_in_visible_text() {
        // Attribute values never reach the text surface.
        let mut classifier = PaymentClassifier::empty();
        classifier
            .add_brand_rule("Img", &[(r"brand_3x\.png", Surface::Text)])
            .unwrap();
        let html = r#"<img src="brand_3x.png">"#;
        assert_eq!(
            classifier.classify(UBER, html, BodyKind::Html).label,
            UNKNOWN_LABEL
        );
    }

    #[test]
    fn mastercard_variants() {
        assert_eq!(classify(NINETY_NINE, "Mastercard final 1234", BodyKind::Text).label, "Mastercard");
        assert_eq!(classify(NINETY_NINE, "pago com master card", BodyKind::Text).label, "Mastercard");
    }

    #[test]
    fn extra_brands() {
        assert_eq!(classify(UBER, "American Express", BodyKind::Text).label, "American Express");
        assert_eq!(classify(UBER, "cartão Elo", BodyKind::Text).label, "Elo");
        assert_eq!(classify(UBER, "HIPERCARD", BodyKind::Text).label, "Hipercard");
    }

    #[test]
    fn brand_wins_over_generic_phrase() {
        let body = "Pagamento no cartão de crédito Mastercard";
        assert_eq!(classify(NINETY_NINE, body, BodyKind::Text).label, "Mastercard");
    }

    #[test]
    fn table_order_decides_between_brands() {
        let body = "Mastercard ou Visa";
        assert_eq!(classify(NINETY_NINE, body, BodyKind::Text).label, "Visa");
    }

    #[test]
    fn generic_card_phrase() {
        let result = classify(NINETY_NINE, "Pago com Cartão de Débito", BodyKind::Text);
        assert_eq!(result.label, GENERIC_CARD_LABEL);
        assert_eq!(result.card_last4, DEFAULT_CARD_DIGITS);
    }

    #[test]
    fn generic_phrase_found_in_html_text() {
        let html = "<p>Credit&nbsp;card</p><p>cartao de <b>credito</b></p>";
        assert_eq!(classify(NINETY_NINE, html, BodyKind::Html).label, GENERIC_CARD_LABEL);
    }

    #[test]
    fn nothing_recognized() {
        let result = classify(UBER, "Obrigado por viajar", BodyKind::Text);
        assert_eq!(result.label, UNKNOWN_LABEL);
        assert_eq!(result.card_last4, DEFAULT_CARD_DIGITS);
    }

    #[test]
    fn card_digits_only_for_uber() {
        assert_eq!(card_last4(UBER, "Visa ****9876"), "9876");
        assert_eq!(card_last4(NINETY_NINE, "Visa ****9876"), DEFAULT_CARD_DIGITS);
        assert_eq!(card_last4("x@example.com", "••••9876"), DEFAULT_CARD_DIGITS);
    }

    #[test]
    fn first_masked_number_used() {
        assert_eq!(card_last4(UBER, "••••1234 then ****5678"), "1234");
    }

    #[test]
    fn invalid_custom_pattern_rejected() {
        let mut classifier = PaymentClassifier::empty();
        assert!(classifier.add_brand_rule("Bad", &[("(", Surface::Text)]).is_err());
        assert!(classifier.brands.is_empty());
    }
}
