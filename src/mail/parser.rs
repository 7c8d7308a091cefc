//! Raw message → sender, subject, timestamp and primary body.
//!
//! Parsing never fails: anything that cannot be decoded degrades to an
//! absent or empty field.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, TimeZone};
use mail_parser::{HeaderName, MessageParser, MimeHeaders, PartType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// HTML bodies must be longer than this (in characters) to win over text.
pub const HTML_PREFERENCE_THRESHOLD: usize = 100;

/// Alternate `Date` layouts, tried in order once RFC 2822 parsing fails.
const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %z",
    "%a, %d %b %Y %H:%M %z",
];

static ANGLE_ADDRESS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<([^>]+)>").unwrap());

static TRAILING_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)\s*$").unwrap());

static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").unwrap());

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").unwrap());

static HTML_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

/// Which representation the primary body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    Html,
    Text,
    None,
}

impl BodyKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Text => "text",
            Self::None => "none",
        }
    }
}

/// Header fields and primary body of one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedMessage {
    /// Bare, lowercased sender address.
    pub sender: String,
    pub subject: String,
    pub sent_at: Option<DateTime<FixedOffset>>,
    /// Empty when `body_kind` is [`BodyKind::None`].
    pub body: String,
    pub body_kind: BodyKind,
}

impl ParsedMessage {
    fn empty() -> Self {
        Self {
            sender: String::new(),
            subject: String::new(),
            sent_at: None,
            body: String::new(),
            body_kind: BodyKind::None,
        }
    }
}

/// Parse a full RFC 822 message.
pub fn parse_message(raw: &[u8]) -> ParsedMessage {
    let Some(message) = MessageParser::default().parse(raw) else {
        warn!("Message could not be parsed; treating it as empty");
        return ParsedMessage::empty();
    };

    let sender = extract_sender(&message);
    let subject = message.subject().unwrap_or_default().to_string();

    let sent_at = match message.header_raw(HeaderName::Date) {
        Some(raw_date) => parse_mail_date(raw_date).or_else(|| {
            let lenient = message.date().and_then(convert_lenient_date);
            if lenient.is_none() {
                warn!(date = %raw_date.trim(), "Unrecognized Date header");
            }
            lenient
        }),
        None => None,
    };

    let (html, text) = first_html_and_text(&message);
    let (body, body_kind) = select_body(html, text);

    ParsedMessage {
        sender,
        subject,
        sent_at,
        body,
        body_kind,
    }
}

/// Bare address from a `Name <addr>` header value, lowercased.
///
/// Falls back to the whole trimmed value when no `<...>` span is present.
pub fn extract_address(header: &str) -> String {
    match ANGLE_ADDRESS.captures(header) {
        Some(caps) => caps[1].trim().to_lowercase(),
        None => header.trim().to_lowercase(),
    }
}

/// Parse a `Date` header: RFC 2822 first, then the fallback layouts.
pub fn parse_mail_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let value = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc2822(&value) {
        return Some(parsed);
    }

    let without_comment = TRAILING_COMMENT.replace(&value, "");
    for format in FALLBACK_DATE_FORMATS {
        for candidate in [value.as_str(), &*without_comment] {
            if let Ok(parsed) = DateTime::parse_from_str(candidate, format) {
                debug!(format, "Date parsed with fallback layout");
                return Some(parsed);
            }
        }
    }
    None
}

/// Pick the primary body: HTML when longer than the threshold, else text.
pub fn select_body(html: Option<String>, text: Option<String>) -> (String, BodyKind) {
    match (html, text) {
        (Some(html), _) if html.chars().count() > HTML_PREFERENCE_THRESHOLD => {
            (html, BodyKind::Html)
        }
        (_, Some(text)) if !text.is_empty() => (text, BodyKind::Text),
        _ => (String::new(), BodyKind::None),
    }
}

/// Strip markup and collapse whitespace, leaving visible text.
///
/// `<style>`/`<script>` blocks and comments are dropped entirely; common
/// entities are decoded.
pub fn strip_html(html: &str) -> String {
    let html = HTML_COMMENT.replace_all(html, " ");
    let html = STYLE_BLOCK.replace_all(&html, " ");
    let html = SCRIPT_BLOCK.replace_all(&html, " ");

    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }

    decode_entities(&result)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            decode_entity(entity).map(|ch| (ch, end + 1))
        });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(num) = entity.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    let ch = match entity {
        "nbsp" => ' ',
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "bull" => '•',
        "ccedil" => 'ç',
        "atilde" => 'ã',
        "eacute" => 'é',
        "aacute" => 'á',
        "oacute" => 'ó',
        _ => return None,
    };
    Some(ch)
}

fn extract_sender(message: &mail_parser::Message<'_>) -> String {
    if let Some(addr) = message.from().and_then(|from| from.first()) {
        if let Some(email) = addr.address() {
            return email.trim().to_lowercase();
        }
        if let Some(name) = addr.name() {
            return extract_address(name);
        }
    }
    message
        .header_raw(HeaderName::From)
        .map(extract_address)
        .unwrap_or_default()
}

/// First non-attachment `text/html` and `text/plain` parts, already
/// charset-decoded by the parser.
fn first_html_and_text(message: &mail_parser::Message<'_>) -> (Option<String>, Option<String>) {
    let mut html: Option<String> = None;
    let mut text: Option<String> = None;

    for part in &message.parts {
        let is_attachment = part
            .content_disposition()
            .is_some_and(|d| d.ctype().eq_ignore_ascii_case("attachment"));
        if is_attachment {
            continue;
        }

        match &part.body {
            PartType::Html(content) if html.is_none() => {
                html = Some(content.to_string());
            }
            PartType::Text(content) if text.is_none() => {
                let is_plain = part.content_type().is_none_or(|ct| {
                    ct.ctype().eq_ignore_ascii_case("text")
                        && ct
                            .subtype()
                            .is_none_or(|sub| sub.eq_ignore_ascii_case("plain"))
                });
                if is_plain {
                    text = Some(content.to_string());
                }
            }
            _ => {}
        }

        if html.is_some() && text.is_some() {
            break;
        }
    }

    (html, text)
}

fn convert_lenient_date(date: &mail_parser::DateTime) -> Option<DateTime<FixedOffset>> {
    let offset_secs = i32::from(date.tz_hour) * 3600 + i32::from(date.tz_minute) * 60;
    let offset = if date.tz_before_gmt {
        FixedOffset::west_opt(offset_secs)?
    } else {
        FixedOffset::east_opt(offset_secs)?
    };
    offset
        .with_ymd_and_hms(
            i32::from(date.year),
            u32::from(date.month),
            u32::from(date.day),
            u32::from(date.hour),
            u32::from(date.minute),
            u32::from(date.second),
        )
        .single()
}
