//! Sender allowlist applied before any catalog traffic.

use std::fmt;

/// One allowlist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderRule {
    /// `*`
    Any,
    /// `@domain` or bare `domain`, matched against the part after `@`.
    Domain(String),
    /// `user@domain`, matched exactly.
    Address(String),
}

impl SenderRule {
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim().to_lowercase();
        match entry.as_str() {
            "" => None,
            "*" => Some(Self::Any),
            _ => Some(match entry.strip_prefix('@') {
                Some(domain) => Self::Domain(domain.to_string()),
                None if entry.contains('@') => Self::Address(entry),
                None => Self::Domain(entry),
            }),
        }
    }

    fn matches(&self, sender: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Address(address) => address == sender,
            Self::Domain(domain) => sender
                .rsplit_once('@')
                .is_some_and(|(_, sender_domain)| sender_domain == domain),
        }
    }
}

impl fmt::Display for SenderRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Domain(domain) => write!(f, "@{domain}"),
            Self::Address(address) => f.write_str(address),
        }
    }
}

/// Ordered set of [`SenderRule`]s. An empty list denies everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderAllowlist {
    rules: Vec<SenderRule>,
}

impl SenderAllowlist {
    pub fn allow_all() -> Self {
        Self {
            rules: vec![SenderRule::Any],
        }
    }

    /// Build from individual entries; blank entries are dropped.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            rules: entries
                .into_iter()
                .filter_map(|e| SenderRule::parse(e.as_ref()))
                .collect(),
        }
    }

    /// Build from a comma-separated list such as `noreply@uber.com, @99app.com`.
    pub fn from_csv(raw: &str) -> Self {
        Self::from_entries(raw.split(','))
    }

    pub fn rules(&self) -> &[SenderRule] {
        &self.rules
    }

    pub fn allows(&self, sender: &str) -> bool {
        let sender = sender.trim().to_lowercase();
        self.rules.iter().any(|rule| rule.matches(&sender))
    }
}

impl fmt::Display for SenderAllowlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rules.contains(&SenderRule::Any) {
            return f.write_str("everyone");
        }
        if self.rules.is_empty() {
            return f.write_str("none (deny all)");
        }
        let rules: Vec<String> = self.rules.iter().map(ToString::to_string).collect();
        f.write_str(&rules.join(", "))
    }
}
