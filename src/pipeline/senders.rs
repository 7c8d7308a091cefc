//! Receipt senders with sender-specific extraction rules.

/// Senders whose receipts carry extractable values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownSender {
    /// Uber trip receipts: card digits and a dedicated total cell.
    Uber,
    /// 99 trip receipts: generic amount pattern only.
    NinetyNine,
}

impl KnownSender {
    pub const UBER_ADDRESS: &'static str = "noreply@uber.com";
    pub const NINETY_NINE_ADDRESS: &'static str = "voude99@99app.com";

    /// Match an already-normalized (lowercased, bare) sender address.
    pub fn from_address(address: &str) -> Option<Self> {
        match address {
            Self::UBER_ADDRESS => Some(Self::Uber),
            Self::NINETY_NINE_ADDRESS => Some(Self::NinetyNine),
            _ => None,
        }
    }
}
