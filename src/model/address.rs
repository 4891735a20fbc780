//! Address extraction and allow/deny list matching.
//!
//! No RFC 5322 parsing happens here. Addresses are pulled out of header text
//! with two loose patterns and lists are matched by plain substring search,
//! so a list entry like `example.com` also matches `notexample.com`.

use std::sync::LazyLock;

use regex::Regex;

use super::part::Message;
use crate::config::AddressSource;
use crate::parser::header::decode_encoded_words;

/// `<local@domain>` tokens, brackets included.
static ANGLE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^ <]+@[^ >,]+>").expect("valid address pattern"));

/// Bare `local@domain` tokens.
static BARE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^ <]+@[^ >,]+").expect("valid address pattern"));

/// Extract addresses from a header value.
///
/// Angle-bracket addresses win; bare tokens are only collected when the
/// text contains none.
pub fn extract_addresses(text: &str) -> Vec<String> {
    let angle: Vec<String> = ANGLE_ADDRESS
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();
    if !angle.is_empty() {
        return angle;
    }
    BARE_ADDRESS
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// True iff any candidate occurs in `text`. Case-sensitive.
pub fn matches_any<S: AsRef<str>>(text: &str, candidates: &[S]) -> bool {
    candidates.iter().any(|c| text.contains(c.as_ref()))
}

/// First candidate that occurs in any of `addresses`.
pub fn first_match<'a, S: AsRef<str>>(addresses: &[String], candidates: &'a [S]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| c.as_ref())
        .find(|c| addresses.iter().any(|a| a.contains(c)))
}

/// Addresses a message is filtered on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// From the decoded `From` header.
    pub senders: Vec<String>,
    /// From the raw `To` and `Cc` headers, in that order.
    pub recipients: Vec<String>,
}

impl Envelope {
    /// Missing headers yield empty lists.
    pub fn from_message(message: &Message) -> Self {
        let senders = message
            .from()
            .map(|v| extract_addresses(&decode_encoded_words(&v)))
            .unwrap_or_default();

        let mut recipients = message
            .to()
            .map(|v| extract_addresses(&v))
            .unwrap_or_default();
        if let Some(cc) = message.cc() {
            recipients.extend(extract_addresses(&cc));
        }

        Self {
            senders,
            recipients,
        }
    }

    pub fn addresses(&self, source: AddressSource) -> &[String] {
        match source {
            AddressSource::Recipients => &self.recipients,
            AddressSource::From => &self.senders,
        }
    }
}
