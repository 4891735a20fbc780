//! Owned MIME tree.
//!
//! Every node is either a leaf with a raw (still transfer-encoded) body or a
//! multipart container with ordered children. The distinction is fixed when
//! the node is built; rewriting only ever replaces a container's children.
//! Header values and bodies keep their original bytes so that parts the
//! filter does not touch serialize exactly as they were read.

use crate::parser::header::{decode_header_bytes, unfold_value};

/// Line terminator used when writing new lines into a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum LineEnding {
    CrLf,
    Lf,
}

impl LineEnding {
    /// Detect the terminator from the first line of `raw`. Defaults to CRLF.
    pub fn detect(raw: &[u8]) -> Self {
        match raw.iter().position(|&b| b == b'\n') {
            Some(pos) if pos == 0 || raw[pos - 1] != b'\r' => Self::Lf,
            _ => Self::CrLf,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CrLf => "\r\n",
            Self::Lf => "\n",
        }
    }

    pub fn as_bytes(self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

/// A single header field.
///
/// `raw_value` is everything after the colon, folding included, without the
/// terminating line break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: String,
    raw_value: Vec<u8>,
}

impl Header {
    /// Build a new header; the value is written after a single space.
    pub fn new(name: impl Into<String>, value: &str) -> Self {
        Self {
            name: name.into(),
            raw_value: format!(" {value}").into_bytes(),
        }
    }

    /// Build a header from bytes read off the wire.
    pub fn from_raw(name: impl Into<String>, raw_value: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            raw_value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw_value(&self) -> &[u8] {
        &self.raw_value
    }

    /// Unfolded, trimmed value.
    pub fn value(&self) -> String {
        unfold_value(&decode_header_bytes(&self.raw_value))
    }

    /// Case-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Ordered header list. Names are case-insensitive and may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, header: Header) {
        self.0.push(header);
    }

    /// Value of the first header called `name`.
    pub fn get(&self, name: &str) -> Option<String> {
        self.0.iter().find(|h| h.is(name)).map(Header::value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Header> for Headers {
    fn from_iter<I: IntoIterator<Item = Header>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A node of the MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePart {
    Leaf {
        /// Lower-cased `type/subtype`.
        content_type: String,
        headers: Headers,
        /// Body bytes as found on the wire (still transfer-encoded).
        body: Vec<u8>,
    },
    Multipart {
        /// Lower-cased `type/subtype`, always `multipart/*`.
        content_type: String,
        headers: Headers,
        boundary: String,
        /// Text before the first delimiter. `None` when the body opens with one.
        preamble: Option<Vec<u8>>,
        children: Vec<MessagePart>,
        /// Bytes following the close delimiter. `None` when the body was never closed.
        epilogue: Option<Vec<u8>>,
    },
}

impl MessagePart {
    pub fn leaf(content_type: impl Into<String>, headers: Headers, body: Vec<u8>) -> Self {
        Self::Leaf {
            content_type: content_type.into(),
            headers,
            body,
        }
    }

    /// A freshly generated container. Its `Content-Type` header must
    /// already carry `boundary`.
    pub fn multipart(
        content_type: impl Into<String>,
        headers: Headers,
        boundary: impl Into<String>,
        children: Vec<MessagePart>,
    ) -> Self {
        Self::Multipart {
            content_type: content_type.into(),
            headers,
            boundary: boundary.into(),
            preamble: None,
            children,
            epilogue: Some(Vec::new()),
        }
    }

    pub fn content_type(&self) -> &str {
        match self {
            Self::Leaf { content_type, .. } | Self::Multipart { content_type, .. } => content_type,
        }
    }

    pub fn headers(&self) -> &Headers {
        match self {
            Self::Leaf { headers, .. } | Self::Multipart { headers, .. } => headers,
        }
    }

    /// Value of the first header called `name`.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers().get(name)
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart { .. })
    }

    pub fn children(&self) -> Option<&[MessagePart]> {
        match self {
            Self::Multipart { children, .. } => Some(children),
            Self::Leaf { .. } => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<MessagePart>> {
        match self {
            Self::Multipart { children, .. } => Some(children),
            Self::Leaf { .. } => None,
        }
    }

    pub fn body(&self) -> Option<&[u8]> {
        match self {
            Self::Leaf { body, .. } => Some(body),
            Self::Multipart { .. } => None,
        }
    }

    /// Copy of this container with `children` in place of its own.
    /// A leaf is returned unchanged.
    pub fn with_children(&self, children: Vec<MessagePart>) -> Self {
        match self {
            Self::Multipart {
                content_type,
                headers,
                boundary,
                preamble,
                epilogue,
                ..
            } => Self::Multipart {
                content_type: content_type.clone(),
                headers: headers.clone(),
                boundary: boundary.clone(),
                preamble: preamble.clone(),
                children,
                epilogue: epilogue.clone(),
            },
            Self::Leaf { .. } => self.clone(),
        }
    }

    /// Copy of this leaf with a different body. A container is returned unchanged.
    pub fn with_body(&self, body: Vec<u8>) -> Self {
        match self {
            Self::Leaf {
                content_type,
                headers,
                ..
            } => Self::Leaf {
                content_type: content_type.clone(),
                headers: headers.clone(),
                body,
            },
            Self::Multipart { .. } => self.clone(),
        }
    }

    /// Number of nodes in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .map(|c| c.iter().map(MessagePart::node_count).sum())
            .unwrap_or(0)
    }
}

/// A complete message: the root part (whose headers are the envelope
/// headers) and the line terminator it was written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub root: MessagePart,
    pub line_ending: LineEnding,
}

impl Message {
    pub fn from(&self) -> Option<String> {
        self.root.header("From")
    }

    pub fn to(&self) -> Option<String> {
        self.root.header("To")
    }

    pub fn cc(&self) -> Option<String> {
        self.root.header("Cc")
    }

    pub fn message_id(&self) -> Option<String> {
        self.root.header("Message-ID")
    }

    pub fn is_multipart(&self) -> bool {
        self.root.is_multipart()
    }
}
