//! MIME message parsing into the owned [`MessagePart`] tree.
//!
//! `mail-parser` locates every part; the tree keeps the raw bytes between
//! the offsets it reports, so parts the filter does not touch serialize
//! exactly as they were read.

use mail_parser::{MessageParser, MimeHeaders, PartType};
use tracing::{debug, warn};

use super::header::trim_line_end;
use crate::error::{Result, StampError};
use crate::model::part::{Header, Headers, LineEnding, Message, MessagePart};

/// Maximum nesting of multipart containers. Deeper containers are kept as
/// opaque leaves.
const MAX_DEPTH: usize = 32;

type ParsedPart<'x> = mail_parser::MessagePart<'x>;

/// Parse a complete raw message (headers + body).
pub fn parse_message(raw: &[u8]) -> Result<Message> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(StampError::ParseFailure("input is empty".into()));
    }

    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| StampError::ParseFailure("not an RFC 5322 message".into()))?;
    debug!(
        message_id = parsed.message_id().unwrap_or("-"),
        parts = parsed.parts.len(),
        "Message parsed"
    );

    let top = parsed
        .parts
        .first()
        .ok_or_else(|| StampError::ParseFailure("message has no parts".into()))?;
    let root = build_part(raw, &parsed.parts, top, 0);
    if root.headers().is_empty() {
        return Err(StampError::ParseFailure("message has no header block".into()));
    }

    Ok(Message {
        root,
        line_ending: LineEnding::detect(raw),
    })
}

/// Build the owned node for `part` and, for containers, its subtree.
///
/// Never fails: anything that cannot be understood as a multipart container
/// is kept as a leaf with its body untouched.
fn build_part(
    raw: &[u8],
    parts: &[ParsedPart<'_>],
    part: &ParsedPart<'_>,
    depth: usize,
) -> MessagePart {
    let headers = raw_headers(raw, part);
    let content_type = media_type(part);

    if let PartType::Multipart(ids) = &part.body {
        let boundary = part.content_type().and_then(|ct| ct.attribute("boundary"));
        let children: Vec<&ParsedPart<'_>> = ids.iter().filter_map(|&id| parts.get(id)).collect();
        match boundary {
            Some(_) if depth >= MAX_DEPTH => {
                warn!(depth, "Multipart nesting too deep, keeping part opaque");
            }
            Some(boundary) if !children.is_empty() => {
                let (preamble, epilogue) = delimiter_gaps(raw, part, &children, boundary);
                let children = children
                    .into_iter()
                    .map(|child| build_part(raw, parts, child, depth + 1))
                    .collect();
                return MessagePart::Multipart {
                    content_type,
                    headers,
                    boundary: boundary.to_string(),
                    preamble,
                    children,
                    epilogue,
                };
            }
            _ => {
                warn!(%content_type, "Multipart without parts, keeping part opaque");
            }
        }
    } else if content_type.starts_with("multipart/") {
        warn!(%content_type, "Multipart boundary missing or never found, keeping part opaque");
    }

    MessagePart::Leaf {
        content_type,
        headers,
        body: span(raw, part.offset_body, part.offset_end).to_vec(),
    }
}

/// Lower-cased `type/subtype`, `text/plain` when absent.
fn media_type(part: &ParsedPart<'_>) -> String {
    part.content_type()
        .map(|ct| match ct.subtype() {
            Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
            None => ct.ctype().to_string(),
        })
        .map(|ct| ct.trim().to_lowercase())
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| "text/plain".to_string())
}

/// Header fields of `part` as written on the wire.
///
/// A value runs from the colon to the start of the next field (or the
/// empty line closing the block), so folding is kept verbatim.
fn raw_headers(raw: &[u8], part: &ParsedPart<'_>) -> Headers {
    let fields = &part.headers;
    fields
        .iter()
        .enumerate()
        .filter_map(|(i, field)| {
            let colon = field.offset_start.checked_sub(1)?;
            let name = String::from_utf8_lossy(span(raw, field.offset_field, colon))
                .trim()
                .to_string();
            if name.is_empty() {
                return None;
            }
            let value = match fields.get(i + 1) {
                Some(next) => trim_line_end(span(raw, field.offset_start, next.offset_field)),
                None => trim_line_end(trim_line_end(span(raw, field.offset_start, part.offset_body))),
            };
            Some(Header::from_raw(name, value.to_vec()))
        })
        .collect()
}

/// Preamble and epilogue of a container, cut out of the bytes around its
/// children.
///
/// The line break in front of a delimiter belongs to the delimiter
/// (RFC 2046 §5.1.1). The epilogue is `None` when the close delimiter is
/// missing.
fn delimiter_gaps(
    raw: &[u8],
    part: &ParsedPart<'_>,
    children: &[&ParsedPart<'_>],
    boundary: &str,
) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let (Some(first), Some(last)) = (children.first(), children.last()) else {
        return (None, None);
    };

    let opening = span(raw, part.offset_body, first.offset_header);
    let preamble = match find(opening, delimiter) {
        Some(0) | None => None,
        Some(pos) => Some(trim_line_end(&opening[..pos]).to_vec()),
    };

    let closing = span(raw, last.offset_end, part.offset_end);
    let epilogue = find(closing, delimiter)
        .and_then(|pos| closing[pos + delimiter.len()..].strip_prefix(b"--"))
        .map(<[u8]>::to_vec);

    (preamble, epilogue)
}

/// `raw[start..end]`, clamped to the input.
fn span(raw: &[u8], start: usize, end: usize) -> &[u8] {
    let end = end.min(raw.len());
    &raw[start.min(end)..end]
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
